use std::path::Path;

use docsearch_core::config::{expand_path, resolve_with_base, Config, Settings};
use docsearch_core::Error;
use figment::Jail;

#[test]
fn defaults_apply_without_any_config_file() {
    Jail::expect_with(|_jail| {
        let config = Config::load().map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings.registry.capacity, 4);
        assert_eq!(settings.hybrid.overfetch_factor, 3);
        assert!((settings.hybrid.lexical_weight - 0.4).abs() < f32::EPSILON);
        assert!((settings.hybrid.vector_weight - 0.6).abs() < f32::EPSILON);
        assert_eq!(settings.file_cache.ttl_hours, 12);
        assert_eq!(settings.file_cache.batch_limit, 20);
        Ok(())
    });
}

#[test]
fn file_then_env_override() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [registry]
            capacity = 6

            [data]
            extraction_dir = "/srv/extraction"
            "#,
        )?;
        jail.set_env("APP_REGISTRY__CAPACITY", "2");
        jail.set_env("APP_HYBRID__OVERFETCH_FACTOR", "5");
        let config = Config::load().map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings.registry.capacity, 2, "env wins over file");
        assert_eq!(settings.hybrid.overfetch_factor, 5);
        assert_eq!(settings.data.extraction_dir, "/srv/extraction");
        assert_eq!(settings.data.chunk_dir, "text_chunks", "untouched keys keep defaults");
        let cap: usize = config.get("registry.capacity").map_err(|e| e.to_string())?;
        assert_eq!(cap, 2);
        Ok(())
    });
}

#[test]
fn zero_capacity_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[registry]\ncapacity = 0\n")?;
        match Config::load() {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains("capacity")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("capacity 0 must not validate"),
        }
        Ok(())
    });
}

#[test]
fn all_zero_weights_are_rejected() {
    let mut settings = Settings::default();
    settings.hybrid.lexical_weight = 0.0;
    settings.hybrid.vector_weight = 0.0;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = Path::new("/data/extraction/paper");
    assert_eq!(resolve_with_base(base, "text_chunks/chunk_0001.txt"), base.join("text_chunks/chunk_0001.txt"));
    assert_eq!(resolve_with_base(base, "/abs/chunk.txt"), Path::new("/abs/chunk.txt"));
}

#[test]
fn expand_path_substitutes_env_vars() {
    Jail::expect_with(|jail| {
        jail.set_env("DOCSEARCH_TEST_ROOT", "/tmp/ds");
        assert_eq!(expand_path("${DOCSEARCH_TEST_ROOT}/extraction"), Path::new("/tmp/ds/extraction"));
        Ok(())
    });
}
