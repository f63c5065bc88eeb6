use candle_core::{DType, Device, Tensor};
use docsearch_core::config::EmbeddingSettings;
use docsearch_core::traits::Embedder;
use docsearch_embed::{load_embedder, masked_mean_l2, FakeEmbedder};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(64);
    let texts = vec!["optical flow".to_string(), "optical flow".to_string(), "caption of figure".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    assert_eq!(embs.len(), 3);
    assert_eq!(embs[0].len(), 64);

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in embs[0].iter().zip(embs[1].iter()) { assert!((a - b).abs() <= 1e-6); }
    assert_ne!(embs[0], embs[2]);
}

#[test]
fn settings_can_force_the_fake_embedder() {
    let settings = EmbeddingSettings { dim: 32, model_dir: None, use_fake: true };
    let embedder = load_embedder(&settings).expect("fake embedder");
    assert_eq!(embedder.dim(), 32);
}

#[test]
fn masked_mean_l2_ignores_padding() {
    let dev = Device::Cpu;
    // Two rows; the second token of row 0 is padding.
    let h = Tensor::from_slice(
        &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
          0.0, 3.0, 0.0, 4.0, 0.0, 3.0, 0.0, 4.0],
        (2, 2, 4),
        &dev,
    ).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();

    let norm = 30f32.sqrt();
    for (a, b) in out[0].iter().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
    for (a, b) in out[1].iter().zip([0.0, 0.6, 0.0, 0.8]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}
