use std::path::Path;

use docsearch_core::traits::IndexHandle;
use docsearch_core::types::{DocType, HitAttributes, HitSource, IndexKind};
use docsearch_core::Error;
use docsearch_text::{LexicalEntry, LexicalIndexHandle, LexicalIndexWriter};
use tempfile::TempDir;

fn entry(id: &str, doc_type: DocType, order: u64, path: &str, content: &str) -> LexicalEntry {
    LexicalEntry { id: id.into(), pdf: "paper".into(), doc_type, order, page_index: Some(order / 2), path: path.into(), content: content.into() }
}

fn build_fixture(dir: &Path) -> LexicalIndexHandle {
    std::fs::create_dir_all(dir.join("text_chunks")).unwrap();
    std::fs::write(dir.join("text_chunks/chunk_0001.txt"), "Optical flow estimates apparent motion.").unwrap();
    std::fs::write(dir.join("text_chunks/chunk_0002.txt"), "Stereo matching recovers depth.").unwrap();
    let writer = LexicalIndexWriter::create(&dir.join("lexical_index")).unwrap();
    writer.write(&[
        entry("chunk_0001", DocType::Chunk, 1, "text_chunks/chunk_0001.txt", "optical flow estimates apparent motion between frames optical flow"),
        entry("chunk_0002", DocType::Chunk, 2, "text_chunks/chunk_0002.txt", "stereo matching recovers depth from two views"),
        entry("fig-1", DocType::ImageCaption, 3, "captions/fig-1.txt", "Figure 1: optical flow field of a rotating disc"),
    ]).unwrap();
    LexicalIndexHandle::open("paper", &dir.join("lexical_index"), dir, 160).unwrap()
}

#[tokio::test]
async fn ranks_matches_and_attaches_previews() {
    let tmp = TempDir::new().unwrap();
    let handle = build_fixture(tmp.path());
    assert_eq!(handle.kind(), IndexKind::Lexical);

    let hits = handle.search("optical flow", 10).await.expect("search");
    assert_eq!(hits.len(), 2, "one chunk and one caption mention optical flow");
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| h.source == HitSource::Lexical));

    let chunk = hits.iter().find(|h| h.item_id == "chunk_0001").expect("chunk hit");
    assert_eq!(chunk.payload.content, "Optical flow estimates apparent motion.");
    match &chunk.payload.attributes {
        HitAttributes::Text { doc_type, order, page_index, path } => {
            assert_eq!(*doc_type, DocType::Chunk);
            assert_eq!(*order, Some(1));
            assert_eq!(*page_index, Some(0));
            assert_eq!(path.as_deref(), Some("text_chunks/chunk_0001.txt"));
        }
        other => panic!("unexpected attributes {other:?}"),
    }
}

#[tokio::test]
async fn doc_type_filter_restricts_results() {
    let tmp = TempDir::new().unwrap();
    let handle = build_fixture(tmp.path());

    let captions = handle.search_doc_type("optical", 10, DocType::ImageCaption).await.unwrap();
    assert_eq!(captions.len(), 1);
    assert_eq!(captions[0].item_id, "fig-1");
    assert_eq!(captions[0].payload.content, "", "missing caption file yields an empty preview");

    let chunks = handle.search_doc_type("optical", 10, DocType::Chunk).await.unwrap();
    assert_eq!(chunks.iter().map(|h| h.item_id.as_str()).collect::<Vec<_>>(), vec!["chunk_0001"]);
}

#[tokio::test]
async fn no_match_is_an_empty_list_and_k_zero_short_circuits() {
    let tmp = TempDir::new().unwrap();
    let handle = build_fixture(tmp.path());
    assert!(handle.search("spectroscopy", 5).await.unwrap().is_empty());
    assert!(handle.search("optical", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_query_is_reported_as_invalid() {
    let tmp = TempDir::new().unwrap();
    let handle = build_fixture(tmp.path());
    let err = handle.search("nofield:optical", 5).await.unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)), "got {err:?}");
}

#[tokio::test]
async fn closed_handle_reports_unavailable_and_close_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let handle = build_fixture(tmp.path());
    handle.close();
    handle.close();
    assert!(handle.is_closed());
    let err = handle.search("optical", 5).await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { kind: IndexKind::Lexical, .. }));
}

#[test]
fn opening_a_missing_directory_fails() {
    let tmp = TempDir::new().unwrap();
    assert!(LexicalIndexHandle::open("paper", &tmp.path().join("nope"), tmp.path(), 160).is_err());
}
