use jarvis_core::memory::{HashingEmbedder, SemanticStore, TextEmbedder};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn open_store(dir: &tempfile::TempDir) -> SemanticStore {
    SemanticStore::open(
        &dir.path().join("semantic/metadata.db"),
        &dir.path().join("semantic/index.ann"),
        Arc::new(HashingEmbedder::default()),
    )
    .expect("open semantic store")
}

/// Maps fixed texts to fixed vectors so distances are controlled.
struct PinnedEmbedder;

impl TextEmbedder for PinnedEmbedder {
    fn dimension(&self) -> usize {
        2
    }

    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match text {
            "query" => Some(vec![0.0, 0.0]),
            "near" => Some(vec![1.0, 0.0]),
            "far" => Some(vec![3.0, 0.0]),
            "" => None,
            _ => Some(vec![0.5, 0.5]),
        }
    }
}

#[test]
fn empty_store_returns_no_hits() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(&dir);
    let hits = store.search_text("anything at all", 5).expect("search");
    assert!(hits.is_empty());
}

#[test]
fn add_assigns_sequential_vector_ids_and_search_orders_by_similarity() {
    let dir = tempdir().expect("tempdir");
    let store = SemanticStore::open(
        &dir.path().join("semantic/metadata.db"),
        &dir.path().join("semantic/index.ann"),
        Arc::new(PinnedEmbedder),
    )
    .expect("open store");

    let far = store.add("far", &json!({"k": "far"})).expect("add far");
    let near = store.add("near", &json!({"k": "near"})).expect("add near");
    assert_eq!(far, 0);
    assert_eq!(near, 1);

    let hits = store.search_text("query", 5).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "near");
    assert_eq!(hits[1].text, "far");

    // similarity = 1 / (1 + l2_distance)
    assert!((hits[0].similarity - 0.5).abs() < 1e-6);
    assert!((hits[1].similarity - 0.25).abs() < 1e-6);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.similarity));
    }
    assert_eq!(hits[0].metadata["k"], "near");
}

#[test]
fn equal_similarity_ties_break_by_vector_id() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(&dir);

    // Identical text embeds identically, so similarities tie exactly.
    store.add("the answer is 42", &json!({})).expect("add");
    store.add("the answer is 42", &json!({})).expect("add");

    let hits = store.search_text("the answer is 42", 5).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].vector_id, 0);
    assert_eq!(hits[1].vector_id, 1);
    assert_eq!(hits[0].similarity, hits[1].similarity);
}

#[test]
fn missing_index_file_is_rebuilt_from_metadata() {
    let dir = tempdir().expect("tempdir");
    let index_path = dir.path().join("semantic/index.ann");
    {
        let store = open_store(&dir);
        store.add("alpha entry", &json!({"n": 1})).expect("add");
        store.add("beta entry", &json!({"n": 2})).expect("add");
    }
    fs::remove_file(&index_path).expect("remove index file");

    let reopened = open_store(&dir);
    assert_eq!(reopened.len(), 2);
    let hits = reopened.search_text("alpha entry", 2).expect("search");
    assert_eq!(hits[0].text, "alpha entry");
}

#[test]
fn corrupt_index_file_is_rebuilt_from_metadata() {
    let dir = tempdir().expect("tempdir");
    let index_path = dir.path().join("semantic/index.ann");
    {
        let store = open_store(&dir);
        store.add("alpha entry", &json!({"n": 1})).expect("add");
        store.add("beta entry", &json!({"n": 2})).expect("add");
    }
    let raw = fs::read(&index_path).expect("read index");
    fs::write(&index_path, &raw[..raw.len() / 2]).expect("corrupt index");

    let reopened = open_store(&dir);
    assert_eq!(reopened.len(), 2);
    let hits = reopened.search_text("beta entry", 2).expect("search");
    assert_eq!(hits[0].text, "beta entry");
}

#[test]
fn text_with_no_embeddable_content_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(&dir);
    let err = store.add("   ", &json!({})).expect_err("blank text fails");
    assert_eq!(err.code(), "invalid_argument");
}
