mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use nbindex::error::ErrorKind;
use nbindex::models::{
    BUNDLE_ENTRY, BUNDLE_FORMAT_VERSION, BundleProject, ImportMode, ProjectBundle, SearchQuery,
    SourceOrigin,
};
use nbindex::services::TextChunker;

fn expected_chunks(texts: &[&str]) -> usize {
    let chunker = TextChunker::new(120, 20, 200_000).unwrap();
    texts
        .iter()
        .map(|t| chunker.expected_count(t.chars().count()))
        .sum()
}

#[tokio::test]
async fn test_reindex_empty_project_gives_empty_results() {
    let (ws, embedder) = workspace(32);

    let report = ws.reindex("nb-1").await.unwrap();
    assert_eq!(report.chunk_count, 0);
    assert_eq!(report.sources_indexed, 0);
    assert_eq!(embedder.calls(), 0);

    let results = ws
        .search(&SearchQuery::new("nb-1", "anything"))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(results.collection_size, 0);
}

#[tokio::test]
async fn test_search_before_index_is_not_ready() {
    let (ws, _) = workspace(32);
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();

    let err = ws
        .search(&SearchQuery::new("nb-1", "borrow checker"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexNotReady);
}

#[tokio::test]
async fn test_search_validation_and_unknown_project() {
    let (ws, _) = workspace(32);

    let err = ws.search(&SearchQuery::new("nb-1", "  ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = ws
        .search(&SearchQuery::new("nb-1", "rust").with_top_k(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = ws
        .search(&SearchQuery::new("missing", "rust"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_search_ranks_relevant_source_first() {
    let (ws, _) = workspace(64);
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    ws.add_source("nb-1", file_origin("garden.md"), "Garden", GARDEN_TEXT.to_string())
        .unwrap();
    ws.add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();

    let report = ws.reindex("nb-1").await.unwrap();
    assert_eq!(
        report.chunk_count,
        expected_chunks(&[RUST_TEXT, GARDEN_TEXT, OCEAN_TEXT])
    );
    assert_eq!(report.dimension, 64);

    let results = ws
        .search(&SearchQuery::new("nb-1", "tomato plant watering garden").with_top_k(3))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 3);
    assert_eq!(results.hits[0].source.source_title, "Garden");
    for pair in results.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_top_k_larger_than_collection() {
    let (ws, _) = workspace(32);
    ws.add_source("nb-1", file_origin("a.md"), "A", "short note".to_string())
        .unwrap();
    ws.reindex("nb-1").await.unwrap();

    let results = ws
        .search(&SearchQuery::new("nb-1", "note").with_top_k(50))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results.collection_size, 1);
}

#[tokio::test]
async fn test_min_score_filters_hits() {
    let (ws, _) = workspace(64);
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    ws.reindex("nb-1").await.unwrap();

    let results = ws
        .search(&SearchQuery::new("nb-1", "borrow checker").with_min_score(1.01))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_failed_build_keeps_previous_index() {
    let (ws, embedder) = workspace(32);
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    let first = ws.reindex("nb-1").await.unwrap();

    ws.add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();
    embedder.set_failing(true);
    let err = ws.reindex("nb-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingUnavailable);
    embedder.set_failing(false);

    let results = ws
        .search(&SearchQuery::new("nb-1", "ownership"))
        .await
        .unwrap();
    assert_eq!(results.collection_size as usize, first.chunk_count);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (ws, _) = workspace(32);
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();

    let a = ws.reindex("nb-1").await.unwrap();
    let b = ws.reindex("nb-1").await.unwrap();
    assert_eq!(a.chunk_count, b.chunk_count);
    assert_eq!(a.dimension, b.dimension);

    let q = SearchQuery::new("nb-1", "borrow checker lifetimes");
    let first = ws.search(&q).await.unwrap();
    let second = ws.search(&q).await.unwrap();
    let ids = |r: &nbindex::models::SearchResults| {
        r.hits.iter().map(|h| h.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reindex_burst_coalesces() {
    let embedder = Arc::new(HashEmbedder::new(32).with_delay(Duration::from_millis(200)));
    let ws = Arc::new(workspace_with(test_config(32), embedder));
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();

    let mut handles = Vec::new();
    let first = ws.clone();
    handles.push(tokio::spawn(async move { first.reindex("nb-1").await }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    ws.add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();
    for _ in 0..4 {
        let ws = ws.clone();
        handles.push(tokio::spawn(async move { ws.reindex("nb-1").await }));
    }

    let mut last_count = 0;
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        last_count = report.chunk_count;
    }

    assert!(ws.builds_started("nb-1") <= 2);
    assert_eq!(last_count, expected_chunks(&[RUST_TEXT, OCEAN_TEXT]));
    let status = ws.project_status("nb-1").await.unwrap();
    assert_eq!(
        status.index.unwrap().count,
        expected_chunks(&[RUST_TEXT, OCEAN_TEXT])
    );
}

#[tokio::test]
async fn test_auto_reindex_after_add() {
    let embedder = Arc::new(HashEmbedder::new(32));
    let mut config = test_config(32);
    config.indexing.auto_reindex = true;
    let ws = workspace_with(config, embedder);

    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();

    let mut indexed = None;
    for _ in 0..100 {
        if let Some(info) = ws.project_status("nb-1").await.unwrap().index {
            indexed = Some(info);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(indexed.unwrap().count, expected_chunks(&[RUST_TEXT]));
}

#[tokio::test]
async fn test_pending_source_is_not_indexed_until_complete() {
    let (ws, _) = workspace(32);
    let pending = ws
        .add_pending_source("nb-1", SourceOrigin::Url("https://example.org".into()), "Example")
        .unwrap();

    let report = ws.reindex("nb-1").await.unwrap();
    assert_eq!(report.chunk_count, 0);

    ws.complete_source("nb-1", &pending.id, OCEAN_TEXT.to_string())
        .unwrap();
    let report = ws.reindex("nb-1").await.unwrap();
    assert_eq!(report.chunk_count, expected_chunks(&[OCEAN_TEXT]));

    let failed = ws
        .add_pending_source("nb-1", SourceOrigin::Audio("talk.mp3".into()), "Talk")
        .unwrap();
    let failed = ws
        .fail_source("nb-1", &failed.id, "transcription failed".to_string())
        .unwrap();
    assert_eq!(failed.error.as_deref(), Some("transcription failed"));
    assert_eq!(ws.list_sources("nb-1").unwrap().len(), 2);
}

#[tokio::test]
async fn test_remove_source_and_clear_project() {
    let (ws, _) = workspace(32);
    let rust = ws
        .add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    ws.add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();

    ws.remove_source("nb-1", &rust.id).unwrap();
    let err = ws.remove_source("nb-1", &rust.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let report = ws.reindex("nb-1").await.unwrap();
    assert_eq!(report.chunk_count, expected_chunks(&[OCEAN_TEXT]));

    assert_eq!(ws.clear_project("nb-1").await.unwrap(), 1);
    assert!(ws.list_sources("nb-1").unwrap().is_empty());
    let err = ws
        .search(&SearchQuery::new("nb-1", "ocean"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexNotReady);
}

#[tokio::test]
async fn test_project_lifecycle() {
    let (ws, _) = workspace(32);

    let project = ws.create_project("Thesis").unwrap();
    assert!(project.id.starts_with("proj-"));
    assert_eq!(ws.list_projects().len(), 2);

    ws.add_source(&project.id, file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    ws.reindex(&project.id).await.unwrap();

    ws.delete_project(&project.id).await.unwrap();
    assert_eq!(ws.list_projects().len(), 1);

    let err = ws
        .search(&SearchQuery::new(project.id.as_str(), "rust"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = ws.delete_project(&project.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_default_project_cannot_be_deleted() {
    let (ws, _) = workspace(32);
    let err = ws.delete_project("nb-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ws.list_projects().len(), 1);
}

#[tokio::test]
async fn test_sources_are_project_scoped() {
    let (ws, _) = workspace(64);
    let other = ws.create_project("Other").unwrap();
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    ws.add_source(&other.id, file_origin("garden.md"), "Garden", GARDEN_TEXT.to_string())
        .unwrap();
    ws.reindex("nb-1").await.unwrap();
    ws.reindex(&other.id).await.unwrap();

    let results = ws
        .search(&SearchQuery::new(other.id.as_str(), "ownership borrow").with_top_k(10))
        .await
        .unwrap();
    assert!(results.hits.iter().all(|h| h.source.source_title == "Garden"));
}

fn empty_bundle(project_id: &str) -> Vec<u8> {
    let bundle = ProjectBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        exported_at: String::new(),
        project: BundleProject {
            id: project_id.to_string(),
            name: "Recreated".to_string(),
            created_at: 0,
        },
        sources: Vec::new(),
        vectors: None,
    };
    zip_entry(BUNDLE_ENTRY, &serde_json::to_vec(&bundle).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deleted_project_does_not_keep_racing_adds() {
    let (ws, _) = workspace(32);
    let ws = Arc::new(ws);

    for _ in 0..50 {
        let project = ws.create_project("Racy").unwrap();
        let writer = {
            let ws = ws.clone();
            let id = project.id.clone();
            tokio::task::spawn_blocking(move || {
                for i in 0..40 {
                    let _ = ws.add_source(
                        &id,
                        file_origin("race.md"),
                        &format!("note {i}"),
                        RUST_TEXT.to_string(),
                    );
                }
            })
        };
        ws.delete_project(&project.id).await.unwrap();
        writer.await.unwrap();

        let err = ws
            .add_source(&project.id, file_origin("late.md"), "Late", OCEAN_TEXT.to_string())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Re-creating the id through an import starts from an empty list.
        ws.import_project(&empty_bundle(&project.id), ImportMode::Merge, None)
            .await
            .unwrap();
        assert!(ws.list_sources(&project.id).unwrap().is_empty());
        ws.delete_project(&project.id).await.unwrap();
    }
    assert_eq!(ws.list_projects().len(), 1);
}
