mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use nbindex::error::ErrorKind;
use nbindex::models::{
    BUNDLE_ENTRY, BUNDLE_FORMAT_VERSION, BundleProject, BundledProject, ImportMode, ProjectBundle,
    SearchQuery, Source, WORKSPACE_BUNDLE_ENTRY, WorkspaceBundle,
};

fn bundle_with_source(project_id: &str, source_id: &str, text: &str) -> Vec<u8> {
    let bundle = ProjectBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        exported_at: "2026-01-01T00:00:00Z".to_string(),
        project: BundleProject {
            id: project_id.to_string(),
            name: "Imported".to_string(),
            created_at: 0,
        },
        sources: vec![Source::new(project_id, file_origin("s1.md"), "S1", text).with_id(source_id)],
        vectors: None,
    };
    zip_entry(BUNDLE_ENTRY, &serde_json::to_vec(&bundle).unwrap())
}

#[tokio::test]
async fn test_export_then_replace_import_preserves_index() {
    let (source_ws, _) = workspace(32);
    source_ws
        .add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    source_ws
        .add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();
    let report = source_ws.reindex("nb-1").await.unwrap();
    let bundle = source_ws.export_project("nb-1", true).await.unwrap();

    let (dest, embedder) = workspace(32);
    let summary = dest
        .import_project(&bundle, ImportMode::Replace, None)
        .await
        .unwrap();
    assert_eq!(summary.project_id, "nb-1");
    assert_eq!(summary.sources_imported, 2);
    assert!(summary.vectors_imported);
    assert!(!summary.needs_reindex);

    let status = dest.project_status("nb-1").await.unwrap();
    let index = status.index.unwrap();
    assert_eq!(index.count, report.chunk_count);
    assert_eq!(index.dimension, report.dimension);

    let results = dest
        .search(&SearchQuery::new("nb-1", "ownership borrow"))
        .await
        .unwrap();
    assert!(!results.is_empty());
    // Only the query was embedded; the imported vectors were used as-is.
    assert_eq!(embedder.calls(), 1);
}

#[tokio::test]
async fn test_export_without_vectors_needs_reindex() {
    let (source_ws, _) = workspace(32);
    source_ws
        .add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    source_ws.reindex("nb-1").await.unwrap();
    let bundle = source_ws.export_project("nb-1", false).await.unwrap();

    let (dest, _) = workspace(32);
    let summary = dest
        .import_project(&bundle, ImportMode::Replace, None)
        .await
        .unwrap();
    assert!(!summary.vectors_imported);
    assert!(summary.needs_reindex);

    let err = dest
        .search(&SearchQuery::new("nb-1", "ownership"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexNotReady);

    dest.reindex("nb-1").await.unwrap();
    let status = dest.project_status("nb-1").await.unwrap();
    assert!(!status.project.needs_reindex);
}

#[tokio::test]
async fn test_import_creates_missing_default_target() {
    let (dest, _) = workspace(32);
    let bundle = bundle_with_source("proj-abc12345", "s1", RUST_TEXT);

    let summary = dest
        .import_project(&bundle, ImportMode::Merge, None)
        .await
        .unwrap();
    assert_eq!(summary.project_id, "proj-abc12345");

    let projects = dest.list_projects();
    let created = projects.iter().find(|p| p.id == "proj-abc12345").unwrap();
    assert_eq!(created.name, "Imported");
    assert_eq!(dest.list_sources("proj-abc12345").unwrap().len(), 1);
}

#[tokio::test]
async fn test_merge_with_colliding_source_ids() {
    let (dest, _) = workspace(32);
    let bundle = bundle_with_source("nb-1", "s1", RUST_TEXT);

    dest.import_project(&bundle, ImportMode::Replace, None)
        .await
        .unwrap();
    assert_eq!(dest.list_sources("nb-1").unwrap()[0].id, "s1");

    dest.import_project(&bundle, ImportMode::Merge, None)
        .await
        .unwrap();
    let sources = dest.list_sources("nb-1").unwrap();
    assert_eq!(sources.len(), 2);
    let ids: HashSet<&str> = sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(sources.iter().all(|s| s.project_id == "nb-1"));
}

#[tokio::test]
async fn test_merge_vectors_into_existing_index() {
    let (source_ws, _) = workspace(32);
    source_ws
        .add_source("nb-1", file_origin("garden.md"), "Garden", GARDEN_TEXT.to_string())
        .unwrap();
    let exported = source_ws.reindex("nb-1").await.unwrap();
    let bundle = source_ws.export_project("nb-1", true).await.unwrap();

    let (dest, _) = workspace(32);
    dest.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    let existing = dest.reindex("nb-1").await.unwrap();

    let summary = dest
        .import_project(&bundle, ImportMode::Merge, None)
        .await
        .unwrap();
    assert!(summary.vectors_imported);
    assert!(!summary.needs_reindex);

    let index = dest.project_status("nb-1").await.unwrap().index.unwrap();
    assert_eq!(index.count, existing.chunk_count + exported.chunk_count);

    // Merged chunk ids resolve to the renamed sources.
    let sources = dest.list_sources("nb-1").unwrap();
    let results = dest
        .search(&SearchQuery::new("nb-1", "tomato garden").with_top_k(20))
        .await
        .unwrap();
    for hit in &results.hits {
        assert!(sources.iter().any(|s| s.id == hit.source.source_id));
    }
}

#[tokio::test]
async fn test_merge_dimension_mismatch_flags_reindex() {
    let (source_ws, _) = workspace(16);
    source_ws
        .add_source("nb-1", file_origin("garden.md"), "Garden", GARDEN_TEXT.to_string())
        .unwrap();
    source_ws.reindex("nb-1").await.unwrap();
    let bundle = source_ws.export_project("nb-1", true).await.unwrap();

    let (dest, _) = workspace(32);
    dest.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    let before = dest.reindex("nb-1").await.unwrap();

    let summary = dest
        .import_project(&bundle, ImportMode::Merge, None)
        .await
        .unwrap();
    assert!(!summary.vectors_imported);
    assert!(summary.needs_reindex);

    let status = dest.project_status("nb-1").await.unwrap();
    assert!(status.project.needs_reindex);
    assert_eq!(status.index.unwrap().count, before.chunk_count);
    assert_eq!(status.sources, 2);
}

#[tokio::test]
async fn test_import_into_missing_explicit_target() {
    let (dest, _) = workspace(32);
    let bundle = bundle_with_source("nb-1", "s1", RUST_TEXT);

    let err = dest
        .import_project(&bundle, ImportMode::Merge, Some("proj-nothere"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(dest.list_projects().len(), 1);
}

#[tokio::test]
async fn test_corrupt_bundles_are_rejected() {
    let (dest, _) = workspace(32);
    dest.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();

    let not_zip = b"definitely not a zip archive".to_vec();
    let bad_json = zip_entry(BUNDLE_ENTRY, b"{ not json");
    let wrong_entry = zip_entry("other.json", b"{}");
    let mut duplicate = serde_json::from_slice::<serde_json::Value>(
        &serde_json::to_vec(&ProjectBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            exported_at: String::new(),
            project: BundleProject {
                id: "nb-1".to_string(),
                name: "Dup".to_string(),
                created_at: 0,
            },
            sources: vec![Source::new("nb-1", file_origin("a"), "A", "a").with_id("s1")],
            vectors: None,
        })
        .unwrap(),
    )
    .unwrap();
    let first = duplicate["sources"][0].clone();
    duplicate["sources"].as_array_mut().unwrap().push(first);
    let duplicate = zip_entry(BUNDLE_ENTRY, &serde_json::to_vec(&duplicate).unwrap());

    for bytes in [not_zip, bad_json, wrong_entry, duplicate] {
        for mode in [ImportMode::Merge, ImportMode::Replace] {
            let err = dest.import_project(&bytes, mode, None).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BundleCorrupt);
        }
    }

    // Nothing was touched.
    let sources = dest.list_sources("nb-1").unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].title, "Rust");
}

#[tokio::test]
async fn test_bundle_size_limit() {
    let embedder = Arc::new(HashEmbedder::new(32));
    let mut config = test_config(32);
    config.import.max_unpacked_mb = 0;
    let dest = workspace_with(config, embedder);

    let bundle = bundle_with_source("nb-1", "s1", RUST_TEXT);
    let err = dest
        .import_project(&bundle, ImportMode::Merge, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BundleCorrupt);
}

fn workspace_bundle(projects: Vec<BundledProject>) -> Vec<u8> {
    let bundle = WorkspaceBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        exported_at: "2026-01-01T00:00:00Z".to_string(),
        projects,
    };
    zip_entry(WORKSPACE_BUNDLE_ENTRY, &serde_json::to_vec(&bundle).unwrap())
}

fn bundled(project_id: &str, name: &str, sources: Vec<Source>) -> BundledProject {
    BundledProject {
        project: BundleProject {
            id: project_id.to_string(),
            name: name.to_string(),
            created_at: 1,
        },
        sources,
        vectors: None,
    }
}

#[tokio::test]
async fn test_export_all_then_replace_restores_workspace() {
    let (source_ws, _) = workspace(32);
    source_ws
        .add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    let thesis = source_ws.create_project("Thesis").unwrap();
    source_ws
        .add_source(&thesis.id, file_origin("garden.md"), "Garden", GARDEN_TEXT.to_string())
        .unwrap();
    source_ws.reindex("nb-1").await.unwrap();
    let thesis_report = source_ws.reindex(&thesis.id).await.unwrap();
    let bundle = source_ws.export_all(true).await.unwrap();

    let (dest, embedder) = workspace(32);
    let scratch = dest.create_project("Scratch").unwrap();
    dest.add_source(&scratch.id, file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();
    dest.add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();
    dest.reindex(&scratch.id).await.unwrap();

    let summary = dest
        .import_workspace(&bundle, ImportMode::Replace)
        .await
        .unwrap();
    assert_eq!(summary.projects.len(), 2);
    assert_eq!(summary.removed, vec![scratch.id.clone()]);
    assert_eq!(summary.sources_imported(), 2);
    assert!(summary.projects.iter().all(|p| p.vectors_imported && !p.needs_reindex));

    let ids: HashSet<String> = dest.list_projects().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, HashSet::from(["nb-1".to_string(), thesis.id.clone()]));
    assert!(dest.list_sources(&scratch.id).is_err());

    let defaults = dest.list_sources("nb-1").unwrap();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].title, "Rust");

    let restored = dest.project_status(&thesis.id).await.unwrap();
    assert_eq!(restored.project.name, "Thesis");
    assert_eq!(restored.index.unwrap().count, thesis_report.chunk_count);

    let calls_before = embedder.calls();
    let results = dest
        .search(&SearchQuery::new(thesis.id.as_str(), "tomato garden"))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(embedder.calls(), calls_before + 1);
}

#[tokio::test]
async fn test_workspace_merge_keeps_existing_projects() {
    let (dest, _) = workspace(32);
    let scratch = dest.create_project("Scratch").unwrap();
    dest.add_source("nb-1", file_origin("ocean.md"), "Ocean", OCEAN_TEXT.to_string())
        .unwrap();

    let bundle = workspace_bundle(vec![
        bundled(
            "nb-1",
            "Renamed",
            vec![Source::new("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT).with_id("s1")],
        ),
        bundled(
            "proj-merged1",
            "Merged",
            vec![Source::new("proj-merged1", file_origin("g.md"), "Garden", GARDEN_TEXT).with_id("s1")],
        ),
    ]);
    let summary = dest
        .import_workspace(&bundle, ImportMode::Merge)
        .await
        .unwrap();
    assert!(summary.removed.is_empty());
    assert!(summary.projects.iter().all(|p| p.needs_reindex));

    let projects = dest.list_projects();
    assert_eq!(projects.len(), 3);
    assert!(projects.iter().any(|p| p.id == scratch.id));
    // Merge keeps the existing record of a known project.
    let default = projects.iter().find(|p| p.id == "nb-1").unwrap();
    assert_ne!(default.name, "Renamed");

    assert_eq!(dest.list_sources("nb-1").unwrap().len(), 2);
    assert_eq!(dest.list_sources("proj-merged1").unwrap().len(), 1);
}

#[tokio::test]
async fn test_workspace_replace_without_default_empties_it() {
    let (dest, _) = workspace(32);
    dest.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    dest.reindex("nb-1").await.unwrap();

    let bundle = workspace_bundle(vec![bundled(
        "proj-only0001",
        "Only",
        vec![Source::new("proj-only0001", file_origin("o.md"), "Ocean", OCEAN_TEXT).with_id("s1")],
    )]);
    let summary = dest
        .import_workspace(&bundle, ImportMode::Replace)
        .await
        .unwrap();
    assert!(summary.removed.is_empty());

    assert_eq!(dest.list_projects().len(), 2);
    assert!(dest.list_sources("nb-1").unwrap().is_empty());
    let err = dest
        .search(&SearchQuery::new("nb-1", "ownership"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexNotReady);
    assert_eq!(dest.list_sources("proj-only0001").unwrap()[0].id, "s1");
}

#[tokio::test]
async fn test_corrupt_workspace_bundles_are_rejected() {
    let (dest, _) = workspace(32);
    let scratch = dest.create_project("Scratch").unwrap();
    dest.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();

    let duplicate = workspace_bundle(vec![
        bundled("proj-dup00001", "A", Vec::new()),
        bundled("proj-dup00001", "B", Vec::new()),
    ]);
    let empty = workspace_bundle(Vec::new());
    let single_project = bundle_with_source("nb-1", "s1", RUST_TEXT);

    for bytes in [duplicate, empty, single_project] {
        for mode in [ImportMode::Merge, ImportMode::Replace] {
            let err = dest.import_workspace(&bytes, mode).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BundleCorrupt);
        }
    }

    assert_eq!(dest.list_projects().len(), 2);
    assert!(dest.list_sources(&scratch.id).unwrap().is_empty());
    assert_eq!(dest.list_sources("nb-1").unwrap().len(), 1);
}
