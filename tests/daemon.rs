#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use nbindex::client::DaemonClient;
use nbindex::error::{DaemonError, ErrorKind};
use nbindex::models::{ImportMode, SearchQuery};
use nbindex::server::{DaemonServer, dispatch};
use nbindex::server::protocol::{Request, Response, read_frame, write_frame};
use tokio::net::UnixStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("nbindex.sock");

    let mut config = test_config(32);
    config.daemon.socket_path = Some(socket.clone());
    config.daemon.auto_start = false;

    let ws = Arc::new(workspace_with(config.clone(), Arc::new(HashEmbedder::new(32))));
    let server = Arc::new(DaemonServer::with_workspace(
        ws,
        socket.clone(),
        config.pid_path(),
    ));
    let running = server.clone();
    let handle = tokio::spawn(async move { running.run().await });

    let client = DaemonClient::new(&config);
    for _ in 0..100 {
        if client.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    client.ping().await.unwrap();

    let project = client.create_project("Daemon").await.unwrap();
    client
        .add_source(
            &project.id,
            file_origin("rust.md"),
            "Rust".to_string(),
            RUST_TEXT.to_string(),
        )
        .await
        .unwrap();

    let err = client
        .search(SearchQuery::new(project.id.as_str(), "ownership"))
        .await
        .unwrap_err();
    match err {
        DaemonError::Remote { kind, .. } => assert_eq!(kind, ErrorKind::IndexNotReady),
        other => panic!("unexpected error: {other:?}"),
    }

    let report = client.reindex(&project.id).await.unwrap();
    assert!(report.chunk_count > 0);

    let results = client
        .search(SearchQuery::new(project.id.as_str(), "ownership").with_top_k(2))
        .await
        .unwrap();
    assert!(!results.is_empty() && results.len() <= 2);

    let bundle = dir.path().join("bundle.zip");
    let bytes = client
        .export(&project.id, bundle.clone(), true)
        .await
        .unwrap();
    assert_eq!(bytes, std::fs::metadata(&bundle).unwrap().len());

    let summary = client
        .import(bundle, ImportMode::Merge, Some("nb-1".to_string()))
        .await
        .unwrap();
    assert_eq!(summary.project_id, "nb-1");
    assert_eq!(summary.sources_imported, 1);

    let status = client.status().await.unwrap();
    assert_eq!(status.projects.len(), 2);
    assert_eq!(status.dimension, 32);

    client.shutdown().await.unwrap();
    handle.await.unwrap().unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn test_malformed_frame_gets_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("nbindex.sock");
    let (ws, _) = workspace(32);
    let server = Arc::new(DaemonServer::with_workspace(
        Arc::new(ws),
        socket.clone(),
        dir.path().join("nbindex.pid"),
    ));
    let running = server.clone();
    let handle = tokio::spawn(async move { running.run().await });

    let mut stream = None;
    for _ in 0..100 {
        if let Ok(s) = UnixStream::connect(&socket).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut stream = stream.unwrap();

    write_frame(&mut stream, &serde_json::json!({"type": "no_such_request"}))
        .await
        .unwrap();
    let response: Option<Response> = read_frame(&mut stream).await.unwrap();
    match response {
        Some(Response::Error(e)) => assert_eq!(e.kind, ErrorKind::Validation),
        other => panic!("unexpected response: {other:?}"),
    }

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    write_frame(&mut stream, &Request::Shutdown).await.unwrap();
    let response: Option<Response> = read_frame(&mut stream).await.unwrap();
    assert!(matches!(response, Some(Response::ShutdownAck)));
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_oversized_bundle_file_is_refused_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(32);
    config.import.max_bundle_mb = 0;
    let ws = workspace_with(config, Arc::new(HashEmbedder::new(32)));

    let path = dir.path().join("big.zip");
    std::fs::write(&path, b"any non-empty file").unwrap();
    for request in [
        Request::Import {
            path: path.clone(),
            mode: ImportMode::Merge,
            target: None,
        },
        Request::ImportAll {
            path: path.clone(),
            mode: ImportMode::Replace,
        },
    ] {
        match dispatch(&ws, request).await {
            Response::Error(e) => {
                assert_eq!(e.kind, ErrorKind::BundleCorrupt);
                assert!(e.message.contains("limit"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_workspace_bundle_over_the_socket_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, _) = workspace(32);
    ws.add_source("nb-1", file_origin("rust.md"), "Rust", RUST_TEXT.to_string())
        .unwrap();
    let path = dir.path().join("all.zip");

    let response = dispatch(
        &ws,
        Request::ExportAll {
            path: path.clone(),
            include_vectors: false,
        },
    )
    .await;
    assert!(matches!(response, Response::Exported { bytes, .. } if bytes > 0));

    match dispatch(&ws, Request::ImportAll { path, mode: ImportMode::Merge }).await {
        Response::WorkspaceImported(summary) => {
            assert_eq!(summary.projects.len(), 1);
            assert_eq!(summary.sources_imported(), 1);
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(ws.list_sources("nb-1").unwrap().len(), 2);
}
