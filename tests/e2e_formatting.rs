//! Formatting E2E tests with a stand-in formatter script
#![cfg(unix)]

mod helper;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use serde_json::json;
use tower::Service;
use tower_lsp::LspService;
use tower_lsp::jsonrpc::{ErrorCode, Request};
use tower_lsp::lsp_types::*;

use helper::{
    create_did_open_notification, create_initialized_notification, spawn_notification_collector,
    wait_for_diagnostics,
};
use protobuf_language_server::lsp::backend::Backend;

const URI: &str = "file:///ws/a.proto";

fn create_initialize_request_with_formatter(formatter: &Path) -> Request {
    Request::build("initialize")
        .id(1)
        .params(json!({
            "capabilities": {},
            "initializationOptions": {
                "protobuf": { "clang-format-path": formatter }
            }
        }))
        .finish()
}

fn create_formatting_request(id: i64, uri: &str) -> Request {
    Request::build("textDocument/formatting")
        .id(id)
        .params(json!({
            "textDocument": { "uri": uri },
            "options": { "tabSize": 2, "insertSpaces": true }
        }))
        .finish()
}

#[tokio::test(flavor = "multi_thread")]
async fn formatting_replaces_document_with_formatter_output() {
    // 1. Setup: a formatter that upper-cases its input
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-clang-format");
    std::fs::write(&script, "#!/bin/sh\ntr a-z A-Z\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let (mut service, socket) = LspService::build(Backend::new).finish();
    let mut notification_rx = spawn_notification_collector(socket);
    service
        .call(create_initialize_request_with_formatter(&script))
        .await
        .unwrap();
    service
        .call(create_initialized_notification())
        .await
        .unwrap();
    service
        .call(create_did_open_notification(URI, "message a {}\n"))
        .await
        .unwrap();
    wait_for_diagnostics(&mut notification_rx, URI)
        .await
        .expect("Expected diagnostics for a.proto");

    // 2. Format
    let response = service
        .call(create_formatting_request(2, URI))
        .await
        .unwrap()
        .expect("Expected a response");

    // 3. One edit covering the whole document
    let edits: Vec<TextEdit> =
        serde_json::from_value(response.result().cloned().unwrap()).unwrap();
    assert_eq!(
        edits,
        vec![TextEdit::new(
            Range::new(Position::new(0, 0), Position::new(1, 0)),
            "MESSAGE A {}\n".to_string()
        )]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn formatting_with_missing_formatter_returns_error() {
    // 1. Setup
    let (mut service, socket) = LspService::build(Backend::new).finish();
    let mut notification_rx = spawn_notification_collector(socket);
    service
        .call(create_initialize_request_with_formatter(Path::new(
            "/nonexistent/clang-format",
        )))
        .await
        .unwrap();
    service
        .call(create_initialized_notification())
        .await
        .unwrap();
    service
        .call(create_did_open_notification(URI, "message A {}\n"))
        .await
        .unwrap();
    wait_for_diagnostics(&mut notification_rx, URI)
        .await
        .expect("Expected diagnostics for a.proto");

    // 2. Format
    let response = service
        .call(create_formatting_request(2, URI))
        .await
        .unwrap()
        .expect("Expected a response");

    // 3. Reported as an internal error naming the formatter
    let error = response.error().expect("Expected an error");
    assert_eq!(error.code, ErrorCode::InternalError);
    assert!(error.message.contains("/nonexistent/clang-format"));
}

#[tokio::test(flavor = "multi_thread")]
async fn formatting_unknown_document_returns_null() {
    let (mut service, socket) = LspService::build(Backend::new).finish();
    let _notification_rx = spawn_notification_collector(socket);
    service
        .call(create_initialize_request_with_formatter(Path::new("clang-format")))
        .await
        .unwrap();

    let response = service
        .call(create_formatting_request(2, "file:///ws/unknown.proto"))
        .await
        .unwrap()
        .expect("Expected a response");

    assert_eq!(response.result(), Some(&serde_json::Value::Null));
}
