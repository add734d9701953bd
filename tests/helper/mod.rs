//! Shared helpers for driving the server through `tower::Service`
#![allow(dead_code)]

use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower_lsp::ClientSocket;
use tower_lsp::jsonrpc::Request;
use tower_lsp::lsp_types::PublishDiagnosticsParams;

const TIMEOUT: Duration = Duration::from_secs(5);

pub fn create_initialize_request(id: i64) -> Request {
    Request::build("initialize")
        .id(id)
        .params(json!({ "capabilities": {} }))
        .finish()
}

pub fn create_initialized_notification() -> Request {
    Request::build("initialized").params(json!({})).finish()
}

pub fn create_shutdown_request(id: i64) -> Request {
    Request::build("shutdown").id(id).finish()
}

pub fn create_did_open_notification(uri: &str, text: &str) -> Request {
    Request::build("textDocument/didOpen")
        .params(json!({
            "textDocument": {
                "uri": uri,
                "languageId": "proto",
                "version": 1,
                "text": text,
            }
        }))
        .finish()
}

/// Full-text change.
pub fn create_did_change_notification(uri: &str, version: i32, text: &str) -> Request {
    Request::build("textDocument/didChange")
        .params(json!({
            "textDocument": { "uri": uri, "version": version },
            "contentChanges": [{ "text": text }],
        }))
        .finish()
}

pub fn create_did_close_notification(uri: &str) -> Request {
    Request::build("textDocument/didClose")
        .params(json!({ "textDocument": { "uri": uri } }))
        .finish()
}

/// A request at a position in a document, e.g. `textDocument/definition`.
pub fn create_position_request(
    id: i64,
    method: &'static str,
    uri: &str,
    line: u32,
    character: u32,
    extra: Value,
) -> Request {
    let mut params = json!({
        "textDocument": { "uri": uri },
        "position": { "line": line, "character": character },
    });
    if let (Some(params), Value::Object(extra)) = (params.as_object_mut(), extra) {
        params.extend(extra);
    }
    Request::build(method).id(id).params(params).finish()
}

/// Forward every server-to-client message into a channel.
pub fn spawn_notification_collector(socket: ClientSocket) -> mpsc::UnboundedReceiver<Request> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut socket = socket;
        while let Some(message) = socket.next().await {
            if tx.send(message).is_err() {
                break;
            }
        }
    });
    rx
}

pub async fn wait_for_notification(
    rx: &mut mpsc::UnboundedReceiver<Request>,
    method: &str,
) -> Option<Request> {
    tokio::time::timeout(TIMEOUT, async {
        while let Some(message) = rx.recv().await {
            if message.method() == method {
                return Some(message);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// The next diagnostics published for `uri`, skipping those of other documents.
pub async fn wait_for_diagnostics(
    rx: &mut mpsc::UnboundedReceiver<Request>,
    uri: &str,
) -> Option<PublishDiagnosticsParams> {
    loop {
        let notification = wait_for_notification(rx, "textDocument/publishDiagnostics").await?;
        let params: PublishDiagnosticsParams =
            serde_json::from_value(notification.params()?.clone()).ok()?;
        if params.uri.as_str() == uri {
            return Some(params);
        }
    }
}
