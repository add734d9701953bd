use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::format::Formatter;
use crate::lsp::convert;
use crate::lsp::worker::{AnalysisWorker, Task};
use crate::query::{self, QueryError};
use crate::workspace::loader::{FileSystem, RealFs};
use crate::workspace::{Snapshot, SourceFile, WorkspaceIndex};

pub struct Backend {
    client: Client,
    index: Arc<WorkspaceIndex>,
    worker: AnalysisWorker,
    /// Workspace root from `initialize`, used to anchor relative settings paths.
    root: OnceLock<PathBuf>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self::build(client, Arc::new(RealFs))
    }

    /// Build a backend reading imported files through `fs`.
    pub fn build(client: Client, fs: Arc<dyn FileSystem>) -> Self {
        let index = Arc::new(WorkspaceIndex::new(fs));
        let worker = AnalysisWorker::spawn(client.clone(), index.clone());
        Self {
            client,
            index,
            worker,
            root: OnceLock::new(),
        }
    }

    pub fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                    ..Default::default()
                },
            )),
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(vec![".".to_string()]),
                ..Default::default()
            }),
            definition_provider: Some(OneOf::Left(true)),
            references_provider: Some(OneOf::Left(true)),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            document_symbol_provider: Some(OneOf::Left(true)),
            document_formatting_provider: Some(OneOf::Left(true)),
            rename_provider: Some(OneOf::Right(RenameOptions {
                prepare_provider: Some(true),
                work_done_progress_options: Default::default(),
            })),
            ..Default::default()
        }
    }

    fn settings(&self, value: &Value) -> Option<Settings> {
        Settings::from_value(value, self.root.get().map(PathBuf::as_path))
            .inspect_err(|e| warn!("Ignoring invalid settings: {}", e))
            .ok()
    }

    /// Run a query against the latest snapshot on the blocking pool.
    async fn query<T, F>(&self, method: &'static str, run: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Snapshot) -> std::result::Result<T, QueryError> + Send + 'static,
    {
        let snapshot = self.index.snapshot();
        match tokio::task::spawn_blocking(move || run(&snapshot)).await {
            Ok(result) => result.map_err(|err| {
                debug!(method, error = %err, "query failed");
                convert::query_error(err)
            }),
            Err(err) => {
                error!(method, error = %err, "query task failed");
                Err(Error::internal_error())
            }
        }
    }

    async fn register_file_watcher(client: Client) {
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String("**/*.proto".to_string()),
                kind: None,
            }],
        };
        let registration = Registration {
            id: "protobuf-watched-files".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(options).ok(),
        };
        if let Err(e) = client.register_capability(vec![registration]).await {
            warn!("Failed to register file watcher: {}", e);
        }
    }
}

fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    let folder = params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .map(|folder| &folder.uri);
    #[allow(deprecated)]
    let uri = folder.or(params.root_uri.as_ref())?;
    uri.to_file_path().ok()
}

/// Run `formatter` over `file`, giving up once a newer version replaces the file.
async fn format_document(file: &SourceFile, formatter: &Formatter) -> Result<Vec<TextEdit>> {
    let formatted = tokio::select! {
        result = formatter.format(file.file_name(), &file.text) => result,
        () = file.cancellation().cancelled() => {
            return Err(convert::query_error(QueryError::Superseded));
        }
    };
    let formatted = formatted.map_err(|err| {
        warn!(uri = %file.uri, error = %err, "formatting failed");
        convert::format_error(err)
    })?;
    Ok(convert::replace_all(file, formatted))
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.client
            .log_message(MessageType::INFO, "LSP server initializing")
            .await;

        if let Some(root) = workspace_root(&params) {
            info!("Workspace root: {:?}", root);
            let _ = self.root.set(root);
        }
        if let Some(options) = &params.initialization_options
            && let Some(settings) = self.settings(options)
        {
            self.worker.submit(Task::Configure(settings));
        }

        let watch_files = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|w| w.did_change_watched_files.as_ref())
            .and_then(|c| c.dynamic_registration)
            .unwrap_or(false);
        if watch_files {
            tokio::spawn(Self::register_file_watcher(self.client.clone()));
        }

        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: "protobuf-language-server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.client
            .log_message(MessageType::INFO, "LSP server shutting down")
            .await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        debug!("Document opened: {}", document.uri);
        self.worker.submit(Task::Open {
            uri: document.uri,
            text: document.text,
            version: document.version,
        });
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.worker.submit(Task::Change {
            uri: params.text_document.uri,
            version: params.text_document.version,
            changes: params.content_changes,
        });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        debug!("Document closed: {}", params.text_document.uri);
        self.worker.submit(Task::Close {
            uri: params.text_document.uri,
        });
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.worker.submit(Task::Reload {
            uri: params.text_document.uri,
        });
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for change in params.changes {
            if !change.uri.path().ends_with(".proto") {
                continue;
            }
            let task = if change.typ == FileChangeType::DELETED {
                Task::Remove { uri: change.uri }
            } else {
                Task::Reload { uri: change.uri }
            };
            self.worker.submit(task);
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Some(settings) = self.settings(&params.settings) {
            self.worker.submit(Task::Configure(settings));
        }
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params;
        let locations = self
            .query("definition", move |snapshot| {
                query::definition(snapshot, &position.text_document.uri, position.position)
            })
            .await?;
        Ok((!locations.is_empty()).then_some(GotoDefinitionResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let position = params.text_document_position;
        let include_declaration = params.context.include_declaration;
        let locations = self
            .query("references", move |snapshot| {
                query::references(
                    snapshot,
                    &position.text_document.uri,
                    position.position,
                    include_declaration,
                )
            })
            .await?;
        Ok(Some(locations))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params;
        self.query("hover", move |snapshot| {
            query::hover(snapshot, &position.text_document.uri, position.position)
        })
        .await
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position;
        let items = self
            .query("completion", move |snapshot| {
                query::completion(snapshot, &position.text_document.uri, position.position)
            })
            .await?;
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        self.query("prepareRename", move |snapshot| {
            query::prepare_rename(snapshot, &params.text_document.uri, params.position)
        })
        .await
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let position = params.text_document_position;
        let new_name = params.new_name;
        self.query("rename", move |snapshot| {
            query::rename(
                snapshot,
                &position.text_document.uri,
                position.position,
                &new_name,
            )
        })
        .await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let symbols = self
            .query("documentSymbol", move |snapshot| {
                query::document_symbols(snapshot, &params.text_document.uri)
            })
            .await?;
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let snapshot = self.index.snapshot();
        let Some(file) = snapshot.file(&params.text_document.uri).cloned() else {
            return Ok(None);
        };
        let formatter = Formatter::clang_format(snapshot.settings().clang_format_path.clone());
        format_document(&file, &formatter).await.map(Some)
    }
}
