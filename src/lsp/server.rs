use std::path::PathBuf;

use tower_lsp::{LspService, Server};
use tracing::info;

use crate::log::init;
use crate::lsp::backend::Backend;

/// Serve LSP over stdin/stdout until the client sends `exit`. `log_path` overrides the
/// default log file location.
pub async fn run_server(log_path: Option<PathBuf>) -> anyhow::Result<()> {
    let _guard = init(log_path.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting protobuf-language-server"
    );

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    info!("protobuf-language-server stopped");
    Ok(())
}
