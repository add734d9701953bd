use std::path::PathBuf;

use clap::Parser;

use protobuf_language_server::lsp::server::run_server;

/// Language server for Protocol Buffers schema files.
#[derive(Debug, Parser)]
#[command(name = "protobuf-language-server", version, about, long_about = None)]
struct Cli {
    /// Write logs to this file instead of the data directory
    #[arg(long, value_name = "PATH")]
    logs: Option<PathBuf>,

    /// Communicate over stdin/stdout (the only transport)
    #[arg(long, hide = true)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_server(cli.logs).await
}
