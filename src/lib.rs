pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod format;
pub mod log;
pub mod lsp;
pub mod parser;
pub mod query;
pub mod workspace;
