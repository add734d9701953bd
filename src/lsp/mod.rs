// LSP protocol layer
// - server.rs: stdio server entry point
// - backend.rs: LanguageServer trait implementation
// - worker.rs: ordered analysis queue and diagnostics publishing
// - convert.rs: analysis results to LSP types
pub mod backend;
pub mod convert;
pub mod server;
pub mod worker;
