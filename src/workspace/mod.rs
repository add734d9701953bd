//! Workspace layer
//! - source.rs: SourceFile (one parsed document version)
//! - line_index.rs: byte offset <-> UTF-16 position conversion
//! - loader.rs: FileSystem trait and import path resolution
//! - index.rs: WorkspaceIndex and immutable snapshots

pub mod index;
pub mod line_index;
pub mod loader;
pub mod source;

pub use index::{IndexError, Snapshot, Update, WorkspaceIndex};
pub use line_index::LineIndex;
pub use loader::{FileSystem, FsError, RealFs};
pub use source::SourceFile;
