//! Import path resolution and file loading

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tower_lsp::lsp_types::Url;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a file URI: {0}")]
    NotFileUri(Url),
}

/// Read access to files that are imported but not open in the editor.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// Reads a file as text. Invalid UTF-8 is replaced rather than rejected.
    fn read(&self, path: &Path) -> Result<String, FsError>;

    fn is_file(&self, path: &Path) -> bool;
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn read(&self, path: &Path) -> Result<String, FsError> {
        let bytes = std::fs::read(path).map_err(|source| FsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Reads the file behind a `file://` URI.
pub fn read_uri(fs: &dyn FileSystem, uri: &Url) -> Result<String, FsError> {
    let path = uri
        .to_file_path()
        .map_err(|()| FsError::NotFileUri(uri.clone()))?;
    fs.read(&path)
}

/// Finds the file an `import` statement refers to.
///
/// The path is tried relative to the importing file's directory and then each of its
/// ancestors, so a file in `proto/a/b.proto` can import `a/c.proto`. After that each of
/// `extra_dirs` is tried in order. A candidate counts when it is already indexed
/// (`is_known`) or exists on disk.
pub fn resolve_import(
    fs: &dyn FileSystem,
    importer: &Url,
    import_path: &str,
    extra_dirs: &[PathBuf],
    is_known: impl Fn(&Url) -> bool,
) -> Option<Url> {
    let relative = Path::new(import_path);
    if relative.is_absolute() {
        return None;
    }

    let ancestors = importer
        .to_file_path()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .into_iter()
        .flat_map(|dir| {
            dir.ancestors()
                .map(Path::to_path_buf)
                .collect::<Vec<_>>()
        });

    ancestors
        .chain(extra_dirs.iter().cloned())
        .filter_map(|dir| {
            let candidate = normalize(&dir.join(relative));
            let uri = Url::from_file_path(&candidate).ok()?;
            Some((candidate, uri))
        })
        .find(|(candidate, uri)| is_known(uri) || fs.is_file(candidate))
        .map(|(_, uri)| uri)
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
