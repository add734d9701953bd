//! Query layer: editor requests answered against one snapshot
//! - definition.rs: go to definition
//! - references.rs: find references
//! - hover.rs: declaration source with leading comments
//! - completion.rs: type names visible at the cursor
//! - rename.rs: prepare rename and rename
//! - document_symbols.rs: hierarchical outline

pub mod completion;
pub mod definition;
pub mod document_symbols;
pub mod hover;
pub mod references;
pub mod rename;

use thiserror::Error;
use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::analysis::resolver::Resolution;
use crate::analysis::{FileAnalysis, SymbolLocation};
use crate::parser::ast::{Span, contains};
use crate::workspace::{Snapshot, SourceFile};

pub use completion::completion;
pub use definition::definition;
pub use document_symbols::document_symbols;
pub use hover::hover;
pub use references::references;
pub use rename::{prepare_rename, rename};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("document was modified while the request was running")]
    Superseded,

    #[error("`{0}` is not a valid identifier")]
    InvalidName(String),

    #[error("`{name}` is already declared in {scope}")]
    NameCollision { name: String, scope: String },

    #[error("{0} cannot be renamed")]
    NotRenameable(String),
}

/// An open or imported file together with its analysis.
pub(crate) struct Document<'a> {
    pub snapshot: &'a Snapshot,
    pub file: &'a SourceFile,
    pub analysis: &'a FileAnalysis,
}

impl<'a> Document<'a> {
    pub fn get(snapshot: &'a Snapshot, uri: &Url) -> Option<Self> {
        Some(Self {
            snapshot,
            file: snapshot.file(uri)?,
            analysis: snapshot.analysis(uri)?,
        })
    }

    pub fn offset(&self, position: Position) -> usize {
        self.file.lines.offset(&self.file.text, position)
    }

    pub fn range(&self, span: &Span) -> Range {
        self.file.lines.range(&self.file.text, span)
    }

    /// Fails once a newer version of the file has been committed.
    pub fn ensure_current(&self) -> Result<(), QueryError> {
        if self.file.is_superseded() {
            return Err(QueryError::Superseded);
        }
        Ok(())
    }

    /// The declaration of `fqn` this file sees.
    pub fn visible_location(&self, fqn: &str) -> Option<&'a SymbolLocation> {
        self.snapshot
            .graph()
            .lookup(fqn)
            .iter()
            .find(|loc| self.analysis.visible.contains(&loc.uri))
    }
}

/// What the cursor is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Symbol(SymbolLocation),
    Ambiguous(Vec<SymbolLocation>),
    Import { path: String, target: Option<Url> },
    Scalar(String),
    Package(String),
    Unresolved(String),
}

impl Target {
    pub fn describe(&self) -> String {
        match self {
            Target::Symbol(loc) => format!("{} `{}`", loc.kind.describe(), loc.fqn),
            Target::Ambiguous(locs) => match locs.first() {
                Some(loc) => format!("ambiguous name `{}`", loc.fqn),
                None => "ambiguous name".to_string(),
            },
            Target::Import { path, .. } => format!("import \"{path}\""),
            Target::Scalar(name) => format!("built-in type `{name}`"),
            Target::Package(name) => format!("package `{name}`"),
            Target::Unresolved(name) => format!("unresolved name `{name}`"),
        }
    }
}

/// A target and the source span the cursor hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub target: Target,
    pub span: Span,
}

/// Find what is at `offset`: an import path, a name in a type reference, a declared
/// name or the package name.
pub(crate) fn target_at(doc: &Document<'_>, offset: usize) -> Option<Hit> {
    let table = &doc.file.table;

    if let Some(decl) = table.imports.iter().find(|d| contains(&d.path_span, offset)) {
        let target = doc
            .snapshot
            .imports()
            .links(&doc.file.uri)
            .iter()
            .find(|link| link.path == decl.path)
            .and_then(|link| link.target.clone());
        return Some(Hit {
            target: Target::Import {
                path: decl.path.clone(),
                target,
            },
            span: decl.path_span.clone(),
        });
    }

    if let Some(resolved) = doc.analysis.reference_at(offset) {
        let name = &resolved.reference.name;
        if let Some(segment) = resolved.segment_at(offset)
            && let Some(location) = doc.visible_location(&segment.fqn)
        {
            return Some(Hit {
                target: Target::Symbol(location.clone()),
                span: segment.span.clone(),
            });
        }

        let target = match &resolved.resolution {
            Resolution::Resolved(_) => {
                // only package segments have no declaration
                let index = name
                    .segments
                    .iter()
                    .position(|s| contains(&s.span, offset))?;
                let package: Vec<&str> = name.segments[..=index]
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect();
                return Some(Hit {
                    target: Target::Package(package.join(".")),
                    span: name.segments[index].span.clone(),
                });
            }
            Resolution::Scalar => Target::Scalar(name.text.clone()),
            Resolution::Ambiguous(locations) => Target::Ambiguous(locations.clone()),
            Resolution::NotAType(location) => Target::Symbol(location.clone()),
            Resolution::Unresolved { .. } => Target::Unresolved(name.text.clone()),
        };
        return Some(Hit {
            target,
            span: name.span.clone(),
        });
    }

    if let Some(symbol) = table.symbol_at(offset) {
        return Some(Hit {
            target: Target::Symbol(SymbolLocation {
                uri: doc.file.uri.clone(),
                fqn: symbol.fqn.clone(),
                kind: symbol.kind,
                name_span: symbol.name_span.clone(),
                span: symbol.span.clone(),
            }),
            span: symbol.name_span.clone(),
        });
    }

    if let (Some(package), Some(span)) = (&table.package, &table.package_span)
        && contains(span, offset)
    {
        return Some(Hit {
            target: Target::Package(package.clone()),
            span: span.clone(),
        });
    }

    None
}

/// Convert a span of any indexed file to an LSP location.
pub(crate) fn location(snapshot: &Snapshot, uri: &Url, span: &Span) -> Option<Location> {
    let file = snapshot.file(uri)?;
    Some(Location::new(uri.clone(), file.lines.range(&file.text, span)))
}

/// Every written name, across the workspace, that denotes the declaration `target`.
/// Sorted by file, then position.
pub(crate) fn occurrences(snapshot: &Snapshot, target: &SymbolLocation) -> Vec<(Url, Span)> {
    let mut found = Vec::new();
    for file in snapshot.files() {
        let Some(analysis) = snapshot.analysis(&file.uri) else {
            continue;
        };
        if !analysis.visible.contains(&target.uri) {
            continue;
        }
        for resolved in &analysis.references {
            found.extend(
                resolved
                    .segments
                    .iter()
                    .filter(|segment| segment.fqn == target.fqn)
                    .map(|segment| (file.uri.clone(), segment.span.clone())),
            );
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.start.cmp(&b.1.start)));
    found
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tower_lsp::lsp_types::{Position, Url};

    use crate::workspace::loader::{FsError, MockFileSystem};
    use crate::workspace::{Snapshot, WorkspaceIndex};

    pub fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}")).unwrap()
    }

    /// Open every file in a fresh index backed by an empty filesystem.
    pub fn snapshot(files: &[(&str, &str)]) -> Arc<Snapshot> {
        index(files).snapshot()
    }

    pub fn index(files: &[(&str, &str)]) -> WorkspaceIndex {
        let mut fs = MockFileSystem::new();
        fs.expect_is_file().returning(|_| false);
        fs.expect_read().returning(|path| {
            Err(FsError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });
        let index = WorkspaceIndex::new(Arc::new(fs));
        for (name, text) in files {
            index.open(uri(name), text.to_string(), 1).unwrap();
        }
        index
    }

    /// Position of the first occurrence of `needle` in `text`, plus `shift` characters.
    /// Only valid for ASCII text.
    pub fn position_of(text: &str, needle: &str, shift: u32) -> Position {
        let offset = text.find(needle).unwrap();
        let line = text[..offset].matches('\n').count() as u32;
        let column = offset - text[..offset].rfind('\n').map_or(0, |i| i + 1);
        Position::new(line, column as u32 + shift)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{index, position_of, snapshot, uri};
    use super::*;
    use crate::analysis::SymbolKind;

    #[test]
    fn queries_against_a_replaced_version_are_superseded() {
        let text = "message Foo {}\nmessage Bar { Foo f = 1; }\n";
        let index = index(&[("a.proto", text)]);
        let stale = index.snapshot();
        index.change(uri("a.proto"), text.to_string(), 2).unwrap();
        let position = position_of(text, "Foo f", 0);

        assert_eq!(
            definition(&stale, &uri("a.proto"), position),
            Err(QueryError::Superseded)
        );
        assert_eq!(
            references(&stale, &uri("a.proto"), position, true),
            Err(QueryError::Superseded)
        );
        assert_eq!(
            rename(&stale, &uri("a.proto"), position, "Renamed"),
            Err(QueryError::Superseded)
        );
        assert_eq!(
            document_symbols(&stale, &uri("a.proto")),
            Err(QueryError::Superseded)
        );

        let current = definition(&index.snapshot(), &uri("a.proto"), position).unwrap();
        assert_eq!(current.len(), 1);
    }

    fn hit(files: &[(&str, &str)], file: &str, needle: &str, shift: u32) -> Option<Hit> {
        let snapshot = snapshot(files);
        let doc = Document::get(&snapshot, &uri(file)).unwrap();
        let text = files.iter().find(|(n, _)| *n == file).unwrap().1;
        target_at(&doc, doc.offset(position_of(text, needle, shift)))
    }

    #[test]
    fn target_at_reference_segment_and_package_segment() {
        let a = "package dep;\nmessage Outer { message Inner {} }\n";
        let b = "package app;\nimport \"a.proto\";\nmessage M { dep.Outer.Inner x = 1; }\n";
        let files = [("a.proto", a), ("b.proto", b)];

        let on_inner = hit(&files, "b.proto", "Inner x", 1).unwrap();
        let Target::Symbol(location) = on_inner.target else {
            panic!("expected a symbol");
        };
        assert_eq!(location.fqn, "dep.Outer.Inner");
        assert_eq!(location.uri, uri("a.proto"));

        let on_outer = hit(&files, "b.proto", "Outer.Inner", 0).unwrap();
        assert!(matches!(on_outer.target, Target::Symbol(ref loc) if loc.fqn == "dep.Outer"));

        let on_package = hit(&files, "b.proto", "dep.Outer", 1).unwrap();
        assert_eq!(on_package.target, Target::Package("dep".to_string()));
    }

    #[test]
    fn target_at_declaration_import_and_scalar() {
        let a = "message Foo { string name = 1; }\n";
        let b = "import \"a.proto\";\nimport \"missing.proto\";\nmessage Bar { Foo f = 1; }\n";
        let files = [("a.proto", a), ("b.proto", b)];

        let declaration = hit(&files, "a.proto", "Foo", 0).unwrap();
        assert!(matches!(
            declaration.target,
            Target::Symbol(ref loc) if loc.kind == SymbolKind::Message && loc.fqn == "Foo"
        ));

        let import = hit(&files, "b.proto", "a.proto", 0).unwrap();
        assert_eq!(
            import.target,
            Target::Import {
                path: "a.proto".to_string(),
                target: Some(uri("a.proto")),
            }
        );

        let missing = hit(&files, "b.proto", "missing", 0).unwrap();
        assert!(matches!(missing.target, Target::Import { target: None, .. }));

        let scalar = hit(&files, "a.proto", "string", 2).unwrap();
        assert_eq!(scalar.target, Target::Scalar("string".to_string()));
    }

    #[test]
    fn target_at_whitespace_is_none() {
        let files = [("a.proto", "message Foo {\n\n}\n")];
        let snapshot = snapshot(&files);
        let doc = Document::get(&snapshot, &uri("a.proto")).unwrap();
        assert_eq!(target_at(&doc, doc.offset(Position::new(1, 0))), None);
    }

    #[test]
    fn occurrences_cover_every_importer() {
        let a = "message Foo {}\nmessage Uses { Foo a = 1; Foo b = 2; }\n";
        let b = "import \"a.proto\";\nmessage Bar { Foo f = 1; }\n";
        let c = "message Foo {}\nmessage Unrelated { Foo f = 1; }\n";
        let snapshot = snapshot(&[("a.proto", a), ("b.proto", b), ("c.proto", c)]);
        let foo = snapshot
            .graph()
            .lookup("Foo")
            .iter()
            .find(|loc| loc.uri == uri("a.proto"))
            .unwrap()
            .clone();

        let found: Vec<Url> = occurrences(&snapshot, &foo)
            .into_iter()
            .map(|(uri, _)| uri)
            .collect();

        assert_eq!(found, vec![uri("a.proto"), uri("a.proto"), uri("b.proto")]);
    }
}
