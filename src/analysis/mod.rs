//! Symbol resolution layer
//! - symbols.rs: per-file symbol table (declarations, references, imports)
//! - graph.rs: workspace-wide FQN -> declaration map
//! - imports.rs: import edges, visibility and cycle detection
//! - resolver.rs: scope-chain name lookup

pub mod graph;
pub mod imports;
pub mod resolver;
pub mod symbols;

use std::collections::HashSet;

use tower_lsp::lsp_types::Url;

use crate::diagnostics::{self, Diagnostic};
use crate::workspace::SourceFile;

pub use graph::{SymbolGraph, SymbolLocation};
pub use imports::{ImportCycles, ImportGraph, ImportLink};
pub use resolver::{Resolution, ResolvedReference, Resolver};
pub use symbols::{Symbol, SymbolKind, SymbolTable};

/// Everything derived from a file together with the rest of the workspace.
#[derive(Debug, Clone, Default)]
pub struct FileAnalysis {
    /// Resolution of every reference in the file, in the order of
    /// [`SymbolTable::references`].
    pub references: Vec<ResolvedReference>,
    /// Files whose declarations this file can see, itself included.
    pub visible: HashSet<Url>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileAnalysis {
    /// The resolved reference whose name covers `offset`.
    pub fn reference_at(&self, offset: usize) -> Option<&ResolvedReference> {
        self.references.iter().find(|r| {
            let span = &r.reference.name.span;
            span.start <= offset && offset <= span.end
        })
    }
}

/// Resolve a file's references and compute its diagnostics.
pub fn analyze(
    file: &SourceFile,
    graph: &SymbolGraph,
    imports: &ImportGraph,
    cycles: &ImportCycles,
) -> FileAnalysis {
    let visible = imports.visible_from(&file.uri);
    let resolver = Resolver::new(graph, &visible);
    let references: Vec<ResolvedReference> = file
        .table
        .references
        .iter()
        .map(|reference| resolver.resolve(reference))
        .collect();

    let diagnostics = diagnostics::compute(&diagnostics::Inputs {
        file,
        references: &references,
        visible: &visible,
        graph,
        imports,
        cycles,
    });

    FileAnalysis {
        references,
        visible,
        diagnostics,
    }
}
