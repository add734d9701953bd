//! Name resolution against the symbol graph
//!
//! Relative names are looked up the way protoc does it: starting in the innermost
//! enclosing scope and moving outward. For a qualified name only the first component
//! is searched for; once it is found the rest must resolve inside it.

use std::collections::HashSet;

use tower_lsp::lsp_types::Url;

use crate::analysis::graph::{SymbolGraph, SymbolLocation};
use crate::analysis::symbols::{Reference, parent_scope, qualify};
use crate::parser::ast::Span;

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(SymbolLocation),
    /// Nothing visible has that name. `hint` names a file that declares it but is not
    /// imported.
    Unresolved { fqn: Option<String>, hint: Option<Url> },
    /// Several visible files declare the name.
    Ambiguous(Vec<SymbolLocation>),
    /// The name resolved to something of the wrong kind, e.g. an enum used as an rpc input.
    NotAType(SymbolLocation),
    /// A built-in scalar type.
    Scalar,
}

impl Resolution {
    pub fn target(&self) -> Option<&SymbolLocation> {
        match self {
            Resolution::Resolved(location) => Some(location),
            _ => None,
        }
    }
}

/// The declaration a single segment of a qualified name points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTarget {
    pub span: Span,
    pub fqn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub resolution: Resolution,
    /// Segments of the written name that denote declarations, in source order. For a
    /// resolved `Outer.Inner` this is `Outer` and `Inner`; package segments are skipped.
    pub segments: Vec<SegmentTarget>,
}

impl ResolvedReference {
    /// Fully qualified name of the segment under `offset`, if any.
    pub fn segment_at(&self, offset: usize) -> Option<&SegmentTarget> {
        self.segments
            .iter()
            .find(|s| s.span.start <= offset && offset <= s.span.end)
    }
}

/// Resolves references of one file. `visible` is the set of files whose declarations
/// the file can see.
pub struct Resolver<'a> {
    graph: &'a SymbolGraph,
    visible: &'a HashSet<Url>,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a SymbolGraph, visible: &'a HashSet<Url>) -> Self {
        Self { graph, visible }
    }

    fn visible_definitions(&self, fqn: &str) -> Vec<&'a SymbolLocation> {
        self.graph
            .lookup(fqn)
            .iter()
            .filter(|loc| self.visible.contains(&loc.uri))
            .collect()
    }

    fn is_visible_namespace(&self, fqn: &str) -> bool {
        self.graph
            .namespace_files(fqn)
            .is_some_and(|files| files.iter().any(|uri| self.visible.contains(uri)))
    }

    pub fn resolve(&self, reference: &Reference) -> ResolvedReference {
        let name = &reference.name;
        if name.is_scalar() {
            return ResolvedReference {
                reference: reference.clone(),
                resolution: Resolution::Scalar,
                segments: Vec::new(),
            };
        }
        let resolution = match self.candidate(reference) {
            Some(fqn) => self.finish(reference, fqn),
            None if name.absolute => {
                self.finish(reference, name.text.trim_start_matches('.').to_string())
            }
            None => Resolution::Unresolved {
                fqn: None,
                hint: self.hint(reference),
            },
        };

        let segments = match &resolution {
            Resolution::Resolved(target) => self.segments(reference, &target.fqn),
            _ => Vec::new(),
        };
        ResolvedReference {
            reference: reference.clone(),
            resolution,
            segments,
        }
    }

    /// Fully qualified name the reference denotes, found by walking the scope chain.
    fn candidate(&self, reference: &Reference) -> Option<String> {
        let name = &reference.name;
        if name.absolute {
            return None;
        }
        let first = &name.segments.first()?.text;
        let single = name.segments.len() == 1;

        let mut scope = Some(reference.scope.as_str());
        while let Some(current) = scope {
            let head = qualify(current, first);
            let definitions = self.visible_definitions(&head);
            if single {
                // a lone name skips over declarations of the wrong kind, e.g. a field
                // that shadows a message of the same name
                if definitions
                    .iter()
                    .any(|loc| reference.context.looks_for(loc.kind))
                {
                    return Some(head);
                }
            } else if definitions.iter().any(|loc| loc.kind.is_type())
                || self.is_visible_namespace(&head)
            {
                return Some(qualify(current, &name.text));
            }
            scope = parent_scope(current);
        }
        None
    }

    fn finish(&self, reference: &Reference, fqn: String) -> Resolution {
        let definitions = self.visible_definitions(&fqn);
        match definitions.as_slice() {
            [] => Resolution::Unresolved {
                hint: self.graph.lookup(&fqn).first().map(|loc| loc.uri.clone()),
                fqn: Some(fqn),
            },
            [single] if reference.context.accepts(single.kind) => {
                Resolution::Resolved((*single).clone())
            }
            [single] => Resolution::NotAType((*single).clone()),
            many => Resolution::Ambiguous(many.iter().map(|&loc| loc.clone()).collect()),
        }
    }

    /// A file outside the visible set that declares what the reference names.
    fn hint(&self, reference: &Reference) -> Option<Url> {
        let text = &reference.name.text;
        let mut scope = Some(reference.scope.as_str());
        while let Some(current) = scope {
            let location = self
                .graph
                .lookup(&qualify(current, text))
                .iter()
                .find(|loc| reference.context.looks_for(loc.kind));
            if let Some(location) = location {
                return Some(location.uri.clone());
            }
            scope = parent_scope(current);
        }
        None
    }

    fn segments(&self, reference: &Reference, fqn: &str) -> Vec<SegmentTarget> {
        let segments = &reference.name.segments;
        let mut targets = Vec::with_capacity(segments.len());
        let mut prefix = fqn;
        for (i, segment) in segments.iter().enumerate().rev() {
            if i + 1 < segments.len() {
                prefix = parent_scope(prefix).unwrap_or_default();
            }
            if !self.visible_definitions(prefix).is_empty() {
                targets.push(SegmentTarget {
                    span: segment.span.clone(),
                    fqn: prefix.to_string(),
                });
            }
        }
        targets.reverse();
        targets
    }
}
