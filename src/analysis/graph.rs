//! Workspace-wide symbol graph keyed by fully qualified name

use std::collections::{HashMap, HashSet};

use tower_lsp::lsp_types::Url;

use crate::analysis::symbols::{SymbolKind, SymbolTable};
use crate::parser::ast::Span;

/// A declaration in a specific file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLocation {
    pub uri: Url,
    pub fqn: String,
    pub kind: SymbolKind,
    pub name_span: Span,
    pub span: Span,
}

/// Every declaration of every indexed file.
///
/// A fully qualified name may map to several locations when different files declare
/// the same name; which of them a reference sees depends on its file's imports.
#[derive(Debug, Clone, Default)]
pub struct SymbolGraph {
    symbols: HashMap<String, Vec<SymbolLocation>>,
    /// Package name and each of its prefixes, mapped to the files declaring them.
    namespaces: HashMap<String, HashSet<Url>>,
}

impl SymbolGraph {
    pub fn insert_file(&mut self, uri: &Url, table: &SymbolTable) {
        for symbol in table.symbols.values() {
            self.symbols
                .entry(symbol.fqn.clone())
                .or_default()
                .push(SymbolLocation {
                    uri: uri.clone(),
                    fqn: symbol.fqn.clone(),
                    kind: symbol.kind,
                    name_span: symbol.name_span.clone(),
                    span: symbol.span.clone(),
                });
        }
        for namespace in package_prefixes(table.package.as_deref()) {
            self.namespaces
                .entry(namespace)
                .or_default()
                .insert(uri.clone());
        }
    }

    /// Drop everything `table` contributed for `uri`.
    pub fn remove_file(&mut self, uri: &Url, table: &SymbolTable) {
        for fqn in table.symbols.keys() {
            if let Some(locations) = self.symbols.get_mut(fqn) {
                locations.retain(|loc| &loc.uri != uri);
                if locations.is_empty() {
                    self.symbols.remove(fqn);
                }
            }
        }
        for namespace in package_prefixes(table.package.as_deref()) {
            if let Some(files) = self.namespaces.get_mut(&namespace) {
                files.remove(uri);
                if files.is_empty() {
                    self.namespaces.remove(&namespace);
                }
            }
        }
    }

    /// All declarations of `fqn`, in every file.
    pub fn lookup(&self, fqn: &str) -> &[SymbolLocation] {
        self.symbols.get(fqn).map(Vec::as_slice).unwrap_or_default()
    }

    /// Files whose package is `fqn` or nested under it.
    pub fn namespace_files(&self, fqn: &str) -> Option<&HashSet<Url>> {
        self.namespaces.get(fqn)
    }

    pub fn is_namespace(&self, fqn: &str) -> bool {
        self.namespaces.contains_key(fqn)
    }

    /// Names of packages and declarations directly under `scope`.
    pub fn children<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = ChildName<'a>> + 'a {
        let namespaces = self
            .namespaces
            .keys()
            .filter_map(move |ns| direct_child(scope, ns).map(ChildName::Namespace));
        let symbols = self
            .symbols
            .iter()
            .filter_map(move |(fqn, locations)| {
                direct_child(scope, fqn).map(|name| ChildName::Symbol(name, locations))
            });
        namespaces.chain(symbols)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A direct child of a scope as returned by [`SymbolGraph::children`].
#[derive(Debug, Clone, Copy)]
pub enum ChildName<'a> {
    Namespace(&'a str),
    Symbol(&'a str, &'a [SymbolLocation]),
}

fn direct_child<'a>(scope: &str, fqn: &'a str) -> Option<&'a str> {
    let rest = if scope.is_empty() {
        fqn
    } else {
        fqn.strip_prefix(scope)?.strip_prefix('.')?
    };
    (!rest.is_empty() && !rest.contains('.')).then_some(rest)
}

/// `a.b.c` -> `a`, `a.b`, `a.b.c`
fn package_prefixes(package: Option<&str>) -> Vec<String> {
    let Some(package) = package.filter(|p| !p.is_empty()) else {
        return Vec::new();
    };
    package
        .match_indices('.')
        .map(|(i, _)| package[..i].to_string())
        .chain(std::iter::once(package.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn table(text: &str) -> SymbolTable {
        SymbolTable::build(&parse(text).root)
    }

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}")).unwrap()
    }

    #[test]
    fn insert_and_remove_file() {
        let a = table("package x.y;\nmessage Foo {}\n");
        let b = table("package x.y;\nmessage Foo {}\nmessage Bar {}\n");
        let mut graph = SymbolGraph::default();
        graph.insert_file(&uri("a.proto"), &a);
        graph.insert_file(&uri("b.proto"), &b);

        assert_eq!(graph.lookup("x.y.Foo").len(), 2);
        assert!(graph.is_namespace("x"));
        assert!(graph.is_namespace("x.y"));

        graph.remove_file(&uri("b.proto"), &b);
        assert_eq!(graph.lookup("x.y.Foo").len(), 1);
        assert!(graph.lookup("x.y.Bar").is_empty());
        assert_eq!(graph.namespace_files("x.y").map(HashSet::len), Some(1));

        graph.remove_file(&uri("a.proto"), &a);
        assert!(graph.is_empty());
        assert!(!graph.is_namespace("x"));
    }

    #[test]
    fn children_lists_direct_members_only() {
        let mut graph = SymbolGraph::default();
        graph.insert_file(
            &uri("a.proto"),
            &table("package x.y;\nmessage Foo { message Inner {} }\n"),
        );

        let mut names: Vec<&str> = graph
            .children("x")
            .map(|child| match child {
                ChildName::Namespace(name) | ChildName::Symbol(name, _) => name,
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["y"]);

        let names: Vec<&str> = graph
            .children("x.y.Foo")
            .filter_map(|child| match child {
                ChildName::Symbol(name, _) => Some(name),
                ChildName::Namespace(_) => None,
            })
            .collect();
        assert_eq!(names, vec!["Inner"]);
    }

    #[test]
    fn package_prefixes_expand_each_level() {
        assert_eq!(package_prefixes(Some("a.b.c")), vec!["a", "a.b", "a.b.c"]);
        assert!(package_prefixes(None).is_empty());
    }
}
