//! Import graph between indexed files

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tower_lsp::lsp_types::Url;

use crate::parser::ast::ImportKind;

/// One `import` statement of a file and the file it resolved to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLink {
    pub path: String,
    pub kind: ImportKind,
    pub target: Option<Url>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportGraph {
    /// Links in the same order as the file's import statements.
    forward: HashMap<Url, Vec<ImportLink>>,
    reverse: HashMap<Url, HashSet<Url>>,
}

impl ImportGraph {
    /// Replace the outgoing imports of `uri`.
    pub fn set_links(&mut self, uri: &Url, links: Vec<ImportLink>) {
        self.clear_reverse(uri);
        for target in links.iter().filter_map(|link| link.target.as_ref()) {
            self.reverse
                .entry(target.clone())
                .or_default()
                .insert(uri.clone());
        }
        self.forward.insert(uri.clone(), links);
    }

    /// Forget the outgoing imports of `uri`. Links from other files pointing at it are
    /// left for the caller to re-resolve.
    pub fn remove(&mut self, uri: &Url) {
        self.clear_reverse(uri);
        self.forward.remove(uri);
    }

    fn clear_reverse(&mut self, uri: &Url) {
        let Some(old) = self.forward.get(uri) else {
            return;
        };
        for target in old.iter().filter_map(|link| link.target.as_ref()) {
            if let Some(importers) = self.reverse.get_mut(target) {
                importers.remove(uri);
                if importers.is_empty() {
                    self.reverse.remove(target);
                }
            }
        }
    }

    pub fn links(&self, uri: &Url) -> &[ImportLink] {
        self.forward.get(uri).map(Vec::as_slice).unwrap_or_default()
    }

    /// Files that import `uri` directly.
    pub fn importers(&self, uri: &Url) -> impl Iterator<Item = &Url> {
        self.reverse.get(uri).into_iter().flatten()
    }

    pub fn is_imported(&self, uri: &Url) -> bool {
        self.reverse.get(uri).is_some_and(|importers| !importers.is_empty())
    }

    /// Every file that imports `uri` directly or transitively, excluding `uri` itself.
    pub fn dependents(&self, uri: &Url) -> HashSet<Url> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&Url> = self.importers(uri).collect();
        while let Some(next) = queue.pop_front() {
            if next == uri || !seen.insert(next.clone()) {
                continue;
            }
            queue.extend(self.importers(next));
        }
        seen
    }

    /// Files with at least one import that did not resolve.
    pub fn files_with_unresolved_imports(&self) -> impl Iterator<Item = &Url> {
        self.forward
            .iter()
            .filter(|(_, links)| links.iter().any(|link| link.target.is_none()))
            .map(|(uri, _)| uri)
    }

    /// Files whose declarations are visible from `uri`: the file itself, its direct
    /// imports, and whatever those re-export through `import public`, transitively.
    pub fn visible_from(&self, uri: &Url) -> HashSet<Url> {
        let mut visible = HashSet::from([uri.clone()]);
        let mut queue: VecDeque<&Url> = VecDeque::new();
        for target in self.links(uri).iter().filter_map(|link| link.target.as_ref()) {
            if visible.insert(target.clone()) {
                queue.push_back(target);
            }
        }
        while let Some(next) = queue.pop_front() {
            let public = self
                .links(next)
                .iter()
                .filter(|link| link.kind == ImportKind::Public)
                .filter_map(|link| link.target.as_ref());
            for target in public {
                if visible.insert(target.clone()) {
                    queue.push_back(target);
                }
            }
        }
        visible
    }

    /// Strongly connected components of the import graph that form a cycle, including
    /// files that import themselves.
    pub fn cycles(&self) -> ImportCycles {
        let mut graph: DiGraph<&Url, ()> = DiGraph::new();
        let mut nodes: HashMap<&Url, NodeIndex> = HashMap::new();
        for (from, links) in &self.forward {
            let from_node = node_index(&mut graph, &mut nodes, from);
            for target in links.iter().filter_map(|link| link.target.as_ref()) {
                let to_node = node_index(&mut graph, &mut nodes, target);
                graph.update_edge(from_node, to_node, ());
            }
        }

        let mut cycles = ImportCycles::default();
        for component in tarjan_scc(&graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.contains_edge(n, n));
            if !cyclic {
                continue;
            }
            let id = cycles.components.len();
            let members: HashSet<Url> = component.iter().map(|&n| graph[n].clone()).collect();
            for member in &members {
                cycles.membership.insert(member.clone(), id);
            }
            cycles.components.push(members);
        }
        cycles
    }

    /// Shortest chain of imports from `from` to `to`, both included.
    pub fn path(&self, from: &Url, to: &Url) -> Option<Vec<Url>> {
        let mut previous: HashMap<&Url, &Url> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for target in self.links(current).iter().filter_map(|l| l.target.as_ref()) {
                if previous.contains_key(target) {
                    continue;
                }
                previous.insert(target, current);
                if target != to {
                    queue.push_back(target);
                    continue;
                }

                let mut chain = vec![to.clone()];
                let mut cursor = current;
                while cursor != from {
                    chain.push(cursor.clone());
                    cursor = previous.get(cursor)?;
                }
                chain.push(from.clone());
                chain.reverse();
                return Some(chain);
            }
        }
        None
    }
}

fn node_index<'a>(
    graph: &mut DiGraph<&'a Url, ()>,
    nodes: &mut HashMap<&'a Url, NodeIndex>,
    uri: &'a Url,
) -> NodeIndex {
    *nodes.entry(uri).or_insert_with(|| graph.add_node(uri))
}

/// Result of [`ImportGraph::cycles`].
#[derive(Debug, Clone, Default)]
pub struct ImportCycles {
    components: Vec<HashSet<Url>>,
    membership: HashMap<Url, usize>,
}

impl ImportCycles {
    /// Whether an import from `from` to `to` closes a cycle.
    pub fn is_cyclic_edge(&self, from: &Url, to: &Url) -> bool {
        match (self.membership.get(from), self.membership.get(to)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.membership.contains_key(uri)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}")).unwrap()
    }

    fn link(target: &str, kind: ImportKind) -> ImportLink {
        ImportLink {
            path: target.to_string(),
            kind,
            target: Some(uri(target)),
        }
    }

    #[test]
    fn dependents_are_transitive() {
        let mut graph = ImportGraph::default();
        graph.set_links(&uri("a.proto"), vec![link("b.proto", ImportKind::Default)]);
        graph.set_links(&uri("b.proto"), vec![link("c.proto", ImportKind::Default)]);

        let dependents = graph.dependents(&uri("c.proto"));
        assert_eq!(dependents, HashSet::from([uri("a.proto"), uri("b.proto")]));
        assert!(graph.dependents(&uri("a.proto")).is_empty());
    }

    #[test]
    fn set_links_replaces_reverse_edges() {
        let mut graph = ImportGraph::default();
        graph.set_links(&uri("a.proto"), vec![link("b.proto", ImportKind::Default)]);
        graph.set_links(&uri("a.proto"), vec![link("c.proto", ImportKind::Default)]);

        assert!(!graph.is_imported(&uri("b.proto")));
        assert!(graph.is_imported(&uri("c.proto")));
    }

    #[test]
    fn visible_from_follows_public_imports_only() {
        let mut graph = ImportGraph::default();
        graph.set_links(&uri("a.proto"), vec![link("b.proto", ImportKind::Default)]);
        graph.set_links(
            &uri("b.proto"),
            vec![
                link("c.proto", ImportKind::Public),
                link("d.proto", ImportKind::Default),
            ],
        );
        graph.set_links(&uri("c.proto"), vec![link("e.proto", ImportKind::Public)]);

        let visible = graph.visible_from(&uri("a.proto"));
        assert_eq!(
            visible,
            HashSet::from([uri("a.proto"), uri("b.proto"), uri("c.proto"), uri("e.proto")])
        );
    }

    #[test]
    fn cycles_find_mutual_imports() {
        let mut graph = ImportGraph::default();
        graph.set_links(&uri("a.proto"), vec![link("b.proto", ImportKind::Default)]);
        graph.set_links(&uri("b.proto"), vec![link("a.proto", ImportKind::Default)]);
        graph.set_links(&uri("c.proto"), vec![link("a.proto", ImportKind::Default)]);

        let cycles = graph.cycles();
        assert!(cycles.is_cyclic_edge(&uri("a.proto"), &uri("b.proto")));
        assert!(cycles.is_cyclic_edge(&uri("b.proto"), &uri("a.proto")));
        assert!(!cycles.is_cyclic_edge(&uri("c.proto"), &uri("a.proto")));
        assert!(!cycles.contains(&uri("c.proto")));
    }

    #[test]
    fn cycles_detect_self_import() {
        let mut graph = ImportGraph::default();
        graph.set_links(&uri("a.proto"), vec![link("a.proto", ImportKind::Default)]);

        assert!(graph.cycles().is_cyclic_edge(&uri("a.proto"), &uri("a.proto")));
    }

    #[test]
    fn path_returns_shortest_chain() {
        let mut graph = ImportGraph::default();
        graph.set_links(&uri("a.proto"), vec![link("b.proto", ImportKind::Default)]);
        graph.set_links(&uri("b.proto"), vec![link("c.proto", ImportKind::Default)]);
        graph.set_links(&uri("c.proto"), vec![link("a.proto", ImportKind::Default)]);

        assert_eq!(
            graph.path(&uri("b.proto"), &uri("a.proto")),
            Some(vec![uri("b.proto"), uri("c.proto"), uri("a.proto")])
        );
        assert_eq!(
            graph.path(&uri("a.proto"), &uri("a.proto")),
            Some(vec![uri("a.proto"), uri("b.proto"), uri("c.proto"), uri("a.proto")])
        );
    }
}
