//! Completion of type names
//!
//! Candidates come in groups: declarations of the current file from the innermost
//! enclosing scope outward, then declarations of imported files in the same order,
//! then package names, built-in scalars and keywords. Within a group labels sort
//! lexically. After a qualifier such as `pkg.` or `Outer.` only its members are offered.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind, Position, Url,
};

use crate::analysis::graph::ChildName;
use crate::analysis::symbols::{parent_scope, qualify};
use crate::analysis::{SymbolKind, SymbolLocation};
use crate::parser::ast::SCALAR_TYPES;
use crate::query::hover::declaration_markdown;
use crate::query::{Document, QueryError};
use crate::workspace::Snapshot;

pub const KEYWORDS: [&str; 16] = [
    "message", "enum", "service", "rpc", "optional", "repeated", "required", "option",
    "default", "syntax", "package", "import", "extend", "oneof", "map", "reserved",
];

/// Text typed before the cursor, split at the last dot.
#[derive(Debug, PartialEq, Eq)]
struct Typed<'a> {
    qualifier: Option<&'a str>,
    absolute: bool,
    prefix: &'a str,
}

fn typed_before(text: &str, offset: usize) -> Typed<'_> {
    let before = text.get(..offset).unwrap_or_default();
    let start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .last()
        .map_or(before.len(), |(i, _)| i);
    let word = &before[start..];
    let absolute = word.starts_with('.');
    match word.rfind('.') {
        Some(dot) => {
            let qualifier = word[..dot].trim_start_matches('.');
            Typed {
                qualifier: Some(qualifier),
                absolute,
                prefix: &word[dot + 1..],
            }
        }
        None => Typed {
            qualifier: None,
            absolute,
            prefix: word,
        },
    }
}

struct Candidate {
    group: usize,
    kind: CompletionItemKind,
    location: Option<SymbolLocation>,
}

#[derive(Default)]
struct Candidates {
    by_label: HashMap<String, Candidate>,
}

impl Candidates {
    fn offer(&mut self, label: &str, candidate: Candidate) {
        match self.by_label.get(label) {
            Some(existing) if existing.group <= candidate.group => {}
            _ => {
                self.by_label.insert(label.to_string(), candidate);
            }
        }
    }

    fn into_items(self, snapshot: &Snapshot, prefix: &str) -> Vec<CompletionItem> {
        let mut candidates: Vec<(String, Candidate)> = self
            .by_label
            .into_iter()
            .filter(|(label, _)| label.starts_with(prefix))
            .collect();
        candidates.sort_by(|a, b| a.1.group.cmp(&b.1.group).then_with(|| a.0.cmp(&b.0)));

        candidates
            .into_iter()
            .map(|(label, candidate)| {
                let documentation = candidate
                    .location
                    .as_ref()
                    .and_then(|loc| declaration_markdown(snapshot, loc))
                    .map(|value| {
                        Documentation::MarkupContent(MarkupContent {
                            kind: MarkupKind::Markdown,
                            value,
                        })
                    });
                CompletionItem {
                    sort_text: Some(format!("{:03}{label}", candidate.group)),
                    detail: candidate.location.map(|loc| loc.fqn),
                    label,
                    kind: Some(candidate.kind),
                    documentation,
                    ..Default::default()
                }
            })
            .collect()
    }
}

fn item_kind(kind: SymbolKind) -> CompletionItemKind {
    match kind {
        SymbolKind::Enum => CompletionItemKind::ENUM,
        _ => CompletionItemKind::CLASS,
    }
}

pub fn completion(
    snapshot: &Snapshot,
    uri: &Url,
    position: Position,
) -> Result<Vec<CompletionItem>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(Vec::new());
    };
    let offset = doc.offset(position);
    let typed = typed_before(&doc.file.text, offset);
    let scope = doc.file.table.scope_at(&doc.file.tree, offset);

    let mut scopes = vec![scope.as_str()];
    while let Some(parent) = scopes.last().copied().and_then(parent_scope) {
        scopes.push(parent);
    }

    let mut candidates = Candidates::default();
    match typed.qualifier {
        Some(qualifier) => {
            let base = if typed.absolute {
                Some(qualifier.to_string())
            } else {
                scopes
                    .iter()
                    .map(|s| qualify(s, qualifier))
                    .find(|full| is_visible_scope(&doc, full))
            };
            if let Some(base) = base {
                offer_children(&doc, &mut candidates, &base, 0, 1);
            }
        }
        None => {
            let depth = scopes.len();
            for (distance, scope) in scopes.iter().enumerate() {
                offer_children(&doc, &mut candidates, scope, distance, depth + distance);
            }
            let modules = 2 * depth;
            offer_namespaces(&doc, &mut candidates, "", modules);
            for scalar in SCALAR_TYPES {
                candidates.offer(scalar, keyword(modules + 1));
            }
            for keyword_name in KEYWORDS {
                candidates.offer(keyword_name, keyword(modules + 2));
            }
        }
    }

    let items = candidates.into_items(snapshot, typed.prefix);
    doc.ensure_current()?;
    Ok(items)
}

fn keyword(group: usize) -> Candidate {
    Candidate {
        group,
        kind: CompletionItemKind::KEYWORD,
        location: None,
    }
}

/// A message or a package the document can see, whose members can follow a dot.
fn is_visible_scope(doc: &Document<'_>, fqn: &str) -> bool {
    doc.visible_location(fqn)
        .is_some_and(|loc| loc.kind == SymbolKind::Message)
        || doc
            .snapshot
            .graph()
            .namespace_files(fqn)
            .is_some_and(|files| files.iter().any(|f| doc.analysis.visible.contains(f)))
}

/// Offer the types declared directly in `scope`. Declarations from the document itself
/// go in `own_group`, the rest in `imported_group`. Nested packages go after both.
fn offer_children(
    doc: &Document<'_>,
    candidates: &mut Candidates,
    scope: &str,
    own_group: usize,
    imported_group: usize,
) {
    for child in doc.snapshot.graph().children(scope) {
        let ChildName::Symbol(name, locations) = child else {
            continue;
        };
        let visible = locations
            .iter()
            .filter(|loc| loc.kind.is_type() && doc.analysis.visible.contains(&loc.uri));
        for location in visible {
            let group = if location.uri == doc.file.uri {
                own_group
            } else {
                imported_group
            };
            candidates.offer(
                name,
                Candidate {
                    group,
                    kind: item_kind(location.kind),
                    location: Some(location.clone()),
                },
            );
        }
    }
    if !scope.is_empty() {
        offer_namespaces(doc, candidates, scope, imported_group + 1);
    }
}

/// Offer packages nested directly in `scope` that some visible file declares.
fn offer_namespaces(doc: &Document<'_>, candidates: &mut Candidates, scope: &str, group: usize) {
    for child in doc.snapshot.graph().children(scope) {
        let ChildName::Namespace(name) = child else {
            continue;
        };
        let full = qualify(scope, name);
        let visible = doc
            .snapshot
            .graph()
            .namespace_files(&full)
            .is_some_and(|files| files.iter().any(|f| doc.analysis.visible.contains(f)));
        if visible {
            candidates.offer(
                name,
                Candidate {
                    group,
                    kind: CompletionItemKind::MODULE,
                    location: None,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_support::{snapshot, uri};
    use rstest::rstest;

    #[rstest]
    #[case::plain("  Fo", None, false, "Fo")]
    #[case::empty("  ", None, false, "")]
    #[case::qualified("  pkg.sub.Fo", Some("pkg.sub"), false, "Fo")]
    #[case::after_dot("  pkg.", Some("pkg"), false, "")]
    #[case::absolute(" .pkg.F", Some("pkg"), true, "F")]
    fn typed_before_splits_qualifier(
        #[case] text: &str,
        #[case] qualifier: Option<&str>,
        #[case] absolute: bool,
        #[case] prefix: &str,
    ) {
        assert_eq!(
            typed_before(text, text.len()),
            Typed {
                qualifier,
                absolute,
                prefix
            }
        );
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[test]
    fn completion_orders_inner_scope_then_outer_then_imports_then_builtins() {
        let a = "package p;\nmessage Imported {}\n";
        let b = "package p;\nimport \"a.proto\";\nmessage Outer {\n  message Inner {}\n  \n}\nenum Top { T = 0; }\n";
        let snapshot = snapshot(&[("a.proto", a), ("b.proto", b)]);

        let items = completion(&snapshot, &uri("b.proto"), Position::new(4, 2)).unwrap();
        let labels = labels(&items);

        assert_eq!(&labels[..4], &["Inner", "Outer", "Top", "Imported"]);
        assert!(labels.contains(&"int32"));
        assert!(labels.contains(&"message"));
        let rank = |label: &str| labels.iter().position(|l| *l == label);
        assert!(rank("p") < rank("int32"));
        assert!(rank("int32") < rank("message"));

        let top = items.iter().find(|i| i.label == "Top").unwrap();
        assert_eq!(top.kind, Some(CompletionItemKind::ENUM));
        assert_eq!(top.detail.as_deref(), Some("p.Top"));
        let imported = items.iter().find(|i| i.label == "Imported").unwrap();
        assert_eq!(imported.kind, Some(CompletionItemKind::CLASS));
        assert!(imported.documentation.is_some());
    }

    #[test]
    fn completion_after_package_qualifier_lists_members_only() {
        let a = "package dep.v1;\nmessage Foo {}\nenum Kind { K = 0; }\n";
        let b = "import \"a.proto\";\nmessage M {\n  dep.\n}\n";
        let outer = snapshot(&[("a.proto", a), ("b.proto", b)]);

        let items = completion(&outer, &uri("b.proto"), Position::new(2, 6)).unwrap();
        assert_eq!(labels(&items), vec!["v1"]);
        assert_eq!(items[0].kind, Some(CompletionItemKind::MODULE));

        let b = "import \"a.proto\";\nmessage M {\n  dep.v1.\n}\n";
        let inner = snapshot(&[("a.proto", a), ("b.proto", b)]);
        let items = completion(&inner, &uri("b.proto"), Position::new(2, 9)).unwrap();
        assert_eq!(labels(&items), vec!["Foo", "Kind"]);
    }

    #[test]
    fn completion_filters_by_prefix_and_skips_invisible_files() {
        let a = "message Found {}\n";
        let hidden = "message Fog {}\n";
        let b = "import \"a.proto\";\nmessage M { Fo }\n";
        let snapshot = snapshot(&[("a.proto", a), ("hidden.proto", hidden), ("b.proto", b)]);

        let items = completion(&snapshot, &uri("b.proto"), Position::new(1, 14)).unwrap();

        assert_eq!(labels(&items), vec!["Found"]);
    }

    #[test]
    fn completion_offers_imported_package_names() {
        let a = "package google.protobuf;\nmessage Timestamp {}\n";
        let b = "import \"a.proto\";\nmessage M {\n  \n}\n";
        let snapshot = snapshot(&[("a.proto", a), ("b.proto", b)]);

        let items = completion(&snapshot, &uri("b.proto"), Position::new(2, 2)).unwrap();

        let google = items.iter().find(|i| i.label == "google").unwrap();
        assert_eq!(google.kind, Some(CompletionItemKind::MODULE));
        assert!(!labels(&items).contains(&"Timestamp"));
    }
}
