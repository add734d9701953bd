//! Hierarchical outline of a file

use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind as LspSymbolKind, Url};

use crate::parser::ast::{NodeKind, SyntaxNode};
use crate::query::{Document, QueryError};
use crate::workspace::Snapshot;

pub fn document_symbols(
    snapshot: &Snapshot,
    uri: &Url,
) -> Result<Vec<DocumentSymbol>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(Vec::new());
    };
    let symbols = outline(&doc, &doc.file.tree.children);
    doc.ensure_current()?;
    Ok(symbols)
}

fn outline(doc: &Document<'_>, nodes: &[SyntaxNode]) -> Vec<DocumentSymbol> {
    nodes.iter().filter_map(|node| symbol(doc, node)).collect()
}

#[allow(deprecated)]
fn symbol(doc: &Document<'_>, node: &SyntaxNode) -> Option<DocumentSymbol> {
    let (name, selection, kind, detail) = match &node.kind {
        NodeKind::Package { name } => {
            (name.text.clone(), name.span.clone(), LspSymbolKind::PACKAGE, None)
        }
        NodeKind::Message { name } => {
            (name.text.clone(), name.span.clone(), LspSymbolKind::STRUCT, None)
        }
        NodeKind::Enum { name } => {
            (name.text.clone(), name.span.clone(), LspSymbolKind::ENUM, None)
        }
        NodeKind::EnumValue { name, number } => (
            name.text.clone(),
            name.span.clone(),
            LspSymbolKind::ENUM_MEMBER,
            number.map(|n| n.to_string()),
        ),
        NodeKind::Field { ty, name, .. } => (
            name.text.clone(),
            name.span.clone(),
            LspSymbolKind::FIELD,
            Some(ty.text.clone()),
        ),
        NodeKind::MapField {
            key, value, name, ..
        } => (
            name.text.clone(),
            name.span.clone(),
            LspSymbolKind::FIELD,
            Some(format!("map<{}, {}>", key.text, value.text)),
        ),
        NodeKind::Oneof { name } => (
            name.text.clone(),
            name.span.clone(),
            LspSymbolKind::STRUCT,
            Some("oneof".to_string()),
        ),
        NodeKind::Extend { extendee } => (
            format!("extend {}", extendee.text),
            extendee.span.clone(),
            LspSymbolKind::NAMESPACE,
            None,
        ),
        NodeKind::Service { name } => (
            name.text.clone(),
            name.span.clone(),
            LspSymbolKind::INTERFACE,
            None,
        ),
        NodeKind::Method {
            name,
            input,
            output,
            client_streaming,
            server_streaming,
        } => {
            let stream = |streaming: bool| if streaming { "stream " } else { "" };
            (
                name.text.clone(),
                name.span.clone(),
                LspSymbolKind::METHOD,
                Some(format!(
                    "({}{}) returns ({}{})",
                    stream(*client_streaming),
                    input.text,
                    stream(*server_streaming),
                    output.text
                )),
            )
        }
        _ => return None,
    };
    if name.is_empty() {
        return None;
    }

    let children = outline(doc, &node.children);
    Some(DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range: doc.range(&node.span),
        selection_range: doc.range(&selection),
        children: (!children.is_empty()).then_some(children),
    })
}
