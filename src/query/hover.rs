//! Hover: the declaration under the cursor as a proto code block

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::analysis::SymbolLocation;
use crate::query::{Document, QueryError, Target, target_at};
use crate::workspace::Snapshot;
use crate::workspace::source::display_name;

pub fn hover(
    snapshot: &Snapshot,
    uri: &Url,
    position: Position,
) -> Result<Option<Hover>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(None);
    };
    let Some(hit) = target_at(&doc, doc.offset(position)) else {
        return Ok(None);
    };

    let markdown = match &hit.target {
        Target::Symbol(target) => declaration_markdown(snapshot, target),
        Target::Ambiguous(candidates) => {
            let files: Vec<String> = candidates
                .iter()
                .map(|c| format!("`{}`", display_name(&c.uri)))
                .collect();
            Some(format!("`{}` is declared in {}", hit_name(candidates), files.join(", ")))
        }
        Target::Import {
            target: Some(target),
            ..
        } => Some(format!("`{}`", target)),
        Target::Scalar(name) => Some(format!("```proto\n{name}\n```\nbuilt-in scalar type")),
        Target::Package(name) => Some(format!("```proto\npackage {name};\n```")),
        Target::Import { target: None, .. } | Target::Unresolved(_) => None,
    };

    doc.ensure_current()?;
    Ok(markdown.map(|value| Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(doc.range(&hit.span)),
    }))
}

fn hit_name(candidates: &[SymbolLocation]) -> &str {
    candidates.first().map_or("", |c| c.fqn.as_str())
}

/// Leading comments and source text of a declaration, fenced as proto.
pub(crate) fn declaration_markdown(snapshot: &Snapshot, target: &SymbolLocation) -> Option<String> {
    let file = snapshot.file(&target.uri)?;
    let source = file.text.get(target.span.clone())?;
    let comments = file
        .tree
        .descendants()
        .find(|node| node.span == target.span && node.name().is_some())
        .map(|node| node.comments.clone())
        .unwrap_or_default();

    let mut markdown = String::from("```proto\n");
    for comment in comments {
        markdown.push_str(&comment);
        markdown.push('\n');
    }
    markdown.push_str(source);
    markdown.push_str("\n```");
    Some(markdown)
}
