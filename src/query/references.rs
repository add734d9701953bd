//! Find references

use tower_lsp::lsp_types::{Location, Position, Url};

use crate::query::{Document, QueryError, Target, location, occurrences, target_at};
use crate::workspace::Snapshot;

/// Every place in the workspace that names the declaration at `position`.
pub fn references(
    snapshot: &Snapshot,
    uri: &Url,
    position: Position,
    include_declaration: bool,
) -> Result<Vec<Location>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(Vec::new());
    };
    let Some(Target::Symbol(target)) = target_at(&doc, doc.offset(position)).map(|hit| hit.target)
    else {
        return Ok(Vec::new());
    };

    let mut spans = Vec::new();
    if include_declaration {
        spans.push((target.uri.clone(), target.name_span.clone()));
    }
    spans.extend(occurrences(snapshot, &target));

    let locations = spans
        .iter()
        .filter_map(|(uri, span)| location(snapshot, uri, span))
        .collect();

    doc.ensure_current()?;
    Ok(locations)
}
