//! Rename and prepare rename
//!
//! A rename edits the declaration and every resolved occurrence in every indexed file.
//! Either all edits are produced or the request fails.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Position, PrepareRenameResponse, TextEdit, Url, WorkspaceEdit};
use tracing::debug;

use crate::analysis::SymbolLocation;
use crate::analysis::symbols::{parent_scope, qualify};
use crate::parser::ast::SCALAR_TYPES;
use crate::query::{Document, Hit, QueryError, Target, location, occurrences, target_at};
use crate::workspace::Snapshot;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

fn renameable(hit: &Hit) -> Result<SymbolLocation, QueryError> {
    match &hit.target {
        Target::Symbol(target) => Ok(target.clone()),
        other => Err(QueryError::NotRenameable(other.describe())),
    }
}

/// Range and current text of the name under the cursor, if it can be renamed.
pub fn prepare_rename(
    snapshot: &Snapshot,
    uri: &Url,
    position: Position,
) -> Result<Option<PrepareRenameResponse>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(None);
    };
    let Some(hit) = target_at(&doc, doc.offset(position)) else {
        return Ok(None);
    };
    renameable(&hit)?;

    let placeholder = doc.file.text.get(hit.span.clone()).unwrap_or_default().to_string();
    doc.ensure_current()?;
    Ok(Some(PrepareRenameResponse::RangeWithPlaceholder {
        range: doc.range(&hit.span),
        placeholder,
    }))
}

pub fn rename(
    snapshot: &Snapshot,
    uri: &Url,
    position: Position,
    new_name: &str,
) -> Result<Option<WorkspaceEdit>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(None);
    };
    let Some(hit) = target_at(&doc, doc.offset(position)) else {
        return Ok(None);
    };
    let target = renameable(&hit)?;

    if !IDENTIFIER.is_match(new_name) || SCALAR_TYPES.contains(&new_name) {
        return Err(QueryError::InvalidName(new_name.to_string()));
    }
    let scope = parent_scope(&target.fqn).unwrap_or_default();
    let renamed = qualify(scope, new_name);
    if renamed != target.fqn && !snapshot.graph().lookup(&renamed).is_empty() {
        return Err(QueryError::NameCollision {
            name: new_name.to_string(),
            scope: if scope.is_empty() {
                "the root scope".to_string()
            } else {
                format!("`{scope}`")
            },
        });
    }

    let mut spans = vec![(target.uri.clone(), target.name_span.clone())];
    spans.extend(occurrences(snapshot, &target));

    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    for (file, span) in &spans {
        let Some(location) = location(snapshot, file, span) else {
            return Err(QueryError::Superseded);
        };
        changes
            .entry(location.uri)
            .or_default()
            .push(TextEdit::new(location.range, new_name.to_string()));
    }
    debug!(
        fqn = %target.fqn,
        new_name,
        edits = spans.len(),
        files = changes.len(),
        "prepared rename"
    );

    doc.ensure_current()?;
    Ok(Some(WorkspaceEdit::new(changes)))
}
