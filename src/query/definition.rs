//! Go to definition

use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::query::{Document, QueryError, Target, location, target_at};
use crate::workspace::Snapshot;

/// Where the name at `position` is declared. An import path leads to the start of the
/// imported file; an ambiguous name yields every candidate.
pub fn definition(
    snapshot: &Snapshot,
    uri: &Url,
    position: Position,
) -> Result<Vec<Location>, QueryError> {
    let Some(doc) = Document::get(snapshot, uri) else {
        return Ok(Vec::new());
    };
    let Some(hit) = target_at(&doc, doc.offset(position)) else {
        return Ok(Vec::new());
    };

    let locations = match hit.target {
        Target::Symbol(target) => location(snapshot, &target.uri, &target.name_span)
            .into_iter()
            .collect(),
        Target::Ambiguous(candidates) => candidates
            .iter()
            .filter_map(|c| location(snapshot, &c.uri, &c.name_span))
            .collect(),
        Target::Import {
            target: Some(target),
            ..
        } => vec![Location::new(target, Range::default())],
        Target::Import { target: None, .. }
        | Target::Scalar(_)
        | Target::Package(_)
        | Target::Unresolved(_) => Vec::new(),
    };

    doc.ensure_current()?;
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_support::{position_of, snapshot, uri};

    const FOO: &str = "message Foo { string name = 1; }\n";
    const BAR: &str = "import \"a.proto\";\nmessage Bar { Foo f = 1; }\n";

    #[test]
    fn definition_of_imported_type_points_at_declaration() {
        let snapshot = snapshot(&[("a.proto", FOO), ("b.proto", BAR)]);

        let result = definition(&snapshot, &uri("b.proto"), position_of(BAR, "Foo f", 1)).unwrap();

        assert_eq!(
            result,
            vec![Location::new(
                uri("a.proto"),
                Range::new(Position::new(0, 8), Position::new(0, 11))
            )]
        );
    }

    #[test]
    fn definition_of_import_path_opens_file() {
        let snapshot = snapshot(&[("a.proto", FOO), ("b.proto", BAR)]);

        let position = position_of(BAR, "a.proto", 2);
        let result = definition(&snapshot, &uri("b.proto"), position).unwrap();

        assert_eq!(result, vec![Location::new(uri("a.proto"), Range::default())]);
    }

    #[test]
    fn definition_of_nested_segment_targets_that_segment() {
        let text = "message Outer {\n  message Inner {}\n}\nmessage M { Outer.Inner x = 1; }\n";
        let snapshot = snapshot(&[("a.proto", text)]);

        let position = position_of(text, "Outer.", 0);
        let result = definition(&snapshot, &uri("a.proto"), position).unwrap();

        assert_eq!(
            result,
            vec![Location::new(
                uri("a.proto"),
                Range::new(Position::new(0, 8), Position::new(0, 13))
            )]
        );
    }

    #[test]
    fn definition_of_ambiguous_name_lists_all_candidates() {
        let c = "import \"a.proto\";\nimport \"b.proto\";\nmessage M { Foo f = 1; }\n";
        let snapshot = snapshot(&[("a.proto", FOO), ("b.proto", FOO), ("c.proto", c)]);

        let result = definition(&snapshot, &uri("c.proto"), position_of(c, "Foo", 0)).unwrap();

        let files: Vec<Url> = result.into_iter().map(|l| l.uri).collect();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&uri("a.proto")));
        assert!(files.contains(&uri("b.proto")));
    }

    #[test]
    fn definition_of_scalar_or_unknown_document_is_empty() {
        let snapshot = snapshot(&[("a.proto", FOO)]);

        assert!(
            definition(&snapshot, &uri("a.proto"), position_of(FOO, "string", 1))
                .unwrap()
                .is_empty()
        );
        assert!(
            definition(&snapshot, &uri("nope.proto"), Position::new(0, 0))
                .unwrap()
                .is_empty()
        );
    }
}
