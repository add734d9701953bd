//! Conversion from analysis results to LSP types

use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{
    Diagnostic as LspDiagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location,
    NumberOrString, TextEdit,
};

use crate::diagnostics::{Diagnostic, Severity};
use crate::format::FormatError;
use crate::query::QueryError;
use crate::workspace::{Snapshot, SourceFile};

pub const SOURCE: &str = "protobuf";

/// Error code a client uses to retry a request after the document changed.
const CONTENT_MODIFIED: i64 = -32801;

pub fn diagnostic(
    snapshot: &Snapshot,
    file: &SourceFile,
    diagnostic: &Diagnostic,
) -> LspDiagnostic {
    let related = diagnostic.related.as_ref().and_then(|related| {
        let target = snapshot.file(&related.uri)?;
        Some(vec![DiagnosticRelatedInformation {
            location: Location::new(
                related.uri.clone(),
                target.lines.range(&target.text, &related.span),
            ),
            message: related.message.clone(),
        }])
    });

    LspDiagnostic {
        range: file.lines.range(&file.text, &diagnostic.span),
        severity: Some(match diagnostic.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }),
        code: Some(NumberOrString::String(diagnostic.code.as_str().to_string())),
        source: Some(SOURCE.to_string()),
        message: diagnostic.message.clone(),
        related_information: related,
        ..Default::default()
    }
}

/// Diagnostics of an analysed file in LSP form, empty when it has no analysis.
pub fn diagnostics(snapshot: &Snapshot, file: &SourceFile) -> Vec<LspDiagnostic> {
    snapshot
        .analysis(&file.uri)
        .map(|analysis| {
            analysis
                .diagnostics
                .iter()
                .map(|d| diagnostic(snapshot, file, d))
                .collect()
        })
        .unwrap_or_default()
}

pub fn query_error(err: QueryError) -> jsonrpc::Error {
    match err {
        QueryError::Superseded => jsonrpc::Error {
            code: jsonrpc::ErrorCode::from(CONTENT_MODIFIED),
            message: err.to_string().into(),
            data: None,
        },
        QueryError::InvalidName(_)
        | QueryError::NameCollision { .. }
        | QueryError::NotRenameable(_) => jsonrpc::Error::invalid_params(err.to_string()),
    }
}

pub fn format_error(err: FormatError) -> jsonrpc::Error {
    jsonrpc::Error {
        code: jsonrpc::ErrorCode::InternalError,
        message: err.to_string().into(),
        data: None,
    }
}

/// Edits replacing the whole of `file` with `formatted`; none when nothing changed.
pub fn replace_all(file: &SourceFile, formatted: String) -> Vec<TextEdit> {
    if formatted == file.text {
        return Vec::new();
    }
    let range = file.lines.range(&file.text, &(0..file.text.len()));
    vec![TextEdit::new(range, formatted)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use tower_lsp::lsp_types::{Position, Range, Url};

    #[test]
    fn diagnostic_maps_code_severity_and_range() {
        let uri = Url::parse("file:///ws/a.proto").unwrap();
        let file = SourceFile::new(
            uri.clone(),
            "message A {}\nmessage A {}\n".into(),
            Some(1),
            true,
        );
        let snapshot = Snapshot::default();
        let diag = Diagnostic::new(DiagnosticCode::UnresolvedOption, 21..22, "unknown option");

        let converted = diagnostic(&snapshot, &file, &diag);

        assert_eq!(
            converted.range,
            Range::new(Position::new(1, 8), Position::new(1, 9))
        );
        assert_eq!(converted.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(
            converted.code,
            Some(NumberOrString::String("unresolved-option".to_string()))
        );
        assert_eq!(converted.source.as_deref(), Some("protobuf"));
        // the related file is not in the snapshot
        let with_related = diag.with_related(uri, 8..9, "first declared here");
        assert_eq!(diagnostic(&snapshot, &file, &with_related).related_information, None);
    }

    #[test]
    fn replace_all_spans_the_whole_document() {
        let uri = Url::parse("file:///ws/a.proto").unwrap();
        let file = SourceFile::new(uri, "message A{}\nenum E{}".into(), Some(1), true);

        assert!(replace_all(&file, file.text.clone()).is_empty());

        let edits = replace_all(&file, "message A {}\n".into());
        assert_eq!(
            edits,
            vec![TextEdit::new(
                Range::new(Position::new(0, 0), Position::new(1, 8)),
                "message A {}\n".to_string()
            )]
        );
    }

    #[test]
    fn query_errors_map_to_rpc_codes() {
        assert_eq!(query_error(QueryError::Superseded).code.code(), -32801);
        assert_eq!(
            query_error(QueryError::InvalidName("1x".into())).code,
            jsonrpc::ErrorCode::InvalidParams
        );
    }
}
