//! Diagnostics engine
//!
//! A pure function from one analysed file (plus the workspace state it was resolved
//! against) to its diagnostics, ordered by position.

use std::collections::{HashMap, HashSet};

use tower_lsp::lsp_types::Url;

use crate::analysis::resolver::{Resolution, ResolvedReference};
use crate::analysis::symbols::{ReferenceContext, Syntax};
use crate::analysis::{ImportCycles, ImportGraph, SymbolGraph};
use crate::parser::ast::{
    FieldRange, MAX_FIELD_NUMBER, NodeKind, RESERVED_IMPLEMENTATION_RANGE, Span, SyntaxNode,
};
use crate::workspace::SourceFile;
use crate::workspace::source::display_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    SyntaxError,
    UnresolvedImport,
    ImportCycle,
    UnresolvedType,
    AmbiguousType,
    NotAType,
    InvalidRpcType,
    DuplicateSymbol,
    DuplicateFieldNumber,
    InvalidFieldNumber,
    ReservedFieldNumber,
    ReservedFieldName,
    DuplicateEnumValue,
    EnumFirstValueNotZero,
    UnresolvedOption,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::SyntaxError => "syntax-error",
            DiagnosticCode::UnresolvedImport => "unresolved-import",
            DiagnosticCode::ImportCycle => "import-cycle",
            DiagnosticCode::UnresolvedType => "unresolved-type",
            DiagnosticCode::AmbiguousType => "ambiguous-type",
            DiagnosticCode::NotAType => "not-a-type",
            DiagnosticCode::InvalidRpcType => "invalid-rpc-type",
            DiagnosticCode::DuplicateSymbol => "duplicate-symbol",
            DiagnosticCode::DuplicateFieldNumber => "duplicate-field-number",
            DiagnosticCode::InvalidFieldNumber => "invalid-field-number",
            DiagnosticCode::ReservedFieldNumber => "reserved-field-number",
            DiagnosticCode::ReservedFieldName => "reserved-field-name",
            DiagnosticCode::DuplicateEnumValue => "duplicate-enum-value",
            DiagnosticCode::EnumFirstValueNotZero => "enum-first-value-not-zero",
            DiagnosticCode::UnresolvedOption => "unresolved-option",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticCode::UnresolvedOption => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A location elsewhere that explains a diagnostic, e.g. the first definition of a
/// duplicated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Related {
    pub uri: Url,
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    pub related: Option<Related>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: code.severity(),
            code,
            message: message.into(),
            span,
            related: None,
        }
    }

    pub fn with_related(mut self, uri: Url, span: Span, message: impl Into<String>) -> Self {
        self.related = Some(Related {
            uri,
            span,
            message: message.into(),
        });
        self
    }
}

/// What [`compute`] looks at.
pub struct Inputs<'a> {
    pub file: &'a SourceFile,
    pub references: &'a [ResolvedReference],
    pub visible: &'a HashSet<Url>,
    pub graph: &'a SymbolGraph,
    pub imports: &'a ImportGraph,
    pub cycles: &'a ImportCycles,
}

pub fn compute(inputs: &Inputs<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    syntax(inputs.file, &mut diagnostics);
    imports(inputs, &mut diagnostics);
    references(inputs.references, &mut diagnostics);
    duplicates(inputs, &mut diagnostics);
    let proto3 = inputs.file.table.syntax == Syntax::Proto3;
    for node in inputs.file.tree.descendants() {
        match &node.kind {
            NodeKind::Message { .. } => message_fields(node, &mut diagnostics),
            NodeKind::Extend { .. } => {
                for field in &node.children {
                    if let Some(number) = field.number() {
                        check_field_number(field, number, &mut diagnostics);
                    }
                }
            }
            NodeKind::Enum { .. } => enum_values(node, proto3, &mut diagnostics),
            _ => {}
        }
    }

    diagnostics.sort_by_key(|d| (d.span.start, d.span.end));
    diagnostics
}

fn syntax(file: &SourceFile, out: &mut Vec<Diagnostic>) {
    for error in &file.syntax_errors {
        out.push(Diagnostic::new(
            DiagnosticCode::SyntaxError,
            error.span.clone(),
            &error.message,
        ));
    }
    for span in &file.table.extra_packages {
        out.push(Diagnostic::new(
            DiagnosticCode::SyntaxError,
            span.clone(),
            "multiple package declarations",
        ));
    }
}

fn imports(inputs: &Inputs<'_>, out: &mut Vec<Diagnostic>) {
    let uri = &inputs.file.uri;
    let links = inputs.imports.links(uri);
    for (decl, link) in inputs.file.table.imports.iter().zip(links) {
        let Some(target) = &link.target else {
            out.push(Diagnostic::new(
                DiagnosticCode::UnresolvedImport,
                decl.path_span.clone(),
                format!("import \"{}\" was not found", decl.path),
            ));
            continue;
        };
        if !inputs.cycles.is_cyclic_edge(uri, target) {
            continue;
        }
        let message = if target == uri {
            format!("{} imports itself", display_name(uri))
        } else {
            let path = inputs.imports.path(target, uri);
            let chain: Vec<&str> = std::iter::once(uri)
                .chain(path.iter().flatten())
                .map(display_name)
                .collect();
            format!("import cycle: {}", chain.join(" -> "))
        };
        out.push(Diagnostic::new(
            DiagnosticCode::ImportCycle,
            decl.path_span.clone(),
            message,
        ));
    }
}

fn references(references: &[ResolvedReference], out: &mut Vec<Diagnostic>) {
    for resolved in references {
        let reference = &resolved.reference;
        let name = &reference.name.text;
        let span = reference.name.span.clone();
        let context = reference.context;

        let diagnostic = match &resolved.resolution {
            Resolution::Resolved(_) => None,
            Resolution::Scalar => match context {
                ReferenceContext::MethodInput | ReferenceContext::MethodOutput => {
                    Some(Diagnostic::new(
                        DiagnosticCode::InvalidRpcType,
                        span,
                        format!("rpc types must be messages, `{name}` is a scalar type"),
                    ))
                }
                ReferenceContext::Extendee => Some(Diagnostic::new(
                    DiagnosticCode::NotAType,
                    span,
                    format!("`{name}` is a scalar type and cannot be extended"),
                )),
                _ => None,
            },
            Resolution::Unresolved { .. } if context == ReferenceContext::OptionName => {
                Some(Diagnostic::new(
                    DiagnosticCode::UnresolvedOption,
                    span,
                    format!("unknown option extension `{name}`"),
                ))
            }
            Resolution::Unresolved { hint, .. } => {
                let mut message = format!("unresolved type `{name}`");
                if let Some(hint) = hint {
                    message.push_str(&format!(
                        " (defined in {}, which is not imported)",
                        display_name(hint)
                    ));
                }
                Some(Diagnostic::new(DiagnosticCode::UnresolvedType, span, message))
            }
            Resolution::Ambiguous(locations) => {
                let files: Vec<&str> = locations.iter().map(|l| display_name(&l.uri)).collect();
                let first = &locations[0];
                Some(
                    Diagnostic::new(
                        DiagnosticCode::AmbiguousType,
                        span,
                        format!("`{name}` is ambiguous: defined in {}", files.join(", ")),
                    )
                    .with_related(
                        first.uri.clone(),
                        first.name_span.clone(),
                        "one of the definitions",
                    ),
                )
            }
            Resolution::NotAType(location) => {
                let found = location.kind.describe();
                let (code, message) = match context {
                    ReferenceContext::MethodInput | ReferenceContext::MethodOutput => (
                        DiagnosticCode::InvalidRpcType,
                        format!("rpc types must be messages, `{name}` is {}", article(found)),
                    ),
                    ReferenceContext::Extendee => (
                        DiagnosticCode::NotAType,
                        format!("only messages can be extended, `{name}` is {}", article(found)),
                    ),
                    ReferenceContext::OptionName => (
                        DiagnosticCode::UnresolvedOption,
                        format!("`{name}` is {}, not an extension", article(found)),
                    ),
                    ReferenceContext::FieldType | ReferenceContext::MapValue => (
                        DiagnosticCode::NotAType,
                        format!("`{name}` is {}, not a type", article(found)),
                    ),
                };
                Some(
                    Diagnostic::new(code, span, message).with_related(
                        location.uri.clone(),
                        location.name_span.clone(),
                        "declared here",
                    ),
                )
            }
        };
        out.extend(diagnostic);
    }
}

fn article(noun: &str) -> String {
    let vowel = noun.starts_with(['a', 'e', 'i', 'o', 'u']);
    format!("{} {noun}", if vowel { "an" } else { "a" })
}

fn duplicates(inputs: &Inputs<'_>, out: &mut Vec<Diagnostic>) {
    let file = inputs.file;
    for duplicate in &file.table.duplicates {
        out.push(
            Diagnostic::new(
                DiagnosticCode::DuplicateSymbol,
                duplicate.symbol.name_span.clone(),
                format!("`{}` is already defined in this scope", duplicate.symbol.name),
            )
            .with_related(file.uri.clone(), duplicate.first.clone(), "first defined here"),
        );
    }

    // Only top-level names are compared across files; members of a duplicated message
    // would otherwise repeat the same report.
    let package = file.table.package.as_deref().unwrap_or_default();
    for symbol in file.table.symbols.values().filter(|s| s.scope == package) {
        let other = inputs
            .graph
            .lookup(&symbol.fqn)
            .iter()
            .find(|loc| loc.uri != file.uri && inputs.visible.contains(&loc.uri));
        if let Some(other) = other {
            out.push(
                Diagnostic::new(
                    DiagnosticCode::DuplicateSymbol,
                    symbol.name_span.clone(),
                    format!(
                        "`{}` is already defined in {}",
                        symbol.fqn,
                        display_name(&other.uri)
                    ),
                )
                .with_related(other.uri.clone(), other.name_span.clone(), "other definition"),
            );
        }
    }
}

/// Reserved numbers and names declared directly in a message or enum body.
fn reservations(node: &SyntaxNode) -> (Vec<&FieldRange>, HashSet<&str>) {
    let mut ranges = Vec::new();
    let mut names = HashSet::new();
    for child in &node.children {
        if let NodeKind::Reserved {
            ranges: reserved_ranges,
            names: reserved_names,
        } = &child.kind
        {
            ranges.extend(reserved_ranges);
            names.extend(reserved_names.iter().map(|n| n.text.as_str()));
        }
    }
    (ranges, names)
}

fn message_fields(message: &SyntaxNode, out: &mut Vec<Diagnostic>) {
    let (reserved_ranges, reserved_names) = reservations(message);
    let fields = message.children.iter().flat_map(|child| match child.kind {
        NodeKind::Oneof { .. } => child.children.iter().collect::<Vec<_>>(),
        _ => vec![child],
    });

    let mut seen: HashMap<i64, &str> = HashMap::new();
    for field in fields {
        if !matches!(field.kind, NodeKind::Field { .. } | NodeKind::MapField { .. }) {
            continue;
        }
        let Some(name) = field.name() else {
            continue;
        };

        if reserved_names.contains(name.text.as_str()) {
            out.push(Diagnostic::new(
                DiagnosticCode::ReservedFieldName,
                name.span.clone(),
                format!("field name `{}` is reserved", name.text),
            ));
        }

        let Some(number) = field.number() else {
            continue;
        };
        let span = number_span(field);
        if !check_field_number(field, number, out) {
            continue;
        }
        if reserved_ranges.iter().any(|range| range.contains(number)) {
            out.push(Diagnostic::new(
                DiagnosticCode::ReservedFieldNumber,
                span.clone(),
                format!("field number {number} is reserved"),
            ));
        }
        if let Some(previous) = seen.insert(number, name.text.as_str()) {
            out.push(Diagnostic::new(
                DiagnosticCode::DuplicateFieldNumber,
                span,
                format!("field number {number} is already used by `{previous}`"),
            ));
        }
    }
}

/// Reports a field number outside the allowed range. Returns whether it is valid.
fn check_field_number(field: &SyntaxNode, number: i64, out: &mut Vec<Diagnostic>) -> bool {
    let message = if number <= 0 || number > MAX_FIELD_NUMBER {
        format!("field number {number} is out of range 1 to {MAX_FIELD_NUMBER}")
    } else if RESERVED_IMPLEMENTATION_RANGE.contains(&number) {
        format!(
            "field numbers {} through {} are reserved for the protobuf implementation",
            RESERVED_IMPLEMENTATION_RANGE.start,
            RESERVED_IMPLEMENTATION_RANGE.end - 1
        )
    } else {
        return true;
    };
    out.push(Diagnostic::new(
        DiagnosticCode::InvalidFieldNumber,
        number_span(field),
        message,
    ));
    false
}

/// Span of the `= N` part of a field or enum value, falling back to the name.
fn number_span(node: &SyntaxNode) -> Span {
    match node.name() {
        Some(name) => name.span.end..node.span.end,
        None => node.span.clone(),
    }
}

fn enum_values(node: &SyntaxNode, proto3: bool, out: &mut Vec<Diagnostic>) {
    let allow_alias = node.option_value("allow_alias") == Some("true");
    let (reserved_ranges, reserved_names) = reservations(node);
    let values = node
        .children
        .iter()
        .filter(|child| matches!(child.kind, NodeKind::EnumValue { .. }));

    let mut seen: HashMap<i64, &str> = HashMap::new();
    for (i, value) in values.enumerate() {
        let Some(name) = value.name() else {
            continue;
        };
        let Some(number) = value.number() else {
            continue;
        };
        if i == 0 && proto3 && number != 0 {
            out.push(Diagnostic::new(
                DiagnosticCode::EnumFirstValueNotZero,
                number_span(value),
                "the first enum value must be zero in proto3",
            ));
        }
        if reserved_names.contains(name.text.as_str()) {
            out.push(Diagnostic::new(
                DiagnosticCode::ReservedFieldName,
                name.span.clone(),
                format!("enum value name `{}` is reserved", name.text),
            ));
        }
        if reserved_ranges.iter().any(|range| range.contains(number)) {
            out.push(Diagnostic::new(
                DiagnosticCode::ReservedFieldNumber,
                number_span(value),
                format!("enum value {number} is reserved"),
            ));
        }
        if let Some(previous) = seen.insert(number, name.text.as_str())
            && !allow_alias
        {
            out.push(Diagnostic::new(
                DiagnosticCode::DuplicateEnumValue,
                number_span(value),
                format!(
                    "enum value {number} is already used by `{previous}`; set `option allow_alias = true;` to allow aliases"
                ),
            ));
        }
    }
}
