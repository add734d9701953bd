//! Per-file symbol table: declarations, type references and imports

use indexmap::IndexMap;

use crate::parser::ast::{Ident, ImportKind, NodeKind, Span, SyntaxNode, TypeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Message,
    Enum,
    EnumValue,
    Field,
    Oneof,
    Service,
    Method,
    /// Field declared inside an `extend` block.
    Extension,
}

impl SymbolKind {
    /// Messages and enums can be used as field types.
    pub fn is_type(self) -> bool {
        matches!(self, SymbolKind::Message | SymbolKind::Enum)
    }

    pub fn describe(self) -> &'static str {
        match self {
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumValue => "enum value",
            SymbolKind::Field => "field",
            SymbolKind::Oneof => "oneof",
            SymbolKind::Service => "service",
            SymbolKind::Method => "rpc",
            SymbolKind::Extension => "extension",
        }
    }
}

/// A named declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub fqn: String,
    pub name: String,
    pub kind: SymbolKind,
    /// Fully qualified name of the enclosing scope; empty at the root of a file
    /// without a package.
    pub scope: String,
    pub name_span: Span,
    pub span: Span,
}

/// Where a type reference appears, which decides what it may resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceContext {
    FieldType,
    MapValue,
    MethodInput,
    MethodOutput,
    Extendee,
    OptionName,
}

impl ReferenceContext {
    pub fn accepts(self, kind: SymbolKind) -> bool {
        match self {
            ReferenceContext::FieldType | ReferenceContext::MapValue => kind.is_type(),
            ReferenceContext::MethodInput
            | ReferenceContext::MethodOutput
            | ReferenceContext::Extendee => kind == SymbolKind::Message,
            ReferenceContext::OptionName => kind == SymbolKind::Extension,
        }
    }

    /// Kinds a lone name stops at while walking outward. A type reference stops at any
    /// type so that using an enum as an rpc input reports the enum instead of nothing.
    pub fn looks_for(self, kind: SymbolKind) -> bool {
        match self {
            ReferenceContext::OptionName => kind == SymbolKind::Extension,
            _ => kind.is_type(),
        }
    }
}

/// A type or option name written in the file. Scalar types are recorded too so that
/// queries on them can tell a built-in apart from an unknown name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: TypeName,
    /// Scope the name is looked up from, innermost first.
    pub scope: String,
    pub context: ReferenceContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub path: String,
    pub span: Span,
    pub path_span: Span,
    pub kind: ImportKind,
}

/// A declaration whose fully qualified name was already taken in the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSymbol {
    pub symbol: Symbol,
    pub first: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
    Editions,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub syntax: Syntax,
    pub package: Option<String>,
    pub package_span: Option<Span>,
    /// Additional `package` statements, which protobuf rejects.
    pub extra_packages: Vec<Span>,
    /// All declarations keyed by fully qualified name, in source order.
    pub symbols: IndexMap<String, Symbol>,
    pub duplicates: Vec<DuplicateSymbol>,
    pub references: Vec<Reference>,
    pub imports: Vec<ImportDecl>,
}

/// Joins a scope and a relative name.
pub fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

/// The scope enclosing `fqn`, or `None` at the root.
pub fn parent_scope(fqn: &str) -> Option<&str> {
    if fqn.is_empty() {
        return None;
    }
    Some(fqn.rfind('.').map_or("", |i| &fqn[..i]))
}

impl SymbolTable {
    /// Build the table for a parsed file.
    pub fn build(root: &SyntaxNode) -> Self {
        let mut table = SymbolTable::default();

        for node in &root.children {
            match &node.kind {
                NodeKind::Syntax { value, edition } => {
                    table.syntax = match (edition, value.as_str()) {
                        (true, _) => Syntax::Editions,
                        (false, "proto3") => Syntax::Proto3,
                        _ => Syntax::Proto2,
                    };
                }
                NodeKind::Package { name } => {
                    if table.package.is_none() {
                        table.package = Some(name.text.trim_start_matches('.').to_string());
                        table.package_span = Some(name.span.clone());
                    } else {
                        table.extra_packages.push(node.span.clone());
                    }
                }
                NodeKind::Import {
                    path,
                    path_span,
                    kind,
                } => table.imports.push(ImportDecl {
                    path: path.clone(),
                    span: node.span.clone(),
                    path_span: path_span.clone(),
                    kind: *kind,
                }),
                _ => {}
            }
        }

        let package = table.package.clone().unwrap_or_default();
        table.walk(&root.children, &package, false);
        table
    }

    fn walk(&mut self, nodes: &[SyntaxNode], scope: &str, in_extend: bool) {
        for node in nodes {
            match &node.kind {
                NodeKind::Message { name } => {
                    let fqn = self.declare(name, node, SymbolKind::Message, scope);
                    self.walk(&node.children, &fqn, false);
                }
                NodeKind::Enum { name } => {
                    let fqn = self.declare(name, node, SymbolKind::Enum, scope);
                    for child in &node.children {
                        if let NodeKind::EnumValue { name, .. } = &child.kind {
                            self.declare(name, child, SymbolKind::EnumValue, &fqn);
                        }
                        self.option_references(child, &fqn);
                    }
                }
                NodeKind::Field { ty, name, .. } => {
                    let kind = if in_extend {
                        SymbolKind::Extension
                    } else {
                        SymbolKind::Field
                    };
                    self.declare(name, node, kind, scope);
                    self.reference(ty, scope, ReferenceContext::FieldType);
                    self.option_references(node, scope);
                }
                NodeKind::MapField { value, name, .. } => {
                    self.declare(name, node, SymbolKind::Field, scope);
                    self.reference(value, scope, ReferenceContext::MapValue);
                    self.option_references(node, scope);
                }
                NodeKind::Oneof { name } => {
                    self.declare(name, node, SymbolKind::Oneof, scope);
                    // oneof members live in the enclosing message's scope
                    self.walk(&node.children, scope, false);
                }
                NodeKind::Extend { extendee } => {
                    self.reference(extendee, scope, ReferenceContext::Extendee);
                    self.walk(&node.children, scope, true);
                }
                NodeKind::Service { name } => {
                    let fqn = self.declare(name, node, SymbolKind::Service, scope);
                    for child in &node.children {
                        if let NodeKind::Method {
                            name,
                            input,
                            output,
                            ..
                        } = &child.kind
                        {
                            self.declare(name, child, SymbolKind::Method, &fqn);
                            self.reference(input, &fqn, ReferenceContext::MethodInput);
                            self.reference(output, &fqn, ReferenceContext::MethodOutput);
                        }
                        self.option_references(child, &fqn);
                    }
                }
                NodeKind::Option { .. } => self.option_references(node, scope),
                _ => {}
            }
        }
    }

    fn declare(
        &mut self,
        name: &Ident,
        node: &SyntaxNode,
        kind: SymbolKind,
        scope: &str,
    ) -> String {
        let fqn = qualify(scope, &name.text);
        let symbol = Symbol {
            fqn: fqn.clone(),
            name: name.text.clone(),
            kind,
            scope: scope.to_string(),
            name_span: name.span.clone(),
            span: node.span.clone(),
        };
        match self.symbols.get(&fqn) {
            Some(existing) => self.duplicates.push(DuplicateSymbol {
                first: existing.name_span.clone(),
                symbol,
            }),
            None => {
                self.symbols.insert(fqn.clone(), symbol);
            }
        }
        fqn
    }

    fn reference(&mut self, name: &TypeName, scope: &str, context: ReferenceContext) {
        self.references.push(Reference {
            name: name.clone(),
            scope: scope.to_string(),
            context,
        });
    }

    /// Custom option names on `node` itself (an option statement) or on its compact
    /// `[...]` options.
    fn option_references(&mut self, node: &SyntaxNode, scope: &str) {
        let options = std::iter::once(node).chain(node.children.iter());
        let extensions: Vec<TypeName> = options
            .filter_map(|n| match &n.kind {
                NodeKind::Option { name, .. } => name.extension.clone(),
                _ => None,
            })
            .collect();
        for extension in extensions {
            self.reference(&extension, scope, ReferenceContext::OptionName);
        }
    }

    /// Declaration whose name span contains `offset`.
    pub fn symbol_at(&self, offset: usize) -> Option<&Symbol> {
        self.symbols
            .values()
            .find(|s| s.name_span.start <= offset && offset <= s.name_span.end)
    }

    /// Direct members of `scope`.
    pub fn members_of<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.symbols.values().filter(move |s| s.scope == scope)
    }

    /// Fully qualified name of the innermost message, enum or service enclosing `offset`.
    pub fn scope_at(&self, root: &SyntaxNode, offset: usize) -> String {
        let mut scope = self.package.clone().unwrap_or_default();
        for node in root.path_to(offset).into_iter().skip(1) {
            match &node.kind {
                NodeKind::Message { name }
                | NodeKind::Enum { name }
                | NodeKind::Service { name } => {
                    // a cursor on the declared name itself is still in the outer scope
                    if name.span.start <= offset && offset <= name.span.end {
                        break;
                    }
                    scope = qualify(&scope, &name.text);
                }
                NodeKind::Oneof { .. } | NodeKind::Extend { .. } => {}
                _ => break,
            }
        }
        scope
    }
}
