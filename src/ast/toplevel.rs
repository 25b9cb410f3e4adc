use super::{Block, DeclId, Exp, Position, Span, TypeAnnotation};
use crate::types::Type;

/// A top-level item of a module.
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    Func(FuncDecl),
    Var(VarDecl),
    Record(RecordDecl),
    Import(ImportDecl),
}

impl TopLevel {
    pub fn position(&self) -> Position {
        match self {
            TopLevel::Func(f) => f.position.to_owned(),
            TopLevel::Var(v) => v.position.to_owned(),
            TopLevel::Record(r) => r.position.to_owned(),
            TopLevel::Import(i) => i.position.to_owned(),
        }
    }

    pub fn ignore(&self) -> bool {
        match self {
            TopLevel::Func(f) => f.ignore,
            TopLevel::Var(v) => v.ignore,
            TopLevel::Record(r) => r.ignore,
            TopLevel::Import(i) => i.ignore,
        }
    }

    pub fn set_ignore(&mut self) {
        match self {
            TopLevel::Func(f) => f.ignore = true,
            TopLevel::Var(v) => v.ignore = true,
            TopLevel::Record(r) => r.ignore = true,
            TopLevel::Import(i) => i.ignore = true,
        }
    }
}

/// A top-level function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<DeclId>,
    pub return_types: Vec<TypeAnnotation>,
    pub block: Block,
    /// Local functions stay private; everything else lands in the module
    /// table.
    pub is_local: bool,
    pub position: Position,
    /// Byte span of the `: rettypes` annotation, if one was written.
    pub ret_span: Option<Span>,
    /// Set when the name collides with an earlier declaration; the node is
    /// kept for error recovery but skipped by later phases.
    pub ignore: bool,
    /// The function type, attached by the checker's collect pass.
    pub ty: Option<Type>,
    /// Index of this function's slot in the globals table, attached by the
    /// coder.
    pub global_index: Option<usize>,
    /// Name of the statically typed C entry point, attached by the coder.
    pub titan_entry: Option<String>,
    /// Name of the stack-based C entry point, attached by the coder.
    pub lua_entry: Option<String>,
}

/// A top-level variable with its initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub decl: DeclId,
    pub value: Exp,
    pub position: Position,
    pub ignore: bool,
    pub global_index: Option<usize>,
}

/// A record declaration, introducing a nominal type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecl {
    pub name: String,
    pub fields: Vec<(String, TypeAnnotation)>,
    pub position: Position,
    pub ignore: bool,
}

/// An `import` of another module.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub name: String,
    pub module: String,
    pub position: Position,
    pub ignore: bool,
}
