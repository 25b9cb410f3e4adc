//! Module for parsing Titan modules.
//!
//! It contains all structs for the internal representation of a Titan module
//! (i.e., the AST), along with the parser producing it.
mod exp;
mod operators;
mod parser;
mod stat;
mod toplevel;
mod type_annotation;
mod var;

pub use self::exp::*;
pub use self::operators::*;
pub use self::parser::*;
pub use self::stat::*;
pub use self::toplevel::*;
pub use self::type_annotation::*;
pub use self::var::*;

use crate::types::Type;

/// A position within a file (i.e., file name, line and column).
pub type Position = (String, usize, usize);

/// A byte range within the source text, used to erase type annotations when
/// emitting plain Lua.
pub type Span = (usize, usize);

/// Index of a declaration inside [`Program::decls`].
///
/// Name occurrences point back to their declaration through this index, so
/// the tree itself stays acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclId(pub usize);

/// What a name occurrence resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// A variable declaration (local, parameter, loop variable or global).
    Decl(DeclId),
    /// A top-level function, by its index in [`Program::toplevels`].
    Func(usize),
    /// A top-level record declaration.
    Record(usize),
    /// A top-level import.
    Import(usize),
}

/// A single variable declaration: a local, a parameter, a loop variable or a
/// top-level variable. All declarations live in the arena owned by
/// [`Program`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub type_ann: Option<TypeAnnotation>,
    pub position: Position,
    /// Byte span of the `: type` annotation, if one was written.
    pub ann_span: Option<Span>,
    /// The elaborated type, attached by the checker.
    pub ty: Option<Type>,
}

/// AST of a single Titan module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub toplevels: Vec<TopLevel>,
    pub decls: Vec<Decl>,
}

impl Program {
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.0]
    }

    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        self.decls.push(decl);
        DeclId(self.decls.len() - 1)
    }
}
