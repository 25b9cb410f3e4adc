use super::{Binop, Position, Unop, Var};
use crate::types::Type;

/// An expression together with the annotations later phases attach to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Exp {
    pub kind: ExpKind,
    pub position: Position,
    /// The elaborated type, attached by the checker.
    pub ty: Option<Type>,
    /// Set when `ty` is a recovery type assigned after an error, so checks
    /// depending on it stay quiet.
    pub poisoned: bool,
}

impl Exp {
    pub fn new(kind: ExpKind, position: Position) -> Exp {
        Exp {
            kind,
            position,
            ty: None,
            poisoned: false,
        }
    }

    /// The elaborated type of this expression. Only valid after the checker
    /// ran successfully.
    pub fn typ(&self) -> &Type {
        self.ty
            .as_ref()
            .expect("expression was not visited by the checker")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Var(Var),
    Unop {
        op: Unop,
        exp: Box<Exp>,
    },
    Binop {
        op: Binop,
        lhs: Box<Exp>,
        rhs: Box<Exp>,
    },
    Call {
        func: Box<Exp>,
        args: Vec<Exp>,
    },
    Initlist {
        exps: Vec<Exp>,
    },
    Concat {
        exps: Vec<Exp>,
    },
    /// A conversion inserted by the checker; there is no source syntax for
    /// casts.
    Cast {
        exp: Box<Exp>,
        target: Type,
    },
}
