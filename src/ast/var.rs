use super::{Binding, Exp, Position};

/// The assignable forms: plain names, array indexing and record fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Var {
    Name {
        name: String,
        position: Position,
        /// The resolving declaration, attached by scope analysis.
        binding: Option<Binding>,
    },
    Bracket {
        exp: Box<Exp>,
        index: Box<Exp>,
        position: Position,
    },
    Dot {
        exp: Box<Exp>,
        field: String,
        position: Position,
    },
}

impl Var {
    pub fn position(&self) -> Position {
        match self {
            Var::Name { position, .. }
            | Var::Bracket { position, .. }
            | Var::Dot { position, .. } => position.to_owned(),
        }
    }
}
