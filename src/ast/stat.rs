use super::{DeclId, Exp, Position, Var};

/// A sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stats: Vec<Stat>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stat {
    Block(Block),
    While {
        cond: Exp,
        block: Block,
        position: Position,
    },
    Repeat {
        block: Block,
        cond: Exp,
        position: Position,
    },
    If {
        /// The `if`/`elseif` arms in source order.
        thens: Vec<(Exp, Block)>,
        otherwise: Option<Block>,
        position: Position,
    },
    For {
        decl: DeclId,
        start: Exp,
        finish: Exp,
        step: Option<Exp>,
        block: Block,
        position: Position,
    },
    Assign {
        var: Var,
        exp: Exp,
        position: Position,
    },
    Decl {
        decl: DeclId,
        exp: Exp,
        position: Position,
    },
    Call {
        call: Exp,
        position: Position,
    },
    Return {
        exp: Option<Exp>,
        position: Position,
        /// Index of the enclosing top-level function, attached by scope
        /// analysis through the `$function` sentinel.
        func: Option<usize>,
    },
}

impl Stat {
    pub fn position(&self) -> Position {
        match self {
            Stat::Block(block) => block.position.to_owned(),
            Stat::While { position, .. }
            | Stat::Repeat { position, .. }
            | Stat::If { position, .. }
            | Stat::For { position, .. }
            | Stat::Assign { position, .. }
            | Stat::Decl { position, .. }
            | Stat::Call { position, .. }
            | Stat::Return { position, .. } => position.to_owned(),
        }
    }
}
