//! Parser for Titan modules.
//!
//! The grammar lives in `titan.pest`; this module turns the pest parse tree
//! into the AST. Operator precedence follows Lua and is resolved with a
//! Pratt parser over the flat `exp` rule.
use once_cell::sync::Lazy;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use unescape::unescape;

use crate::diagnostics::{Diagnostic, ErrorKind};

use super::{
    Binop, Block, Decl, DeclId, Exp, ExpKind, FuncDecl, ImportDecl, Position, Program, RecordDecl,
    Stat, TopLevel, TypeAnnotation, Unop, Var, VarDecl,
};

#[derive(Parser)]
#[grammar = "titan.pest"]
pub struct TitanParser;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::opor, Assoc::Left))
        .op(Op::infix(Rule::opand, Assoc::Left))
        .op(Op::infix(Rule::oplt, Assoc::Left)
            | Op::infix(Rule::opgt, Assoc::Left)
            | Op::infix(Rule::ople, Assoc::Left)
            | Op::infix(Rule::opge, Assoc::Left)
            | Op::infix(Rule::opne, Assoc::Left)
            | Op::infix(Rule::opeq, Assoc::Left))
        .op(Op::infix(Rule::opbor, Assoc::Left))
        .op(Op::infix(Rule::opbxor, Assoc::Left))
        .op(Op::infix(Rule::opband, Assoc::Left))
        .op(Op::infix(Rule::opshl, Assoc::Left) | Op::infix(Rule::opshr, Assoc::Left))
        .op(Op::infix(Rule::opconcat, Assoc::Right))
        .op(Op::infix(Rule::opadd, Assoc::Left) | Op::infix(Rule::opsub, Assoc::Left))
        .op(Op::infix(Rule::opmul, Assoc::Left)
            | Op::infix(Rule::opdiv, Assoc::Left)
            | Op::infix(Rule::opidiv, Assoc::Left)
            | Op::infix(Rule::opmod, Assoc::Left))
        .op(Op::prefix(Rule::opneg)
            | Op::prefix(Rule::opnot)
            | Op::prefix(Rule::oplen)
            | Op::prefix(Rule::opbnot))
        .op(Op::infix(Rule::oppow, Assoc::Right))
});

/// Operator tree handed out by the Pratt parser. It is lowered into [`Exp`]
/// in a second step so the Pratt closures stay free of builder state.
enum PExp<'i> {
    Primary(Pair<'i, Rule>),
    Prefix(Rule, (usize, usize), Box<PExp<'i>>),
    Infix(Box<PExp<'i>>, Rule, (usize, usize), Box<PExp<'i>>),
}

/// Parse one module. On success the returned [`Program`] is the raw tree:
/// no annotations are attached yet.
pub fn parse_program(file: &str, source: &str) -> Result<Program, Vec<Diagnostic>> {
    let mut pairs = match TitanParser::parse(Rule::program, source) {
        Ok(pairs) => pairs,
        Err(err) => {
            let (line, col) = match err.line_col {
                pest::error::LineColLocation::Pos((line, col)) => (line, col),
                pest::error::LineColLocation::Span((line, col), _) => (line, col),
            };
            return Err(vec![Diagnostic::new(
                ErrorKind::Syntax,
                format!("syntax error, {}", err.variant.message()),
                (file.to_owned(), line, col),
            )]);
        }
    };

    let mut builder = AstBuilder {
        file: file.to_owned(),
        decls: vec![],
        errors: vec![],
    };

    let program = pairs.next().expect("grammar produced no program");
    let mut toplevels = vec![];
    for pair in program.into_inner() {
        if pair.as_rule() != Rule::EOI {
            toplevels.push(builder.build_toplevel(pair));
        }
    }

    if builder.errors.is_empty() {
        Ok(Program {
            toplevels,
            decls: builder.decls,
        })
    } else {
        Err(builder.errors)
    }
}

struct AstBuilder {
    file: String,
    decls: Vec<Decl>,
    errors: Vec<Diagnostic>,
}

impl AstBuilder {
    fn pos(&self, pair: &Pair<Rule>) -> Position {
        let (line, col) = pair.line_col();
        (self.file.clone(), line, col)
    }

    fn error(&mut self, message: impl Into<String>, position: Position) {
        self.errors
            .push(Diagnostic::new(ErrorKind::Syntax, message, position));
    }

    fn add_decl(&mut self, decl: Decl) -> DeclId {
        self.decls.push(decl);
        DeclId(self.decls.len() - 1)
    }

    fn build_toplevel(&mut self, pair: Pair<Rule>) -> TopLevel {
        match pair.as_rule() {
            Rule::toplevelfunc => self.build_func(pair),
            Rule::toplevelvar => self.build_toplevelvar(pair),
            Rule::toplevelrecord => self.build_record(pair),
            Rule::import => self.build_import(pair),
            rule => unreachable!("unexpected top-level rule '{rule:?}'"),
        }
    }

    fn build_func(&mut self, pair: Pair<Rule>) -> TopLevel {
        let position = self.pos(&pair);
        let mut is_local = false;
        let mut name = String::new();
        let mut params = vec![];
        let mut return_types = vec![];
        let mut ret_span = None;
        let mut block = None;

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::klocal => is_local = true,
                Rule::kfunction | Rule::kend => {}
                Rule::name => name = p.as_str().to_owned(),
                Rule::paramlist => {
                    for param in p.into_inner() {
                        params.push(self.build_param(param));
                    }
                }
                Rule::rettypeann => {
                    let span = p.as_span();
                    ret_span = Some((span.start(), span.end()));
                    let rettypes = p
                        .into_inner()
                        .next()
                        .expect("return annotation without types");
                    return_types = self.build_rettypes(rettypes);
                }
                Rule::block => block = Some(self.build_block(p)),
                rule => unreachable!("unexpected rule '{rule:?}' in function declaration"),
            }
        }

        TopLevel::Func(FuncDecl {
            name,
            params,
            return_types,
            block: block.expect("function without a body"),
            is_local,
            position,
            ret_span,
            ignore: false,
            ty: None,
            global_index: None,
            titan_entry: None,
            lua_entry: None,
        })
    }

    fn build_toplevelvar(&mut self, pair: Pair<Rule>) -> TopLevel {
        let position = self.pos(&pair);
        let mut decl = None;
        let mut value = None;

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::klocal => {}
                Rule::decl => decl = Some(self.build_decl(p)),
                Rule::exp => value = Some(self.build_exp(p)),
                rule => unreachable!("unexpected rule '{rule:?}' in variable declaration"),
            }
        }

        TopLevel::Var(VarDecl {
            decl: decl.expect("variable declaration without a name"),
            value: value.expect("variable declaration without a value"),
            position,
            ignore: false,
            global_index: None,
        })
    }

    fn build_record(&mut self, pair: Pair<Rule>) -> TopLevel {
        let position = self.pos(&pair);
        let mut name = String::new();
        let mut fields = vec![];

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::krecord | Rule::kend => {}
                Rule::name => name = p.as_str().to_owned(),
                Rule::recordfield => {
                    let mut inner = p.into_inner();
                    let field = inner.next().expect("record field without a name");
                    let typexp = inner.next().expect("record field without a type");
                    let ann = self.build_typexp(typexp);
                    fields.push((field.as_str().to_owned(), ann));
                }
                rule => unreachable!("unexpected rule '{rule:?}' in record declaration"),
            }
        }

        TopLevel::Record(RecordDecl {
            name,
            fields,
            position,
            ignore: false,
        })
    }

    fn build_import(&mut self, pair: Pair<Rule>) -> TopLevel {
        let position = self.pos(&pair);
        let mut name = String::new();
        let mut module = String::new();

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::klocal | Rule::kimport => {}
                Rule::name => name = p.as_str().to_owned(),
                Rule::string => module = self.string_value(p),
                rule => unreachable!("unexpected rule '{rule:?}' in import"),
            }
        }

        TopLevel::Import(ImportDecl {
            name,
            module,
            position,
            ignore: false,
        })
    }

    fn build_param(&mut self, pair: Pair<Rule>) -> DeclId {
        let position = self.pos(&pair);
        let mut inner = pair.into_inner();
        let name = inner.next().expect("parameter without a name");
        let ann = inner.next().expect("parameter without a type annotation");
        let span = ann.as_span();
        let ann_span = Some((span.start(), span.end()));
        let type_ann = Some(self.build_declann(ann));

        self.add_decl(Decl {
            name: name.as_str().to_owned(),
            type_ann,
            position,
            ann_span,
            ty: None,
        })
    }

    fn build_decl(&mut self, pair: Pair<Rule>) -> DeclId {
        let position = self.pos(&pair);
        let mut inner = pair.into_inner();
        let name = inner.next().expect("declaration without a name");
        let mut type_ann = None;
        let mut ann_span = None;
        if let Some(ann) = inner.next() {
            let span = ann.as_span();
            ann_span = Some((span.start(), span.end()));
            type_ann = Some(self.build_declann(ann));
        }

        self.add_decl(Decl {
            name: name.as_str().to_owned(),
            type_ann,
            position,
            ann_span,
            ty: None,
        })
    }

    fn build_declann(&mut self, pair: Pair<Rule>) -> TypeAnnotation {
        let typexp = pair
            .into_inner()
            .next()
            .expect("type annotation without a type");
        self.build_typexp(typexp)
    }

    fn build_typexp(&mut self, pair: Pair<Rule>) -> TypeAnnotation {
        let inner = pair.into_inner().next().expect("empty type expression");
        let position = self.pos(&inner);
        match inner.as_rule() {
            Rule::basetype => TypeAnnotation::Name {
                name: inner.as_str().to_owned(),
                position,
            },
            Rule::arraytype => {
                let elem = inner.into_inner().next().expect("array type without an element");
                TypeAnnotation::Array {
                    elem: Box::new(self.build_typexp(elem)),
                    position,
                }
            }
            Rule::functype => {
                let mut params = vec![];
                let mut returns = vec![];
                for p in inner.into_inner() {
                    match p.as_rule() {
                        Rule::typelist => {
                            for t in p.into_inner() {
                                params.push(self.build_typexp(t));
                            }
                        }
                        Rule::rettypes => returns = self.build_rettypes(p),
                        rule => unreachable!("unexpected rule '{rule:?}' in function type"),
                    }
                }
                TypeAnnotation::Function {
                    params,
                    returns,
                    position,
                }
            }
            rule => unreachable!("unexpected type rule '{rule:?}'"),
        }
    }

    fn build_rettypes(&mut self, pair: Pair<Rule>) -> Vec<TypeAnnotation> {
        let mut types = vec![];
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::typelist => {
                    for t in p.into_inner() {
                        types.push(self.build_typexp(t));
                    }
                }
                Rule::typexp => types.push(self.build_typexp(p)),
                rule => unreachable!("unexpected rule '{rule:?}' in return types"),
            }
        }
        types
    }

    fn build_block(&mut self, pair: Pair<Rule>) -> Block {
        let position = self.pos(&pair);
        let mut stats = vec![];
        for p in pair.into_inner() {
            if let Some(stat) = self.build_stat(p) {
                stats.push(stat);
            }
        }
        Block { stats, position }
    }

    fn build_stat(&mut self, pair: Pair<Rule>) -> Option<Stat> {
        let position = self.pos(&pair);
        match pair.as_rule() {
            Rule::dostat => {
                let block = pair
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::block)
                    .expect("do statement without a block");
                Some(Stat::Block(self.build_block(block)))
            }
            Rule::whilestat => {
                let mut cond = None;
                let mut block = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::exp => cond = Some(self.build_exp(p)),
                        Rule::block => block = Some(self.build_block(p)),
                        _ => {}
                    }
                }
                Some(Stat::While {
                    cond: cond.expect("while without a condition"),
                    block: block.expect("while without a body"),
                    position,
                })
            }
            Rule::repeatstat => {
                let mut cond = None;
                let mut block = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::exp => cond = Some(self.build_exp(p)),
                        Rule::block => block = Some(self.build_block(p)),
                        _ => {}
                    }
                }
                Some(Stat::Repeat {
                    block: block.expect("repeat without a body"),
                    cond: cond.expect("repeat without a condition"),
                    position,
                })
            }
            Rule::ifstat => {
                let mut conds = vec![];
                let mut blocks = vec![];
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::exp => conds.push(self.build_exp(p)),
                        Rule::block => blocks.push(self.build_block(p)),
                        _ => {}
                    }
                }
                let otherwise = if blocks.len() > conds.len() {
                    blocks.pop()
                } else {
                    None
                };
                Some(Stat::If {
                    thens: conds.into_iter().zip(blocks).collect(),
                    otherwise,
                    position,
                })
            }
            Rule::forstat => {
                let mut decl = None;
                let mut exps = vec![];
                let mut block = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::decl => decl = Some(self.build_decl(p)),
                        Rule::exp => exps.push(self.build_exp(p)),
                        Rule::block => block = Some(self.build_block(p)),
                        _ => {}
                    }
                }
                let mut exps = exps.into_iter();
                Some(Stat::For {
                    decl: decl.expect("for without a loop variable"),
                    start: exps.next().expect("for without a start expression"),
                    finish: exps.next().expect("for without a limit expression"),
                    step: exps.next(),
                    block: block.expect("for without a body"),
                    position,
                })
            }
            Rule::declstat => {
                let mut decl = None;
                let mut exp = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::decl => decl = Some(self.build_decl(p)),
                        Rule::exp => exp = Some(self.build_exp(p)),
                        _ => {}
                    }
                }
                Some(Stat::Decl {
                    decl: decl.expect("local declaration without a name"),
                    exp: exp.expect("local declaration without a value"),
                    position,
                })
            }
            Rule::exprstat => self.build_exprstat(pair, position),
            Rule::retstat => {
                let exp = pair
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::exp)
                    .map(|p| self.build_exp(p));
                Some(Stat::Return {
                    exp,
                    position,
                    func: None,
                })
            }
            rule => unreachable!("unexpected statement rule '{rule:?}'"),
        }
    }

    fn build_exprstat(&mut self, pair: Pair<Rule>, position: Position) -> Option<Stat> {
        let mut inner = pair.into_inner();
        let target = self.build_suffixedexp(inner.next().expect("empty expression statement"));

        if let Some(rhs) = inner.next() {
            let exp = self.build_exp(rhs);
            if let ExpKind::Var(var) = target.kind {
                Some(Stat::Assign {
                    var,
                    exp,
                    position,
                })
            } else {
                self.error("syntax error, cannot assign to this expression", target.position);
                None
            }
        } else if matches!(target.kind, ExpKind::Call { .. }) {
            Some(Stat::Call {
                call: target,
                position,
            })
        } else {
            self.error(
                "syntax error, expression statement must be a function call",
                target.position,
            );
            None
        }
    }

    fn build_exp(&mut self, pair: Pair<Rule>) -> Exp {
        let pexp = PRATT
            .map_primary(PExp::Primary)
            .map_prefix(|op, rhs| PExp::Prefix(op.as_rule(), op.line_col(), Box::new(rhs)))
            .map_infix(|lhs, op, rhs| {
                PExp::Infix(Box::new(lhs), op.as_rule(), op.line_col(), Box::new(rhs))
            })
            .parse(pair.into_inner());
        self.lower_exp(pexp)
    }

    fn lower_exp(&mut self, pexp: PExp) -> Exp {
        match pexp {
            PExp::Primary(pair) => self.build_primary(pair),
            PExp::Prefix(rule, (line, col), rhs) => {
                let position = (self.file.clone(), line, col);
                let exp = self.lower_exp(*rhs);
                let op = match rule {
                    Rule::opneg => Unop::Neg,
                    Rule::opnot => Unop::Not,
                    Rule::oplen => Unop::Len,
                    Rule::opbnot => Unop::BNot,
                    rule => unreachable!("unexpected prefix operator '{rule:?}'"),
                };
                Exp::new(
                    ExpKind::Unop {
                        op,
                        exp: Box::new(exp),
                    },
                    position,
                )
            }
            PExp::Infix(lhs, rule, (line, col), rhs) => {
                let position = (self.file.clone(), line, col);
                if rule == Rule::opconcat {
                    let mut exps = vec![];
                    self.flatten_concat(*lhs, &mut exps);
                    self.flatten_concat(*rhs, &mut exps);
                    return Exp::new(ExpKind::Concat { exps }, position);
                }
                let op = match rule {
                    Rule::opor => Binop::Or,
                    Rule::opand => Binop::And,
                    Rule::oplt => Binop::Lt,
                    Rule::opgt => Binop::Gt,
                    Rule::ople => Binop::Le,
                    Rule::opge => Binop::Ge,
                    Rule::opne => Binop::Ne,
                    Rule::opeq => Binop::Eq,
                    Rule::opbor => Binop::BOr,
                    Rule::opbxor => Binop::BXor,
                    Rule::opband => Binop::BAnd,
                    Rule::opshl => Binop::Shl,
                    Rule::opshr => Binop::Shr,
                    Rule::opadd => Binop::Add,
                    Rule::opsub => Binop::Sub,
                    Rule::opmul => Binop::Mul,
                    Rule::opdiv => Binop::Div,
                    Rule::opidiv => Binop::IntDiv,
                    Rule::opmod => Binop::Mod,
                    Rule::oppow => Binop::Pow,
                    rule => unreachable!("unexpected infix operator '{rule:?}'"),
                };
                let lhs = self.lower_exp(*lhs);
                let rhs = self.lower_exp(*rhs);
                Exp::new(
                    ExpKind::Binop {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    position,
                )
            }
        }
    }

    /// `a .. b .. c` becomes one flat concatenation.
    fn flatten_concat(&mut self, pexp: PExp, out: &mut Vec<Exp>) {
        match pexp {
            PExp::Infix(lhs, Rule::opconcat, _, rhs) => {
                self.flatten_concat(*lhs, out);
                self.flatten_concat(*rhs, out);
            }
            other => out.push(self.lower_exp(other)),
        }
    }

    fn build_primary(&mut self, pair: Pair<Rule>) -> Exp {
        let position = self.pos(&pair);
        match pair.as_rule() {
            Rule::knil => Exp::new(ExpKind::Nil, position),
            Rule::ktrue => Exp::new(ExpKind::Bool(true), position),
            Rule::kfalse => Exp::new(ExpKind::Bool(false), position),
            Rule::integer => match pair.as_str().parse::<i64>() {
                Ok(value) => Exp::new(ExpKind::Integer(value), position),
                // Like Lua, a decimal literal too big for an integer is a
                // float.
                Err(_) => match pair.as_str().parse::<f64>() {
                    Ok(value) => Exp::new(ExpKind::Float(value), position),
                    Err(_) => {
                        self.error("malformed number", position.clone());
                        Exp::new(ExpKind::Integer(0), position)
                    }
                },
            },
            Rule::hexinteger => {
                let value = parse_hex(&pair.as_str()[2..]);
                Exp::new(ExpKind::Integer(value), position)
            }
            Rule::float => match pair.as_str().parse::<f64>() {
                Ok(value) => Exp::new(ExpKind::Float(value), position),
                Err(_) => {
                    self.error("malformed number", position.clone());
                    Exp::new(ExpKind::Float(0.0), position)
                }
            },
            Rule::string => {
                let value = self.string_value(pair);
                Exp::new(ExpKind::Str(value), position)
            }
            Rule::initlist => {
                let exps = pair.into_inner().map(|p| self.build_exp(p)).collect();
                Exp::new(ExpKind::Initlist { exps }, position)
            }
            Rule::suffixedexp => self.build_suffixedexp(pair),
            rule => unreachable!("unexpected primary rule '{rule:?}'"),
        }
    }

    fn build_suffixedexp(&mut self, pair: Pair<Rule>) -> Exp {
        let mut inner = pair.into_inner();
        let primary = inner.next().expect("empty suffixed expression");
        let mut exp = self.build_primaryexp(primary);

        for suffix in inner {
            let position = self.pos(&suffix);
            match suffix.as_rule() {
                Rule::callargs => {
                    let mut args = vec![];
                    if let Some(explist) = suffix.into_inner().next() {
                        for e in explist.into_inner() {
                            args.push(self.build_exp(e));
                        }
                    }
                    exp = Exp::new(
                        ExpKind::Call {
                            func: Box::new(exp),
                            args,
                        },
                        position,
                    );
                }
                Rule::index => {
                    let index = suffix
                        .into_inner()
                        .next()
                        .expect("index without an expression");
                    let index = self.build_exp(index);
                    exp = Exp::new(
                        ExpKind::Var(Var::Bracket {
                            exp: Box::new(exp),
                            index: Box::new(index),
                            position: position.clone(),
                        }),
                        position,
                    );
                }
                Rule::dotfield => {
                    let field = suffix
                        .into_inner()
                        .next()
                        .expect("field access without a name");
                    exp = Exp::new(
                        ExpKind::Var(Var::Dot {
                            exp: Box::new(exp),
                            field: field.as_str().to_owned(),
                            position: position.clone(),
                        }),
                        position,
                    );
                }
                rule => unreachable!("unexpected suffix rule '{rule:?}'"),
            }
        }

        exp
    }

    fn build_primaryexp(&mut self, pair: Pair<Rule>) -> Exp {
        let position = self.pos(&pair);
        let inner = pair
            .into_inner()
            .next()
            .expect("empty primary expression");
        match inner.as_rule() {
            Rule::name => Exp::new(
                ExpKind::Var(Var::Name {
                    name: inner.as_str().to_owned(),
                    position: position.clone(),
                    binding: None,
                }),
                position,
            ),
            Rule::exp => self.build_exp(inner),
            rule => unreachable!("unexpected rule '{rule:?}' in primary expression"),
        }
    }

    fn string_value(&mut self, pair: Pair<Rule>) -> String {
        let position = self.pos(&pair);
        let raw = pair
            .into_inner()
            .next()
            .expect("string literal without contents");
        match unescape(raw.as_str()) {
            Some(value) => value,
            None => {
                self.error("malformed string literal, invalid escape sequence", position);
                raw.as_str().to_owned()
            }
        }
    }
}

/// Hexadecimal literals wrap around like Lua's lexer does.
fn parse_hex(digits: &str) -> i64 {
    let trimmed = digits.trim_start_matches('0');
    let tail = if trimmed.len() > 16 {
        &trimmed[trimmed.len() - 16..]
    } else {
        trimmed
    };
    u64::from_str_radix(tail, 16).map(|v| v as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program("test.pln", source).expect("program should parse")
    }

    #[test]
    fn parses_an_empty_module() {
        let program = parse("");
        assert!(program.toplevels.is_empty());
    }

    #[test]
    fn parses_a_function_with_parameters() {
        let program = parse("local function add(x: integer, y: integer): integer return x + y end");
        assert_eq!(program.toplevels.len(), 1);
        let TopLevel::Func(func) = &program.toplevels[0] else {
            panic!("expected a function");
        };
        assert_eq!(func.name, "add");
        assert!(func.is_local);
        assert_eq!(func.params.len(), 2);
        assert_eq!(program.decl(func.params[0]).name, "x");
        assert_eq!(func.return_types.len(), 1);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("local x = 1 + 2 * 3");
        let TopLevel::Var(var) = &program.toplevels[0] else {
            panic!("expected a variable");
        };
        let ExpKind::Binop { op: Binop::Add, rhs, .. } = &var.value.kind else {
            panic!("expected the addition at the root, got {:?}", var.value.kind);
        };
        assert!(matches!(
            rhs.kind,
            ExpKind::Binop { op: Binop::Mul, .. }
        ));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let program = parse("local x = -2 ^ 2");
        let TopLevel::Var(var) = &program.toplevels[0] else {
            panic!("expected a variable");
        };
        let ExpKind::Unop { op: Unop::Neg, exp } = &var.value.kind else {
            panic!("expected the negation at the root, got {:?}", var.value.kind);
        };
        assert!(matches!(
            exp.kind,
            ExpKind::Binop { op: Binop::Pow, .. }
        ));
    }

    #[test]
    fn concat_chains_are_flattened() {
        let program = parse("local x = \"a\" .. \"b\" .. \"c\"");
        let TopLevel::Var(var) = &program.toplevels[0] else {
            panic!("expected a variable");
        };
        let ExpKind::Concat { exps } = &var.value.kind else {
            panic!("expected a concatenation, got {:?}", var.value.kind);
        };
        assert_eq!(exps.len(), 3);
    }

    #[test]
    fn every_node_carries_a_position() {
        let program = parse("local function f(): integer\n    return 40 + 2\nend");
        let TopLevel::Func(func) = &program.toplevels[0] else {
            panic!("expected a function");
        };
        let Stat::Return { exp: Some(exp), .. } = &func.block.stats[0] else {
            panic!("expected a return");
        };
        let (file, line, _) = &exp.position;
        assert_eq!(file, "test.pln");
        assert_eq!(*line, 2);
    }

    #[test]
    fn rejects_an_assignment_to_a_call() {
        let errors = parse_program("test.pln", "local function f() f() = 1 end")
            .expect_err("assigning to a call should fail");
        assert!(errors[0].message.contains("cannot assign"));
    }

    #[test]
    fn reports_syntax_errors_with_a_position() {
        let errors = parse_program("test.pln", "local function f(").expect_err("should fail");
        assert_eq!(errors.len(), 1);
        let (file, line, _) = &errors[0].position;
        assert_eq!(file, "test.pln");
        assert_eq!(*line, 1);
    }

    #[test]
    fn parses_control_flow_statements() {
        let program = parse(
            "local function f(n: integer): integer
                local acc = 0
                for i = 1, n do
                    acc = acc + i
                end
                while acc > 100 do
                    acc = acc - 1
                end
                if acc == 0 then
                    return 0
                elseif acc < 10 then
                    return 1
                else
                    return acc
                end
            end",
        );
        let TopLevel::Func(func) = &program.toplevels[0] else {
            panic!("expected a function");
        };
        assert_eq!(func.block.stats.len(), 4);
        let Stat::If { thens, otherwise, .. } = &func.block.stats[3] else {
            panic!("expected an if statement");
        };
        assert_eq!(thens.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn parses_records_and_imports() {
        let program = parse("record point x: float y: float end\nlocal other = import(\"other\")");
        assert!(matches!(program.toplevels[0], TopLevel::Record(_)));
        let TopLevel::Import(import) = &program.toplevels[1] else {
            panic!("expected an import");
        };
        assert_eq!(import.module, "other");
    }

    #[test]
    fn hex_literals_wrap_around() {
        let program = parse("local x = 0xFFFFFFFFFFFFFFFF");
        let TopLevel::Var(var) = &program.toplevels[0] else {
            panic!("expected a variable");
        };
        assert_eq!(var.value.kind, ExpKind::Integer(-1));
    }
}
