//! # Checker
//!
//! Type checks a scope-analyzed program and annotates every expression and
//! declaration with its elaborated type.
//!
//! Checking runs in two passes. The collect pass computes the declared type
//! of every top-level function and annotated variable, so bodies can call
//! any function that is in scope. The check pass then walks bodies and
//! initializers. The checker never stops at the first error: failed
//! expressions get a recovery type and are marked poisoned, which keeps
//! later checks running while suppressing secondary diagnostics that would
//! only repeat the first mistake.
use std::collections::HashMap;

use crate::ast::{
    Binding, Block, Decl, Exp, ExpKind, Position, Program, Stat, TopLevel, TypeAnnotation, Unop,
    Var,
};
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::types::Type;

#[derive(Debug, Clone)]
struct FuncSig {
    params: Vec<Type>,
    returns: Vec<Type>,
    /// The single return type used for checking; `nil` when the function
    /// declares no return.
    ret: Type,
}

struct Env<'a> {
    sigs: &'a [Option<FuncSig>],
    rec_fields: &'a [Option<Vec<(String, Type)>>],
    typenames: &'a HashMap<String, usize>,
}

/// Check the whole program. Returns the accumulated errors; on an empty
/// result every expression and declaration carries its type.
pub fn check(program: &mut Program) -> Vec<Diagnostic> {
    let mut checker = Checker { errors: vec![] };

    // Records introduce nominal types in the top-level scope, usable by any
    // annotation in the module.
    let mut typenames = HashMap::new();
    for (index, toplevel) in program.toplevels.iter().enumerate() {
        if let TopLevel::Record(record) = toplevel {
            if !record.ignore {
                typenames.insert(record.name.clone(), index);
            }
        }
    }

    let count = program.toplevels.len();
    let mut sigs: Vec<Option<FuncSig>> = vec![None; count];
    let mut rec_fields: Vec<Option<Vec<(String, Type)>>> = vec![None; count];

    // Collect pass: declared types only, no expression is checked yet.
    {
        let Program { toplevels, decls } = &mut *program;
        for (index, toplevel) in toplevels.iter_mut().enumerate() {
            if toplevel.ignore() {
                continue;
            }
            match toplevel {
                TopLevel::Func(func) => {
                    let mut params = vec![];
                    for &param in &func.params {
                        let ann = decls[param.0]
                            .type_ann
                            .clone()
                            .expect("parameter without a type annotation");
                        let ty = checker.type_from_ann(&ann, &typenames);
                        decls[param.0].ty = Some(ty.clone());
                        params.push(ty);
                    }
                    let mut returns = vec![];
                    for ann in &func.return_types {
                        returns.push(checker.type_from_ann(ann, &typenames));
                    }
                    if returns.len() > 1 {
                        checker.error(
                            ErrorKind::NotImplemented,
                            "functions with multiple return values are not implemented",
                            &func.position,
                        );
                    }
                    let ret = returns.first().cloned().unwrap_or(Type::Nil);
                    func.ty = Some(Type::Function {
                        params: params.clone(),
                        returns: returns.clone(),
                    });
                    sigs[index] = Some(FuncSig {
                        params,
                        returns,
                        ret,
                    });
                }
                TopLevel::Var(var) => {
                    if let Some(ann) = decls[var.decl.0].type_ann.clone() {
                        let ty = checker.type_from_ann(&ann, &typenames);
                        decls[var.decl.0].ty = Some(ty);
                    }
                }
                TopLevel::Record(record) => {
                    let fields = record
                        .fields
                        .iter()
                        .map(|(name, ann)| (name.clone(), checker.type_from_ann(ann, &typenames)))
                        .collect();
                    rec_fields[index] = Some(fields);
                }
                TopLevel::Import(import) => {
                    checker.error(
                        ErrorKind::NotImplemented,
                        "importing modules is not implemented",
                        &import.position,
                    );
                }
            }
        }
    }

    // Check pass: bodies and initializers.
    {
        let env = Env {
            sigs: &sigs,
            rec_fields: &rec_fields,
            typenames: &typenames,
        };
        let Program { toplevels, decls } = &mut *program;
        for (index, toplevel) in toplevels.iter_mut().enumerate() {
            if toplevel.ignore() {
                continue;
            }
            match toplevel {
                TopLevel::Func(func) => {
                    let definitely_returns = checker.check_block(&mut func.block, decls, &env);
                    let sig = sigs_entry(&env, index);
                    if sig.ret != Type::Nil && !definitely_returns {
                        checker.error(
                            ErrorKind::Type,
                            "function can return nil but return type is not nil",
                            &func.position,
                        );
                    }
                }
                TopLevel::Var(var) => {
                    let expected = decls[var.decl.0].ty.clone();
                    checker.check_exp(&mut var.value, decls, &env, expected.as_ref());
                    if decls[var.decl.0].ty.is_none() {
                        decls[var.decl.0].ty = var.value.ty.clone();
                    }
                }
                TopLevel::Record(_) | TopLevel::Import(_) => {}
            }
        }
    }

    checker.errors
}

fn sigs_entry<'a>(env: &'a Env, index: usize) -> &'a FuncSig {
    env.sigs[index]
        .as_ref()
        .expect("function signature missing after the collect pass")
}

struct Checker {
    errors: Vec<Diagnostic>,
}

impl Checker {
    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, position: &Position) {
        self.errors
            .push(Diagnostic::new(kind, message, position.to_owned()));
    }

    fn type_from_ann(
        &mut self,
        ann: &TypeAnnotation,
        typenames: &HashMap<String, usize>,
    ) -> Type {
        match ann {
            TypeAnnotation::Name { name, position } => match name.as_str() {
                "nil" => Type::Nil,
                "boolean" => Type::Boolean,
                "integer" => Type::Integer,
                "float" => Type::Float,
                "string" => Type::String,
                other => match typenames.get(other) {
                    Some(&id) => Type::Record {
                        id,
                        name: other.to_owned(),
                    },
                    None => {
                        self.error(
                            ErrorKind::Type,
                            format!("unknown type '{other}'"),
                            position,
                        );
                        Type::Integer
                    }
                },
            },
            TypeAnnotation::Array { elem, .. } => {
                Type::array(self.type_from_ann(elem, typenames))
            }
            TypeAnnotation::Function {
                params, returns, ..
            } => Type::Function {
                params: params
                    .iter()
                    .map(|t| self.type_from_ann(t, typenames))
                    .collect(),
                returns: returns
                    .iter()
                    .map(|t| self.type_from_ann(t, typenames))
                    .collect(),
            },
        }
    }

    fn check_block(&mut self, block: &mut Block, decls: &mut [Decl], env: &Env) -> bool {
        let mut returns = false;
        for stat in &mut block.stats {
            returns |= self.check_stat(stat, decls, env);
        }
        returns
    }

    /// Check one statement. The result says whether the statement definitely
    /// returns on every path through it.
    fn check_stat(&mut self, stat: &mut Stat, decls: &mut [Decl], env: &Env) -> bool {
        match stat {
            Stat::Block(block) => self.check_block(block, decls, env),
            Stat::While { cond, block, .. } => {
                self.check_exp(cond, decls, env, None);
                self.check_block(block, decls, env);
                // The body may never run.
                false
            }
            Stat::Repeat { block, cond, .. } => {
                self.check_block(block, decls, env);
                self.check_exp(cond, decls, env, None);
                false
            }
            Stat::If {
                thens, otherwise, ..
            } => {
                let mut all_return = true;
                for (cond, block) in thens {
                    self.check_exp(cond, decls, env, None);
                    all_return &= self.check_block(block, decls, env);
                }
                match otherwise {
                    Some(block) => all_return &= self.check_block(block, decls, env),
                    None => all_return = false,
                }
                all_return
            }
            Stat::For {
                decl,
                start,
                finish,
                step,
                block,
                ..
            } => {
                let ann = decls[decl.0].type_ann.clone();
                let mut loop_ty = match ann {
                    Some(ann) => {
                        let ty = self.type_from_ann(&ann, env.typenames);
                        self.check_exp(start, decls, env, Some(&ty));
                        ty
                    }
                    None => {
                        self.check_exp(start, decls, env, None);
                        start.typ().clone()
                    }
                };
                if !loop_ty.is_numeric() {
                    if !start.poisoned {
                        self.error(
                            ErrorKind::Type,
                            format!(
                                "wrong type for 'for' control variable, expected a number but found {loop_ty}"
                            ),
                            &decls[decl.0].position.clone(),
                        );
                    }
                    loop_ty = Type::Integer;
                }
                decls[decl.0].ty = Some(loop_ty.clone());
                self.check_exp(finish, decls, env, Some(&loop_ty));
                if let Some(step) = step {
                    self.check_exp(step, decls, env, Some(&loop_ty));
                }
                self.check_block(block, decls, env);
                false
            }
            Stat::Assign { var, exp, .. } => {
                if let Var::Name {
                    name,
                    position,
                    binding: Some(Binding::Func(_)),
                } = var
                {
                    let message = format!("cannot assign to function {name}");
                    self.error(ErrorKind::Type, message, &position.clone());
                    self.check_exp(exp, decls, env, None);
                } else {
                    let (ty, poisoned) = self.check_var(var, decls, env);
                    let expected = if poisoned { None } else { Some(ty) };
                    self.check_exp(exp, decls, env, expected.as_ref());
                }
                false
            }
            Stat::Decl { decl, exp, .. } => {
                let ann = decls[decl.0].type_ann.clone();
                match ann {
                    Some(ann) => {
                        let ty = self.type_from_ann(&ann, env.typenames);
                        decls[decl.0].ty = Some(ty.clone());
                        self.check_exp(exp, decls, env, Some(&ty));
                    }
                    None => {
                        self.check_exp(exp, decls, env, None);
                        decls[decl.0].ty = Some(exp.typ().clone());
                    }
                }
                false
            }
            Stat::Call { call, .. } => {
                self.check_exp(call, decls, env, None);
                false
            }
            Stat::Return {
                exp,
                position,
                func,
            } => {
                let ret = func
                    .and_then(|index| env.sigs[index].as_ref())
                    .map(|sig| sig.ret.clone())
                    .unwrap_or(Type::Nil);
                match exp {
                    Some(exp) => self.check_exp(exp, decls, env, Some(&ret)),
                    None => {
                        if ret != Type::Nil {
                            self.error(
                                ErrorKind::Type,
                                format!("expected {ret} but found nil"),
                                &position.clone(),
                            );
                        }
                    }
                }
                true
            }
        }
    }

    /// Check one expression and annotate it with its type. When the caller
    /// provides an expected type, the expression is coerced against it: a
    /// literal may coalesce (an empty array initializer takes the context's
    /// element type), an integer may be cast to a float, and anything else
    /// that does not match is an error.
    fn check_exp(&mut self, exp: &mut Exp, decls: &[Decl], env: &Env, expected: Option<&Type>) {
        let position = exp.position.clone();
        let (ty, poisoned) = match &mut exp.kind {
            ExpKind::Nil => (Type::Nil, false),
            ExpKind::Bool(_) => (Type::Boolean, false),
            ExpKind::Integer(_) => (Type::Integer, false),
            ExpKind::Float(_) => (Type::Float, false),
            ExpKind::Str(_) => (Type::String, false),
            ExpKind::Var(var) => self.check_var(var, decls, env),
            ExpKind::Unop { op, exp: operand } => {
                self.check_exp(operand, decls, env, None);
                let operand_ty = operand.typ().clone();
                match op {
                    Unop::Not => (Type::Boolean, false),
                    Unop::Neg => {
                        if operand_ty.is_numeric() {
                            let poisoned = operand.poisoned;
                            (operand_ty, poisoned)
                        } else {
                            if !operand.poisoned {
                                self.error(
                                    ErrorKind::Type,
                                    format!(
                                        "wrong type for unary operator '{op}', expected a number but found {operand_ty}"
                                    ),
                                    &operand.position,
                                );
                            }
                            (Type::Integer, true)
                        }
                    }
                    Unop::Len => {
                        if matches!(operand_ty, Type::Array(_)) {
                            (Type::Integer, false)
                        } else {
                            if !operand.poisoned {
                                self.error(
                                    ErrorKind::Type,
                                    format!(
                                        "wrong type for unary operator '{op}', expected an array but found {operand_ty}"
                                    ),
                                    &operand.position,
                                );
                            }
                            (Type::Integer, true)
                        }
                    }
                    Unop::BNot => {
                        if operand_ty == Type::Integer {
                            (Type::Integer, false)
                        } else {
                            if !operand.poisoned {
                                self.error(
                                    ErrorKind::Type,
                                    format!(
                                        "wrong type for unary operator '{op}', expected an integer but found {operand_ty}"
                                    ),
                                    &operand.position,
                                );
                            }
                            (Type::Integer, true)
                        }
                    }
                }
            }
            ExpKind::Binop { op, lhs, rhs } => {
                self.check_exp(lhs, decls, env, None);
                self.check_exp(rhs, decls, env, None);
                let op = *op;
                self.check_binop(op, lhs, rhs, &position)
            }
            ExpKind::Call { func, args } => {
                if let ExpKind::Var(Var::Name {
                    binding: Some(Binding::Func(index)),
                    name,
                    ..
                }) = &func.kind
                {
                    let index = *index;
                    let name = name.clone();
                    let sig = sigs_entry(env, index).clone();
                    func.ty = Some(Type::Function {
                        params: sig.params.clone(),
                        returns: sig.returns.clone(),
                    });
                    func.poisoned = false;
                    if args.len() != sig.params.len() {
                        self.error(
                            ErrorKind::Type,
                            format!(
                                "function {name} called with {} arguments but expects {}",
                                args.len(),
                                sig.params.len()
                            ),
                            &position,
                        );
                    }
                    for (i, arg) in args.iter_mut().enumerate() {
                        let expected = sig.params.get(i).cloned();
                        self.check_exp(arg, decls, env, expected.as_ref());
                    }
                    (sig.ret, false)
                } else {
                    self.check_exp(func, decls, env, None);
                    for arg in args.iter_mut() {
                        self.check_exp(arg, decls, env, None);
                    }
                    if !func.poisoned {
                        self.error(
                            ErrorKind::NotImplemented,
                            "calling first-class functions is not implemented",
                            &position,
                        );
                    }
                    (Type::Integer, true)
                }
            }
            ExpKind::Initlist { exps } => match expected {
                Some(Type::Array(elem)) => {
                    let elem = (**elem).clone();
                    for exp in exps.iter_mut() {
                        self.check_exp(exp, decls, env, Some(&elem));
                    }
                    (Type::array(elem), false)
                }
                _ => {
                    if exps.is_empty() {
                        self.error(
                            ErrorKind::Type,
                            "empty array initializer needs a type annotation",
                            &position,
                        );
                        (Type::array(Type::Integer), true)
                    } else {
                        let mut iter = exps.iter_mut();
                        let first = iter.next().expect("initializer cannot be empty here");
                        self.check_exp(first, decls, env, None);
                        let elem = first.typ().clone();
                        let poisoned = first.poisoned;
                        for exp in iter {
                            self.check_exp(exp, decls, env, Some(&elem));
                        }
                        (Type::array(elem), poisoned)
                    }
                }
            },
            ExpKind::Concat { exps } => {
                let mut saw_string = false;
                let mut saw_poisoned = false;
                for operand in exps.iter_mut() {
                    self.check_exp(operand, decls, env, None);
                    let ty = operand.typ().clone();
                    saw_poisoned |= operand.poisoned;
                    match ty {
                        Type::String => saw_string = true,
                        Type::Integer | Type::Float => {}
                        other => {
                            if !operand.poisoned {
                                self.error(
                                    ErrorKind::Type,
                                    format!(
                                        "wrong type for concatenation, expected a string or a number but found {other}"
                                    ),
                                    &operand.position,
                                );
                            }
                        }
                    }
                }
                if !saw_string && !saw_poisoned {
                    self.error(
                        ErrorKind::Type,
                        "concatenation needs at least one string operand",
                        &position,
                    );
                }
                (Type::String, false)
            }
            ExpKind::Cast { exp: inner, target } => {
                self.check_exp(inner, decls, env, None);
                let from = inner.typ().clone();
                let target = target.clone();
                if from == target || (from == Type::Integer && target == Type::Float) {
                    // fine
                } else if from == Type::Float && target == Type::Integer {
                    self.error(
                        ErrorKind::NotImplemented,
                        "conversion from float to integer is not implemented",
                        &position,
                    );
                } else if !inner.poisoned {
                    self.error(
                        ErrorKind::Type,
                        format!("cannot convert {from} to {target}"),
                        &position,
                    );
                }
                (target, false)
            }
        };
        exp.ty = Some(ty);
        exp.poisoned = poisoned;

        if let Some(expected) = expected {
            self.coerce(exp, expected);
        }
    }

    fn check_binop(
        &mut self,
        op: crate::ast::Binop,
        lhs: &mut Exp,
        rhs: &mut Exp,
        position: &Position,
    ) -> (Type, bool) {
        use crate::ast::Binop;

        let l = lhs.typ().clone();
        let r = rhs.typ().clone();
        match op {
            // Logical operators follow the host and accept anything; the
            // checker gives them a boolean result.
            Binop::And | Binop::Or => (Type::Boolean, false),
            Binop::Eq | Binop::Ne => {
                if l != r && !lhs.poisoned && !rhs.poisoned {
                    self.error(
                        ErrorKind::Type,
                        format!("cannot compare values of type {l} and {r}"),
                        position,
                    );
                }
                (Type::Boolean, false)
            }
            Binop::Lt | Binop::Gt | Binop::Le | Binop::Ge => {
                let comparable = (l.is_numeric() && r.is_numeric())
                    || (l == Type::String && r == Type::String);
                if !comparable && !lhs.poisoned && !rhs.poisoned {
                    self.error(
                        ErrorKind::Type,
                        format!(
                            "wrong types for operator '{op}', expected numbers or strings but found {l} and {r}"
                        ),
                        position,
                    );
                }
                (Type::Boolean, false)
            }
            Binop::Add | Binop::Sub | Binop::Mul => {
                let mut failed = false;
                for operand in [&mut *lhs, &mut *rhs] {
                    if !operand.typ().is_numeric() {
                        if !operand.poisoned {
                            let found = operand.typ().clone();
                            self.error(
                                ErrorKind::Type,
                                format!(
                                    "wrong type for operator '{op}', expected a number but found {found}"
                                ),
                                &operand.position,
                            );
                        }
                        failed = true;
                    }
                }
                if failed {
                    return (Type::Integer, true);
                }
                let poisoned = lhs.poisoned || rhs.poisoned;
                if l == Type::Float || r == Type::Float {
                    self.coerce(lhs, &Type::Float);
                    self.coerce(rhs, &Type::Float);
                    (Type::Float, poisoned)
                } else {
                    (Type::Integer, poisoned)
                }
            }
            Binop::Div | Binop::Pow => {
                let mut failed = false;
                for operand in [&mut *lhs, &mut *rhs] {
                    if !operand.typ().is_numeric() {
                        if !operand.poisoned {
                            let found = operand.typ().clone();
                            self.error(
                                ErrorKind::Type,
                                format!(
                                    "wrong type for operator '{op}', expected a number but found {found}"
                                ),
                                &operand.position,
                            );
                        }
                        failed = true;
                    }
                }
                if failed {
                    return (Type::Float, true);
                }
                self.coerce(lhs, &Type::Float);
                self.coerce(rhs, &Type::Float);
                (Type::Float, lhs.poisoned || rhs.poisoned)
            }
            Binop::IntDiv
            | Binop::Mod
            | Binop::BAnd
            | Binop::BOr
            | Binop::BXor
            | Binop::Shl
            | Binop::Shr => {
                let mut failed = false;
                for operand in [&mut *lhs, &mut *rhs] {
                    if *operand.typ() != Type::Integer {
                        if !operand.poisoned {
                            let found = operand.typ().clone();
                            self.error(
                                ErrorKind::Type,
                                format!(
                                    "wrong type for operator '{op}', expected an integer but found {found}"
                                ),
                                &operand.position,
                            );
                        }
                        failed = true;
                    }
                }
                if failed {
                    (Type::Integer, true)
                } else {
                    (Type::Integer, lhs.poisoned || rhs.poisoned)
                }
            }
        }
    }

    fn check_var(&mut self, var: &mut Var, decls: &[Decl], env: &Env) -> (Type, bool) {
        match var {
            Var::Name {
                name,
                position,
                binding,
            } => match binding {
                Some(Binding::Decl(id)) => match decls[id.0].ty.clone() {
                    Some(ty) => (ty, false),
                    None => (Type::Integer, true),
                },
                Some(Binding::Func(index)) => {
                    let sig = sigs_entry(env, *index);
                    (
                        Type::Function {
                            params: sig.params.clone(),
                            returns: sig.returns.clone(),
                        },
                        false,
                    )
                }
                Some(Binding::Record(_)) => {
                    let message = format!("'{name}' is a type, not a value");
                    self.error(ErrorKind::Type, message, &position.clone());
                    (Type::Integer, true)
                }
                Some(Binding::Import(_)) => {
                    let message = format!("imported name '{name}' is not implemented");
                    self.error(ErrorKind::NotImplemented, message, &position.clone());
                    (Type::Integer, true)
                }
                // Already reported by scope analysis; keep checking with a
                // recovery type.
                None => (Type::Integer, true),
            },
            Var::Bracket { exp, index, .. } => {
                self.check_exp(exp, decls, env, None);
                self.check_exp(index, decls, env, Some(&Type::Integer));
                match exp.typ().clone() {
                    Type::Array(elem) => (*elem, false),
                    other => {
                        if !exp.poisoned {
                            self.error(
                                ErrorKind::Type,
                                format!(
                                    "wrong type for indexing, expected an array but found {other}"
                                ),
                                &exp.position,
                            );
                        }
                        (Type::Integer, true)
                    }
                }
            }
            Var::Dot {
                exp,
                field,
                position,
            } => {
                self.check_exp(exp, decls, env, None);
                match exp.typ().clone() {
                    Type::Record { id, name } => {
                        let fields = env.rec_fields[id]
                            .as_ref()
                            .expect("record fields missing after the collect pass");
                        match fields.iter().find(|(f, _)| f == field) {
                            Some((_, ty)) => (ty.clone(), false),
                            None => {
                                let message =
                                    format!("record '{name}' has no field '{field}'");
                                self.error(ErrorKind::Type, message, &position.clone());
                                (Type::Integer, true)
                            }
                        }
                    }
                    other => {
                        if !exp.poisoned {
                            self.error(
                                ErrorKind::Type,
                                format!(
                                    "wrong type for field access, expected a record but found {other}"
                                ),
                                &exp.position,
                            );
                        }
                        (Type::Integer, true)
                    }
                }
            }
        }
    }

    /// Match an expression against the type its context expects, inserting
    /// an integer-to-float cast when that makes the types line up.
    fn coerce(&mut self, exp: &mut Exp, expected: &Type) {
        let actual = exp.typ().clone();
        if actual == *expected {
            return;
        }
        if actual == Type::Integer && *expected == Type::Float {
            insert_cast(exp, Type::Float);
            return;
        }
        if exp.poisoned {
            return;
        }
        let position = exp.position.clone();
        self.error(
            ErrorKind::Type,
            format!("expected {expected} but found {actual}"),
            &position,
        );
        exp.poisoned = true;
    }
}

/// Wrap an expression into an explicit cast node.
fn insert_cast(exp: &mut Exp, target: Type) {
    let position = exp.position.clone();
    let inner = std::mem::replace(exp, Exp::new(ExpKind::Nil, position.clone()));
    *exp = Exp {
        kind: ExpKind::Cast {
            exp: Box::new(inner),
            target: target.clone(),
        },
        position,
        ty: Some(target),
        poisoned: false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_program;
    use crate::scope_analysis;

    fn checked(source: &str) -> (Program, Vec<Diagnostic>) {
        let mut program = parse_program("test.pln", source).expect("program should parse");
        let scope_errors = scope_analysis::analyze(&mut program);
        assert!(scope_errors.is_empty(), "scope errors: {scope_errors:?}");
        let errors = check(&mut program);
        (program, errors)
    }

    fn func(program: &Program, index: usize) -> &crate::ast::FuncDecl {
        match &program.toplevels[index] {
            TopLevel::Func(func) => func,
            other => panic!("expected a function, got {other:?}"),
        }
    }

    fn assert_fully_annotated(exp: &Exp) {
        assert!(exp.ty.is_some(), "missing type at {:?}", exp.position);
        match &exp.kind {
            ExpKind::Unop { exp, .. } => assert_fully_annotated(exp),
            ExpKind::Binop { lhs, rhs, .. } => {
                assert_fully_annotated(lhs);
                assert_fully_annotated(rhs);
            }
            ExpKind::Call { func, args } => {
                assert_fully_annotated(func);
                args.iter().for_each(assert_fully_annotated);
            }
            ExpKind::Initlist { exps } | ExpKind::Concat { exps } => {
                exps.iter().for_each(assert_fully_annotated);
            }
            ExpKind::Cast { exp, .. } => assert_fully_annotated(exp),
            ExpKind::Var(Var::Bracket { exp, index, .. }) => {
                assert_fully_annotated(exp);
                assert_fully_annotated(index);
            }
            ExpKind::Var(Var::Dot { exp, .. }) => assert_fully_annotated(exp),
            _ => {}
        }
    }

    #[test]
    fn mixed_arithmetic_is_float() {
        let (program, errors) = checked("local function f(): float return 1 + 2.0 end");
        assert!(errors.is_empty(), "{errors:?}");
        let func = func(&program, 0);
        let Stat::Return { exp: Some(exp), .. } = &func.block.stats[0] else {
            panic!("expected a return");
        };
        assert_eq!(exp.typ(), &Type::Float);
        // The integer side was wrapped into an explicit cast.
        let ExpKind::Binop { lhs, .. } = &exp.kind else {
            panic!("expected an addition");
        };
        assert!(matches!(lhs.kind, ExpKind::Cast { .. }));
    }

    #[test]
    fn integer_return_of_a_float_is_rejected() {
        let (_, errors) = checked("local function g(): integer return 1 + 2.0 end");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("integer"), "{}", errors[0].message);
        assert!(errors[0].message.contains("float"), "{}", errors[0].message);
    }

    #[test]
    fn division_always_yields_float() {
        let (program, errors) = checked("local function f(): float return 1 / 2 end");
        assert!(errors.is_empty(), "{errors:?}");
        let func = func(&program, 0);
        let Stat::Return { exp: Some(exp), .. } = &func.block.stats[0] else {
            panic!("expected a return");
        };
        assert_eq!(exp.typ(), &Type::Float);
    }

    #[test]
    fn bitwise_operators_require_integers() {
        let (_, errors) = checked("local function f(): integer return 1 % 2.0 end");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'%'"), "{}", errors[0].message);
    }

    #[test]
    fn missing_return_is_rejected() {
        let (_, errors) = checked("local function h(): integer end");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "function can return nil but return type is not nil"
        );
    }

    #[test]
    fn returns_on_both_branches_satisfy_the_checker() {
        let (_, errors) = checked(
            "local function sign(x: integer): integer
                if x < 0 then
                    return -1
                else
                    return 1
                end
            end",
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn a_loop_does_not_count_as_returning() {
        let (_, errors) = checked(
            "local function f(): integer
                while true do
                    return 1
                end
            end",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "function can return nil but return type is not nil"
        );
    }

    #[test]
    fn call_arity_is_checked() {
        let (_, errors) = checked(
            "local function add(x: integer, y: integer): integer return x + y end
             local function f(): integer return add(1) end",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "function add called with 1 arguments but expects 2"
        );
    }

    #[test]
    fn call_argument_types_are_checked() {
        let (_, errors) = checked(
            "local function add(x: integer, y: integer): integer return x + y end
             local function f(): integer return add(1, true) end",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("boolean"), "{}", errors[0].message);
    }

    #[test]
    fn indirect_calls_are_not_implemented() {
        let (_, errors) = checked(
            "local function f() end
             local function g()
                local h = f
                h()
             end",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::NotImplemented);
    }

    #[test]
    fn indexing_requires_an_array_and_an_integer() {
        let (_, errors) = checked(
            "local function f(xs: {integer}): integer
                return xs[1.5]
            end",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("integer"), "{}", errors[0].message);
    }

    #[test]
    fn empty_initializers_need_context() {
        let (_, errors) = checked("local function f() local xs = {} end");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "empty array initializer needs a type annotation"
        );

        let (_, errors) = checked("local function f() local xs: {integer} = {} end");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn initializer_elements_follow_the_context() {
        let (_, errors) = checked("local function f() local xs: {float} = {1, 2.0} end");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn record_fields_are_typed() {
        let (_, errors) = checked(
            "record point x: float y: float end
             local function getx(p: point): float
                return p.x
             end",
        );
        assert!(errors.is_empty(), "{errors:?}");

        let (_, errors) = checked(
            "record point x: float y: float end
             local function getz(p: point): float
                return p.z
             end",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "record 'point' has no field 'z'");
    }

    #[test]
    fn unknown_types_are_reported() {
        let (_, errors) = checked("local function f(x: number) end");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unknown type 'number'");
    }

    #[test]
    fn recovery_types_suppress_secondary_errors() {
        // `y` is undeclared: scope analysis reports it, and the checker must
        // not add a second complaint about `y + 1`.
        let mut program = parse_program("test.pln", "local function f(): integer return y + 1 end")
            .expect("program should parse");
        let scope_errors = scope_analysis::analyze(&mut program);
        assert_eq!(scope_errors.len(), 1);
        let errors = check(&mut program);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn every_expression_is_annotated() {
        let (program, errors) = checked(
            "local function fact(n: integer): integer
                local acc = 1
                for i = 1, n do
                    acc = acc * i
                end
                return acc
            end
             local limit: integer = fact(5)",
        );
        assert!(errors.is_empty(), "{errors:?}");
        for toplevel in &program.toplevels {
            match toplevel {
                TopLevel::Func(func) => {
                    assert!(func.ty.is_some());
                    for stat in &func.block.stats {
                        if let Stat::Return { exp: Some(exp), .. } = stat {
                            assert_fully_annotated(exp);
                        }
                    }
                }
                TopLevel::Var(var) => assert_fully_annotated(&var.value),
                _ => {}
            }
        }
        for decl in &program.decls {
            assert!(decl.ty.is_some(), "missing type on {decl:?}");
        }
    }

    #[test]
    fn checking_is_idempotent() {
        let source = "local function mean(a: float, b: float): float
                return (a + b) / 2
            end";
        let mut program = parse_program("test.pln", source).expect("program should parse");
        assert!(scope_analysis::analyze(&mut program).is_empty());
        assert!(check(&mut program).is_empty());
        let first = program.clone();
        let errors = check(&mut program);
        assert!(errors.is_empty(), "rerun produced errors: {errors:?}");
        assert_eq!(program, first);
    }

    #[test]
    fn imports_are_not_implemented() {
        let mut program = parse_program("test.pln", "local other = import(\"other\")")
            .expect("program should parse");
        assert!(scope_analysis::analyze(&mut program).is_empty());
        let errors = check(&mut program);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::NotImplemented);
    }
}
