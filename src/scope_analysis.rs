//! # Scope analysis
//!
//! A single pre-order walk that binds every name occurrence to its
//! declaration, detects unknown names, and flags duplicate declarations.
//! Duplicate top-level nodes stay in the tree marked `ignore` so later
//! phases can skip them while still producing useful diagnostics.
use crate::ast::{Binding, Block, Decl, Exp, ExpKind, Position, Program, Stat, TopLevel, Var};
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::symtab::{SymTab, FUNCTION_SENTINEL};

/// Resolve all names in the program. Returns the accumulated errors; the
/// walk continues after the first one.
pub fn analyze(program: &mut Program) -> Vec<Diagnostic> {
    let mut analysis = ScopeAnalysis { errors: vec![] };
    let mut symtab = SymTab::new();

    let Program { toplevels, decls } = program;
    for (index, toplevel) in toplevels.iter_mut().enumerate() {
        match toplevel {
            TopLevel::Func(func) => {
                if symtab.find_dup(&func.name).is_some() {
                    func.ignore = true;
                    analysis.duplicate(&func.name, &func.position);
                    continue;
                }
                symtab.add_symbol(&func.name, Binding::Func(index));

                let params = func.params.clone();
                symtab.with_block(|symtab| {
                    symtab.add_symbol(FUNCTION_SENTINEL, Binding::Func(index));
                    for param in params {
                        let name = decls[param.0].name.clone();
                        if symtab.find_dup(&name).is_some() {
                            analysis.duplicate(&name, &decls[param.0].position);
                        }
                        symtab.add_symbol(&name, Binding::Decl(param));
                    }
                    analysis.visit_stats(&mut func.block.stats, decls, symtab);
                });
            }
            TopLevel::Var(var) => {
                analysis.visit_exp(&mut var.value, decls, &mut symtab);
                let name = decls[var.decl.0].name.clone();
                if symtab.find_dup(&name).is_some() {
                    var.ignore = true;
                    analysis.duplicate(&name, &var.position);
                } else {
                    symtab.add_symbol(&name, Binding::Decl(var.decl));
                }
            }
            TopLevel::Record(record) => {
                if symtab.find_dup(&record.name).is_some() {
                    record.ignore = true;
                    analysis.duplicate(&record.name, &record.position);
                } else {
                    symtab.add_symbol(&record.name, Binding::Record(index));
                }
            }
            TopLevel::Import(import) => {
                if symtab.find_dup(&import.name).is_some() {
                    import.ignore = true;
                    analysis.duplicate(&import.name, &import.position);
                } else {
                    symtab.add_symbol(&import.name, Binding::Import(index));
                }
            }
        }
    }

    analysis.errors
}

struct ScopeAnalysis {
    errors: Vec<Diagnostic>,
}

impl ScopeAnalysis {
    fn duplicate(&mut self, name: &str, position: &Position) {
        self.errors.push(Diagnostic::new(
            ErrorKind::Name,
            format!("duplicate function or variable declaration for {name}"),
            position.to_owned(),
        ));
    }

    fn visit_block(&mut self, block: &mut Block, decls: &[Decl], symtab: &mut SymTab) {
        symtab.with_block(|symtab| self.visit_stats(&mut block.stats, decls, symtab));
    }

    fn visit_stats(&mut self, stats: &mut [Stat], decls: &[Decl], symtab: &mut SymTab) {
        for stat in stats {
            self.visit_stat(stat, decls, symtab);
        }
    }

    fn visit_stat(&mut self, stat: &mut Stat, decls: &[Decl], symtab: &mut SymTab) {
        match stat {
            Stat::Block(block) => self.visit_block(block, decls, symtab),
            Stat::While { cond, block, .. } => {
                self.visit_exp(cond, decls, symtab);
                self.visit_block(block, decls, symtab);
            }
            Stat::Repeat { block, cond, .. } => {
                // The until condition can see the body's locals.
                symtab.with_block(|symtab| {
                    self.visit_stats(&mut block.stats, decls, symtab);
                    self.visit_exp(cond, decls, symtab);
                });
            }
            Stat::If {
                thens, otherwise, ..
            } => {
                for (cond, block) in thens {
                    self.visit_exp(cond, decls, symtab);
                    self.visit_block(block, decls, symtab);
                }
                if let Some(block) = otherwise {
                    self.visit_block(block, decls, symtab);
                }
            }
            Stat::For {
                decl,
                start,
                finish,
                step,
                block,
                ..
            } => {
                // The control expressions are evaluated before the loop
                // variable exists.
                self.visit_exp(start, decls, symtab);
                self.visit_exp(finish, decls, symtab);
                if let Some(step) = step {
                    self.visit_exp(step, decls, symtab);
                }
                let decl = *decl;
                symtab.with_block(|symtab| {
                    symtab.add_symbol(&decls[decl.0].name, Binding::Decl(decl));
                    self.visit_stats(&mut block.stats, decls, symtab);
                });
            }
            Stat::Assign { var, exp, .. } => {
                self.visit_var(var, decls, symtab);
                self.visit_exp(exp, decls, symtab);
            }
            Stat::Decl { decl, exp, .. } => {
                // The initializer cannot see the new variable.
                self.visit_exp(exp, decls, symtab);
                let name = decls[decl.0].name.clone();
                if symtab.find_dup(&name).is_some() {
                    self.duplicate(&name, &decls[decl.0].position);
                } else {
                    symtab.add_symbol(&name, Binding::Decl(*decl));
                }
            }
            Stat::Call { call, .. } => self.visit_exp(call, decls, symtab),
            Stat::Return { exp, func, .. } => {
                if let Some(Binding::Func(index)) = symtab.find_symbol(FUNCTION_SENTINEL) {
                    *func = Some(index);
                }
                if let Some(exp) = exp {
                    self.visit_exp(exp, decls, symtab);
                }
            }
        }
    }

    fn visit_exp(&mut self, exp: &mut Exp, decls: &[Decl], symtab: &mut SymTab) {
        match &mut exp.kind {
            ExpKind::Nil
            | ExpKind::Bool(_)
            | ExpKind::Integer(_)
            | ExpKind::Float(_)
            | ExpKind::Str(_) => {}
            ExpKind::Var(var) => self.visit_var(var, decls, symtab),
            ExpKind::Unop { exp, .. } => self.visit_exp(exp, decls, symtab),
            ExpKind::Binop { lhs, rhs, .. } => {
                self.visit_exp(lhs, decls, symtab);
                self.visit_exp(rhs, decls, symtab);
            }
            ExpKind::Call { func, args } => {
                self.visit_exp(func, decls, symtab);
                for arg in args {
                    self.visit_exp(arg, decls, symtab);
                }
            }
            ExpKind::Initlist { exps } | ExpKind::Concat { exps } => {
                for exp in exps {
                    self.visit_exp(exp, decls, symtab);
                }
            }
            ExpKind::Cast { exp, .. } => self.visit_exp(exp, decls, symtab),
        }
    }

    fn visit_var(&mut self, var: &mut Var, decls: &[Decl], symtab: &mut SymTab) {
        match var {
            Var::Name {
                name,
                position,
                binding,
            } => match symtab.find_symbol(name) {
                Some(found) => *binding = Some(found),
                None => self.errors.push(Diagnostic::new(
                    ErrorKind::Name,
                    format!("variable {name} not declared"),
                    position.to_owned(),
                )),
            },
            Var::Bracket { exp, index, .. } => {
                self.visit_exp(exp, decls, symtab);
                self.visit_exp(index, decls, symtab);
            }
            Var::Dot { exp, .. } => self.visit_exp(exp, decls, symtab),
        }
    }
}
