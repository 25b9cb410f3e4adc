//! # SymTab
//!
//! Lexically scoped mapping from names to their declarations, kept as a
//! stack of scopes.
use std::collections::HashMap;

use crate::ast::Binding;

/// Name under which the enclosing function is stored while its body is being
/// analyzed, so `return` statements can recover the declared return types.
/// The `$` keeps it from colliding with any source-level name.
pub const FUNCTION_SENTINEL: &str = "$function";

#[derive(Debug, Default)]
pub struct SymTab {
    scopes: Vec<HashMap<String, Binding>>,
}

impl SymTab {
    pub fn new() -> SymTab {
        SymTab {
            scopes: vec![HashMap::new()],
        }
    }

    /// Insert a name into the innermost scope. If the name already exists
    /// there, the previous binding is returned and kept; the caller decides
    /// whether that is an error.
    pub fn add_symbol(&mut self, name: &str, binding: Binding) -> Option<Binding> {
        let scope = self.scopes.last_mut().expect("no open scope");
        let previous = scope.get(name).copied();
        if previous.is_none() {
            scope.insert(name.to_owned(), binding);
        }
        previous
    }

    /// Look a name up across all scopes, innermost first.
    pub fn find_symbol(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Look a name up in the innermost scope only.
    pub fn find_dup(&self, name: &str) -> Option<Binding> {
        self.scopes.last().and_then(|scope| scope.get(name).copied())
    }

    /// Run `f` inside a fresh scope. The scope is popped when `f` returns,
    /// whatever it returns; phases report their errors by accumulation, so
    /// there is no early exit that could skip the pop.
    pub fn with_block<T>(&mut self, f: impl FnOnce(&mut SymTab) -> T) -> T {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DeclId;

    #[test]
    fn finds_symbols_across_scopes() {
        let mut symtab = SymTab::new();
        symtab.add_symbol("x", Binding::Decl(DeclId(0)));
        symtab.with_block(|symtab| {
            symtab.add_symbol("y", Binding::Decl(DeclId(1)));
            assert_eq!(symtab.find_symbol("x"), Some(Binding::Decl(DeclId(0))));
            assert_eq!(symtab.find_symbol("y"), Some(Binding::Decl(DeclId(1))));
        });
        assert_eq!(symtab.find_symbol("y"), None);
    }

    #[test]
    fn inner_scopes_shadow_outer_ones() {
        let mut symtab = SymTab::new();
        symtab.add_symbol("x", Binding::Decl(DeclId(0)));
        symtab.with_block(|symtab| {
            assert_eq!(symtab.add_symbol("x", Binding::Decl(DeclId(1))), None);
            assert_eq!(symtab.find_symbol("x"), Some(Binding::Decl(DeclId(1))));
        });
        assert_eq!(symtab.find_symbol("x"), Some(Binding::Decl(DeclId(0))));
    }

    #[test]
    fn duplicates_are_reported_for_the_top_scope_only() {
        let mut symtab = SymTab::new();
        assert_eq!(symtab.add_symbol("x", Binding::Decl(DeclId(0))), None);
        assert_eq!(
            symtab.add_symbol("x", Binding::Decl(DeclId(1))),
            Some(Binding::Decl(DeclId(0)))
        );
        // The first binding wins.
        assert_eq!(symtab.find_dup("x"), Some(Binding::Decl(DeclId(0))));
        symtab.with_block(|symtab| {
            assert_eq!(symtab.find_dup("x"), None);
        });
    }

    #[test]
    fn with_block_pops_even_when_nested() {
        let mut symtab = SymTab::new();
        symtab.with_block(|symtab| {
            symtab.add_symbol(FUNCTION_SENTINEL, Binding::Func(7));
            symtab.with_block(|symtab| {
                assert_eq!(
                    symtab.find_symbol(FUNCTION_SENTINEL),
                    Some(Binding::Func(7))
                );
            });
        });
        assert_eq!(symtab.find_symbol(FUNCTION_SENTINEL), None);
    }
}
