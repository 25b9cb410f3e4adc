#[macro_use]
extern crate pest_derive;

pub mod ast;
pub mod ccompiler;
pub mod checker;
pub mod coder;
pub mod diagnostics;
pub mod driver;
pub mod pretty;
pub mod scope_analysis;
pub mod symtab;
pub mod translator;
pub mod types;
