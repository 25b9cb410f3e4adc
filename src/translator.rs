//! # Translator
//!
//! Turns a Titan module back into plain Lua by erasing the type annotations
//! from the source text, using the byte spans the parser recorded. The
//! result runs under the stock interpreter, which is handy as a fallback and
//! for differential testing against the compiled module.
use crate::ast::{parse_program, Span, TopLevel};
use crate::diagnostics::{Diagnostic, ErrorKind};

/// Produce the Lua rendition of a module.
pub fn emit_lua(file: &str, source: &str) -> Result<String, Vec<Diagnostic>> {
    let program = parse_program(file, source)?;

    let mut errors = vec![];
    let mut spans: Vec<Span> = vec![];
    for toplevel in &program.toplevels {
        match toplevel {
            TopLevel::Func(func) => {
                if let Some(span) = func.ret_span {
                    spans.push(span);
                }
            }
            TopLevel::Var(_) => {}
            TopLevel::Record(record) => errors.push(Diagnostic::new(
                ErrorKind::NotImplemented,
                "record declarations cannot be translated to Lua",
                record.position.to_owned(),
            )),
            TopLevel::Import(import) => errors.push(Diagnostic::new(
                ErrorKind::NotImplemented,
                "imports cannot be translated to Lua",
                import.position.to_owned(),
            )),
        }
    }
    for decl in &program.decls {
        if let Some(span) = decl.ann_span {
            spans.push(span);
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    spans.sort();
    let mut out = String::with_capacity(source.len());
    let mut from = 0;
    for (start, end) in spans {
        out.push_str(&source[from..start]);
        from = end;
    }
    out.push_str(&source[from..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_and_return_annotations_are_erased() {
        let source = "local function add(x: integer, y: integer): integer\n    return x + y\nend\n";
        let lua = emit_lua("test.pln", source).expect("translation should succeed");
        assert_eq!(
            lua,
            "local function add(x, y)\n    return x + y\nend\n"
        );
    }

    #[test]
    fn declaration_annotations_are_erased() {
        let source = "local function f()\n    local xs: {integer} = {1}\n    for i: integer = 1, 2 do\n    end\nend\n";
        let lua = emit_lua("test.pln", source).expect("translation should succeed");
        assert_eq!(
            lua,
            "local function f()\n    local xs = {1}\n    for i = 1, 2 do\n    end\nend\n"
        );
    }

    #[test]
    fn unannotated_source_is_untouched() {
        let source = "local x = 1\n";
        let lua = emit_lua("test.pln", source).expect("translation should succeed");
        assert_eq!(lua, source);
    }

    #[test]
    fn records_cannot_be_translated() {
        let errors = emit_lua("test.pln", "record point x: float end")
            .expect_err("records have no Lua rendition");
        assert_eq!(errors[0].kind, ErrorKind::NotImplemented);
    }
}
