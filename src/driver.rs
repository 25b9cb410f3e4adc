//! # Driver
//!
//! Sequences the compilation pipeline over the fixed chain of file
//! extensions `pln → c → s → o → so`, manages the intermediate artifacts and
//! routes diagnostics. Whatever happens, only the original input and (on
//! success) the requested output survive; everything in between is removed
//! so a failed compile cannot leave stale intermediates behind.
use std::fs;

use log::info;

use crate::diagnostics::{sort_by_position, CompileError};
use crate::{ast, ccompiler, checker, coder, pretty, scope_analysis, translator};

/// The pipeline steps, in order.
pub const STEPS: [&str; 5] = ["pln", "c", "s", "o", "so"];

fn step_index(argv0: &str, ext: &str) -> Result<usize, CompileError> {
    STEPS
        .iter()
        .position(|step| *step == ext)
        .ok_or_else(|| CompileError::Usage(format!("{argv0}: unknown file extension '{ext}'")))
}

/// Run the pipeline from `input_ext` to `output_ext` on `input_file`.
///
/// The input filename must end in `.<input_ext>` and its stem may only
/// contain letters, digits, underscores and slashes; the module name is the
/// stem with slashes replaced by underscores.
pub fn compile(
    argv0: &str,
    input_ext: &str,
    output_ext: &str,
    input_file: &str,
) -> Result<(), CompileError> {
    let input_index = step_index(argv0, input_ext)?;
    let output_index = step_index(argv0, output_ext)?;
    if input_index >= output_index {
        return Err(CompileError::Usage(format!(
            "{argv0}: cannot compile from '.{input_ext}' to '.{output_ext}'"
        )));
    }

    let suffix = format!(".{input_ext}");
    let base = input_file.strip_suffix(&suffix).ok_or_else(|| {
        CompileError::Usage(format!(
            "{argv0}: input file '{input_file}' does not end in '{suffix}'"
        ))
    })?;
    if base.is_empty()
        || !base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
    {
        return Err(CompileError::Usage(format!(
            "{argv0}: invalid module name '{base}'"
        )));
    }
    let modname = base.replace('/', "_");

    let result = run_steps(base, &modname, input_index, output_index);

    // Intermediates go away on every exit path, and a failed compile keeps
    // nothing but the original input.
    for ext in &STEPS[input_index + 1..output_index] {
        let _ = fs::remove_file(format!("{base}.{ext}"));
    }
    if result.is_err() {
        let _ = fs::remove_file(format!("{base}.{}", STEPS[output_index]));
    }
    result
}

fn run_steps(
    base: &str,
    modname: &str,
    input_index: usize,
    output_index: usize,
) -> Result<(), CompileError> {
    for step in input_index..output_index {
        let input = format!("{base}.{}", STEPS[step]);
        let output = format!("{base}.{}", STEPS[step + 1]);
        match (STEPS[step], STEPS[step + 1]) {
            ("pln", "c") => compile_pln_to_c(&input, &output, modname)?,
            ("c", "s") => ccompiler::compile_c_to_s(&input, &output)?,
            ("s", "o") => ccompiler::compile_s_to_o(&input, &output)?,
            ("o", "so") => ccompiler::compile_o_to_so(&input, &output)?,
            step => unreachable!("malformed step {step:?}"),
        }
    }
    Ok(())
}

/// The in-process part of the pipeline: parse, analyze, check and emit C.
/// Code generation only runs when every prior phase finished without errors.
pub fn compile_pln_to_c(input: &str, output: &str, modname: &str) -> Result<(), CompileError> {
    info!("Compiling '{input}'...");
    let source = fs::read_to_string(input)?;

    let mut program = ast::parse_program(input, &source).map_err(CompileError::Source)?;

    let mut errors = scope_analysis::analyze(&mut program);
    errors.extend(checker::check(&mut program));
    if !errors.is_empty() {
        sort_by_position(&mut errors);
        return Err(CompileError::Source(errors));
    }

    let code = coder::generate(&mut program, modname).map_err(|mut errors| {
        sort_by_position(&mut errors);
        CompileError::Source(errors)
    })?;

    info!("Writing '{output}'...");
    fs::write(output, pretty::reindent(&code))?;
    Ok(())
}

/// `--emit-lua`: write the plain Lua rendition of the module next to it.
pub fn emit_lua(argv0: &str, input_file: &str) -> Result<(), CompileError> {
    let base = input_file.strip_suffix(".pln").ok_or_else(|| {
        CompileError::Usage(format!(
            "{argv0}: input file '{input_file}' does not end in '.pln'"
        ))
    })?;

    let source = fs::read_to_string(input_file)?;
    let lua = translator::emit_lua(input_file, &source).map_err(|mut errors| {
        sort_by_position(&mut errors);
        CompileError::Source(errors)
    })?;

    let output = format!("{base}.lua");
    info!("Writing '{output}'...");
    fs::write(output, lua)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn tempdir() -> tempfile::TempDir {
        // The default prefix contains a dot, which the module name
        // validation would reject.
        tempfile::Builder::new()
            .prefix("titanc_test")
            .tempdir()
            .expect("failed to create a temporary directory")
    }

    #[test]
    fn step_ordering_is_enforced_before_any_work() {
        let err = compile("titanc", "c", "pln", "missing.c").expect_err("should be rejected");
        assert!(matches!(err, CompileError::Usage(_)), "{err:?}");
        // Rejected before touching the filesystem: the input never existed
        // and no output appeared.
        assert!(!Path::new("missing.pln").exists());
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = compile("titanc", "pln", "exe", "m.pln").expect_err("should be rejected");
        assert!(matches!(err, CompileError::Usage(_)), "{err:?}");
    }

    #[test]
    fn bad_module_names_are_rejected() {
        let err = compile("titanc", "pln", "c", "bad-name.pln").expect_err("should be rejected");
        assert!(matches!(err, CompileError::Usage(_)), "{err:?}");
        let err = compile("titanc", "pln", "c", ".pln").expect_err("should be rejected");
        assert!(matches!(err, CompileError::Usage(_)), "{err:?}");
    }

    #[test]
    fn pln_to_c_writes_the_translation_unit() {
        let dir = tempdir();
        let base = dir.path().join("m");
        let input = format!("{}.pln", base.display());
        fs::write(
            &input,
            "local function add(x: integer, y: integer): integer return x + y end",
        )
        .expect("failed to write input");

        compile("titanc", "pln", "c", &input).expect("compilation should succeed");

        let c = fs::read_to_string(format!("{}.c", base.display())).expect("missing .c output");
        // The module name comes from the full stem, slashes become
        // underscores.
        let modname = base.display().to_string().replace('/', "_");
        assert!(c.contains(&format!("int luaopen_{modname}(lua_State *L)")));
        assert!(c.contains("function_add_titan"));
    }

    #[test]
    fn source_errors_leave_only_the_input_behind() {
        let dir = tempdir();
        let base = dir.path().join("bad");
        let input = format!("{}.pln", base.display());
        fs::write(&input, "local function h(): integer end").expect("failed to write input");

        let err = compile("titanc", "pln", "so", &input).expect_err("should fail to compile");
        assert!(matches!(err, CompileError::Source(_)), "{err:?}");

        assert!(Path::new(&input).exists());
        for ext in ["c", "s", "o", "so"] {
            assert!(
                !Path::new(&format!("{}.{ext}", base.display())).exists(),
                "stale .{ext} left behind"
            );
        }
    }

    #[test]
    fn failed_toolchain_steps_clean_up_their_intermediates() {
        let dir = tempdir();
        let base = dir.path().join("m");
        let input = format!("{}.pln", base.display());
        fs::write(&input, "local x = 1").expect("failed to write input");

        // Point the toolchain at a Lua tree that does not exist: the C
        // emission succeeds but the c → s step cannot.
        std::env::set_var("TITAN_LUA_DIR", dir.path().join("no_lua").display().to_string());
        let result = compile("titanc", "pln", "so", &input);
        std::env::remove_var("TITAN_LUA_DIR");
        result.expect_err("the toolchain step should fail");

        assert!(Path::new(&input).exists());
        for ext in ["c", "s", "o", "so"] {
            assert!(
                !Path::new(&format!("{}.{ext}", base.display())).exists(),
                "stale .{ext} left behind"
            );
        }
    }

    #[test]
    fn emit_lua_writes_next_to_the_input() {
        let dir = tempdir();
        let input = dir.path().join("m.pln");
        fs::write(&input, "local function id(x: integer): integer return x end")
            .expect("failed to write input");

        emit_lua("titanc", &input.display().to_string()).expect("emit-lua should succeed");

        let lua =
            fs::read_to_string(dir.path().join("m.lua")).expect("missing .lua output");
        assert_eq!(lua, "local function id(x) return x end");
    }
}
