//! Helpers for driving the compiled `titanc` binary from integration tests.
use std::{
    error::Error,
    io,
    path::Path,
    process::{Command, Output},
    str,
};

const TITANC_PATH: &str = "./target/debug/titanc";

pub fn run_titanc(args: &[&str]) -> Result<Output, io::Error> {
    Command::new(TITANC_PATH).args(args).output()
}

/// Compile a module that is expected to be rejected, and check that the
/// diagnostics contain `needle` in the mandated `file:line:col: message`
/// shape.
pub fn check_failing_compilation(src_path: &Path, needle: &str) -> Result<(), Box<dyn Error>> {
    let output = run_titanc(&[&src_path.to_string_lossy()])?;

    assert!(
        !output.status.success(),
        "titanc should exit with a non-zero status"
    );
    let stderr = str::from_utf8(&output.stderr)?;
    assert!(
        stderr.contains(needle),
        "stderr does not mention '{needle}':\n{stderr}"
    );

    let file = src_path.to_string_lossy();
    assert!(
        stderr.lines().any(|line| {
            line.starts_with(&format!("{file}:"))
                && line.splitn(4, ':').count() == 4
        }),
        "no positioned diagnostic in stderr:\n{stderr}"
    );
    Ok(())
}

/// Run `titanc --emit-lua` on a module and hand back the written Lua.
pub fn emit_lua(src_path: &Path) -> Result<String, Box<dyn Error>> {
    let output = run_titanc(&["--emit-lua", &src_path.to_string_lossy()])?;

    let stderr = str::from_utf8(&output.stderr)?;
    assert!(
        output.status.success(),
        "titanc --emit-lua failed with status {:?}:\n{stderr}",
        output.status.code()
    );

    let lua_path = src_path.with_extension("lua");
    Ok(std::fs::read_to_string(lua_path)?)
}
