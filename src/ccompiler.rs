//! # CCompiler
//!
//! Invokes the external C toolchain for the steps after C emission. Each
//! step is one `cc` invocation; toolchain failures are surfaced verbatim.
use std::process::Command;

use log::{info, warn};

use crate::diagnostics::CompileError;

const CC: &str = "cc";

/// Where the host's headers live. The generated module includes internal VM
/// headers, so this must point at the Lua source tree, not just its
/// installed public headers.
fn lua_include_dir() -> String {
    std::env::var("TITAN_LUA_DIR").unwrap_or_else(|_| "lua/src".to_owned())
}

/// Compile the generated C to assembly.
pub fn compile_c_to_s(input: &str, output: &str) -> Result<(), CompileError> {
    let mut command = Command::new(CC);
    command.args([
        "-std=c99",
        "-fPIC",
        "-I",
        &lua_include_dir(),
        "-S",
        "-o",
        output,
        input,
    ]);
    run(command)
}

/// Assemble to an object file.
pub fn compile_s_to_o(input: &str, output: &str) -> Result<(), CompileError> {
    let mut command = Command::new(CC);
    command.args(["-c", "-fPIC", "-o", output, input]);
    run(command)
}

/// Link the object file into a shared object the interpreter can require.
pub fn compile_o_to_so(input: &str, output: &str) -> Result<(), CompileError> {
    let mut command = Command::new(CC);

    #[cfg(target_os = "macos")]
    command.args(["-bundle", "-undefined", "dynamic_lookup", "-o", output, input]);

    #[cfg(not(target_os = "macos"))]
    command.args(["-shared", "-fPIC", "-o", output, input]);

    run(command)
}

fn run(mut command: Command) -> Result<(), CompileError> {
    info!("running {command:?}");
    let output = command.output()?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(CompileError::Toolchain(stderr.into_owned()));
    }
    if !stderr.is_empty() {
        warn!("{stderr}");
    }
    Ok(())
}
