//! # titanc
//!
//! The Titan compiler binary. It drives the whole pipeline from a `.pln`
//! module to a shared object the interpreter can `require`, or, with
//! `--emit-lua`, to a plain Lua rendition of the module.
mod cli;

use cli::Cli;

use log::error;
use titanc::diagnostics::CompileError;
use titanc::driver;

fn main() {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into())
        .expect("failed to initialize the logger");

    let file = args.file.to_string_lossy().into_owned();
    let result = if args.emit_lua {
        driver::emit_lua("titanc", &file)
    } else {
        driver::compile("titanc", "pln", "so", &file)
    };

    if let Err(err) = result {
        match &err {
            // One positioned diagnostic per line, in source order.
            CompileError::Source(diagnostics) => {
                for diagnostic in diagnostics {
                    eprintln!("{diagnostic}");
                }
            }
            other => error!("{other}"),
        }
        std::process::exit(-1);
    }
}
