//! # Cli
//!
//! This module contains everything needed for parsing the CLI arguments of
//! the Titan compiler.
use clap::{Parser, ValueEnum};

/// Struct containing the CLI configuration of the compiler.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// The Titan module to compile.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Write a plain Lua version of the module instead of compiling it.
    #[arg(long)]
    pub emit_lua: bool,

    /// Specify the log level of the compiler.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

/// Enum for specifying the log level of the compiler.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level. Only critical errors will be logged.
    #[default]
    #[value(alias("0"))]
    Error,

    /// Also log warnings, like non-fatal toolchain complaints.
    #[value(alias("1"))]
    Warn,

    /// Also log information about the general state of the compiler, e.g.,
    /// which pipeline step is running.
    #[value(alias("2"))]
    Info,

    /// Log everything which happens internally in the compiler.
    #[value(alias("3"))]
    Debug,

    /// Log extra information.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
