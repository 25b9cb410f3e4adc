//! # Diagnostics
//!
//! Positioned diagnostics accumulated by the compiler phases, plus the
//! driver-level error type for failures that abort a compile outright.
use std::{error::Error, fmt::Display};

use crate::ast::Position;

/// The kind of a diagnostic. Phases pick the kind matching their concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Syntax,
    Name,
    Type,
    NotImplemented,
    Toolchain,
    Usage,
}

/// A single positioned diagnostic. Diagnostics without a position are a bug,
/// so the position is not optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Position,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>, position: Position) -> Diagnostic {
        Diagnostic {
            kind,
            message: message.into(),
            position,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (file, line, col) = &self.position;
        write!(f, "{}:{}:{}: {}", file, line, col, self.message)
    }
}

impl Error for Diagnostic {}

/// Order diagnostics by source position, keeping the insertion order of
/// diagnostics on the same line and column.
pub fn sort_by_position(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by_key(|d| (d.position.1, d.position.2));
}

/// A failure that aborts the pipeline.
#[derive(Debug)]
pub enum CompileError {
    Io(std::io::Error),
    Usage(String),
    Toolchain(String),
    /// Accumulated source diagnostics from the in-process phases.
    Source(Vec<Diagnostic>),
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Io(err) => write!(f, "{err}"),
            CompileError::Usage(message) => f.write_str(message),
            CompileError::Toolchain(message) => f.write_str(message),
            CompileError::Source(diagnostics) => {
                let mut first = true;
                for diagnostic in diagnostics {
                    if !first {
                        writeln!(f)?;
                    }
                    write!(f, "{diagnostic}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

impl Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> CompileError {
        CompileError::Io(err)
    }
}
