//! Domain error types for each pipeline stage.
//!
//! The teacher's own `with_std::Error` hand-rolls `Display`/`std::error::
//! Error` over an `Io`/`Watch` enum; `thiserror` gives us the same shape
//! without the boilerplate, and is what the rest of the pack reaches for
//! (see DESIGN.md).

use std::path::PathBuf;
use thiserror::Error;

/// A lexer/parser failure. Carries a byte offset so the driver can point at
/// the offending construct, per spec.md's "rejection is fatal, with a
/// message pointing at the offending construct".
#[derive(Debug, Error)]
#[error("parse error at byte {offset}: {message}")]
pub struct ParseError {
    /// Byte offset into the source where the offending construct starts.
    pub offset: usize,
    /// Human-readable description of what was expected/rejected.
    pub message: String,
}

impl ParseError {
    /// Builds a `ParseError` pointing at `offset` with the given message.
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        ParseError {
            offset,
            message: message.into(),
        }
    }
}

/// A DSL-subset violation caught after a successful parse (P1-P3, the
/// `self`-access rule, the single-annotation rule).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// An expression/statement/type the lowerer cannot translate.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LowerError(pub String);

/// Path creation, copy, or watch-registration failure in the artifact
/// manager.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The per-run temp directory could not be created.
    #[error("failed to create artifact directory {path}: {source}")]
    CreateDir {
        /// The directory path that failed to be created.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// `paths_for` was asked about a name no unit was allocated for.
    #[error("unknown hot-reload unit {0:?}")]
    UnknownUnit(String),
}

/// A failed toolchain invocation. Carries captured diagnostics so K never
/// prints directly — W or `main` decide how to log it.
#[derive(Debug, Error)]
#[error("toolchain invocation failed (exit: {status:?}):\n{diagnostics}")]
pub struct ToolchainError {
    /// The compiler's exit code, or `None` if it was killed by a signal.
    pub status: Option<i32>,
    /// Captured stdout+stderr of the failed invocation.
    pub diagnostics: String,
}

/// Raised when `build_shared_object` cannot even acquire the lockfile
/// (spec.md R4 exclusivity) or stumbles on a filesystem error outside the
/// toolchain invocation itself.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// `build_shared_object` found an existing lockfile (R4 exclusivity).
    #[error("lockfile already exists: {0}")]
    LockHeld(PathBuf),
    /// A filesystem operation (write, rename, remove) failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The compiler subprocess exited non-zero.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}

/// Unifies the stage errors that are fatal on the initial build (spec.md
/// §7's "fatal before the binary starts" column).
#[derive(Debug, Error)]
pub enum DriverError {
    /// L failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// V failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// C failed.
    #[error(transparent)]
    Lower(#[from] LowerError),
    /// A failed.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// K failed.
    #[error(transparent)]
    Compiler(#[from] CompilerError),
    /// A filesystem operation in the driver (not inside K/A) failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
