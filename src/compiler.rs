//! K: wraps the external native toolchain and owns the lockfile protocol
//! for building per-hotreload shared objects (spec.md §4.4).
//!
//! The subprocess-invocation shape (spawn, capture `output()`, surface
//! stderr on failure) is grounded on the vais hotreload `compile_source`
//! helper in the retrieval pack (see DESIGN.md) — the lockfile steps
//! around it are this crate's own addition, since that reference compiles
//! a whole library rather than one function under a producer/consumer
//! protocol.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CompilerError, ToolchainError};

/// Wraps an external C++ toolchain executable.
pub struct CompilerInvoker {
    cxx: PathBuf,
}

impl CompilerInvoker {
    /// Builds an invoker that shells out to `cxx` (a path or bare command
    /// name resolved via `PATH`). Tests pass a stub script here instead of
    /// a real compiler.
    pub fn new(cxx: impl Into<PathBuf>) -> Self {
        CompilerInvoker { cxx: cxx.into() }
    }

    /// Resolves the compiler from `CXX`, defaulting to `c++` (spec.md §6).
    pub fn from_env() -> Self {
        let cxx = std::env::var_os("CXX").unwrap_or_else(|| "c++".into());
        CompilerInvoker::new(cxx)
    }

    /// Synchronous; links the main TU against `dl`-style dynamic loading.
    ///
    /// `-rdynamic` exports the executable's own symbols to the dynamic
    /// symbol table: a per-hotreload TU's forward declarations of host API
    /// and static functions (see `lower::emit_hotreload_tu`) only resolve at
    /// `dlopen` time if the host that opens them has exported those symbols.
    pub fn build_executable(&self, main_src: &Path, out_exe: &Path) -> Result<(), CompilerError> {
        let output = Command::new(&self.cxx)
            .arg("-std=c++17")
            .arg("-rdynamic")
            .arg(main_src)
            .arg("-o")
            .arg(out_exe)
            .arg("-ldl")
            .output()?;

        if !output.status.success() {
            return Err(CompilerError::Toolchain(ToolchainError {
                status: output.status.code(),
                diagnostics: diagnostics(&output),
            }));
        }
        Ok(())
    }

    /// Obeys the lockfile protocol from spec.md §4.4 strictly: create lock,
    /// write source, compile to a scratch file, rename atomically over
    /// `out_lib`, delete lock. On any toolchain failure, delete the lock
    /// without touching `out_lib` and return the captured diagnostics.
    pub fn build_shared_object(
        &self,
        src_path: &Path,
        body: &str,
        out_lib: &Path,
        lock: &Path,
    ) -> Result<(), CompilerError> {
        let lock_file = fs::OpenOptions::new().write(true).create_new(true).open(lock);
        match lock_file {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CompilerError::LockHeld(lock.to_path_buf()));
            }
            Err(e) => return Err(CompilerError::Io(e)),
        }

        let result = self.compile_to(src_path, body, out_lib);

        // The lock is deleted in both branches below; a build that was
        // killed mid-flight leaves it behind, which is why `ArtifactManager`
        // always starts each run in a fresh temp directory (spec.md §9).
        match result {
            Ok(()) => {
                fs::remove_file(lock).map_err(CompilerError::Io)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(lock);
                Err(e)
            }
        }
    }

    fn compile_to(&self, src_path: &Path, body: &str, out_lib: &Path) -> Result<(), CompilerError> {
        fs::write(src_path, body).map_err(CompilerError::Io)?;

        let scratch = out_lib.with_extension("building");
        let output = Command::new(&self.cxx)
            .arg("-shared")
            .arg("-fPIC")
            .arg("-std=c++17")
            .arg(src_path)
            .arg("-o")
            .arg(&scratch)
            .output()?;

        if !output.status.success() {
            let _ = fs::remove_file(&scratch);
            return Err(CompilerError::Toolchain(ToolchainError {
                status: output.status.code(),
                diagnostics: diagnostics(&output),
            }));
        }

        // Same-directory rename: same filesystem, so `out_lib`'s mtime
        // reflects the completed build the instant this returns (R5/R4).
        fs::rename(&scratch, out_lib).map_err(CompilerError::Io)?;
        Ok(())
    }
}

fn diagnostics(output: &std::process::Output) -> String {
    let mut s = String::from_utf8_lossy(&output.stdout).into_owned();
    s.push_str(&String::from_utf8_lossy(&output.stderr));
    s
}
