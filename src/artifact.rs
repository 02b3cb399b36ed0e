//! A: allocates the per-process temp directory and the stable four-path
//! triplet for every reloadable function.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ArtifactError;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `{impl.src, lib.so, lib.copy.so, lock}` for one reloadable function, per
/// spec.md §3's `HotReloadUnit`.
#[derive(Debug, Clone)]
pub struct HotReloadPaths {
    /// The per-hotreload translation unit's generated source file.
    pub src: PathBuf,
    /// The shared object K keeps hot (R4/R5: only ever written by a
    /// lock-protected rename, never read directly for loading).
    pub lib: PathBuf,
    /// The loader-owned copy `lib` is duplicated into before each `dlopen`.
    pub copy: PathBuf,
    /// Present iff K is currently mid-build for this unit.
    pub lock: PathBuf,
}

/// Owns the per-process temp directory and every unit's stable file paths
/// (A, spec.md §4.3). Paths are valid for the lifetime of this value; the
/// run directory is removed best-effort on drop.
pub struct ArtifactManager {
    run_dir: PathBuf,
    main_src: PathBuf,
    main_exe: PathBuf,
    units: HashMap<String, HotReloadPaths>,
}

impl ArtifactManager {
    /// Creates a fresh per-process temp directory and allocates paths for
    /// every name in `reloadable_names`. Paths are stable for the lifetime
    /// of the returned `ArtifactManager` (spec.md §4.3).
    pub fn new<I>(reloadable_names: I) -> Result<Self, ArtifactError>
    where
        I: IntoIterator<Item = String>,
    {
        let run_id = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let run_dir = std::env::temp_dir().join(format!("hotdsl-{}-{run_id}", std::process::id()));
        fs::create_dir_all(&run_dir).map_err(|source| ArtifactError::CreateDir {
            path: run_dir.clone(),
            source,
        })?;

        let mut units = HashMap::new();
        for name in reloadable_names {
            let paths = HotReloadPaths {
                src: run_dir.join(format!("{name}.src")),
                lib: run_dir.join(format!("{name}.lib")),
                copy: run_dir.join(format!("{name}.copy")),
                lock: run_dir.join(format!("{name}.lock")),
            };
            units.insert(name, paths);
        }

        Ok(ArtifactManager {
            main_src: run_dir.join("main.src"),
            main_exe: run_dir.join("main.exe"),
            run_dir,
            units,
        })
    }

    /// The per-process temp directory every other path lives under.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Where the generated main translation unit is written.
    pub fn main_src(&self) -> &Path {
        &self.main_src
    }

    /// Where the built main executable lives.
    pub fn main_exe(&self) -> &Path {
        &self.main_exe
    }

    /// Looks up the stable file-path triplet for a reloadable function by
    /// name. Errors if `name` was not passed to `new`.
    pub fn paths_for(&self, name: &str) -> Result<&HotReloadPaths, ArtifactError> {
        self.units
            .get(name)
            .ok_or_else(|| ArtifactError::UnknownUnit(name.to_string()))
    }

    /// Every reloadable function name this manager allocated paths for.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|s| s.as_str())
    }
}

impl Drop for ArtifactManager {
    fn drop(&mut self) {
        // Best-effort, per spec.md §4.3: a failed cleanup isn't escalated.
        let _ = fs::remove_dir_all(&self.run_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_stable_paths_per_unit() {
        let mgr = ArtifactManager::new(["shift".to_string(), "scale".to_string()]).unwrap();
        let shift_a = mgr.paths_for("shift").unwrap().lib.clone();
        let shift_b = mgr.paths_for("shift").unwrap().lib.clone();
        assert_eq!(shift_a, shift_b);
        assert!(shift_a.ends_with("shift.lib"));
        assert!(mgr.paths_for("scale").is_ok());
        assert!(mgr.run_dir().exists());
    }

    #[test]
    fn unknown_unit_is_an_error() {
        let mgr = ArtifactManager::new(std::iter::empty()).unwrap();
        assert!(mgr.paths_for("nope").is_err());
    }

    #[test]
    fn fresh_runs_get_distinct_directories() {
        let a = ArtifactManager::new(std::iter::empty()).unwrap();
        let b = ArtifactManager::new(std::iter::empty()).unwrap();
        assert_ne!(a.run_dir(), b.run_dir());
    }

    #[test]
    fn drop_removes_run_directory() {
        let dir = {
            let mgr = ArtifactManager::new(std::iter::empty()).unwrap();
            mgr.run_dir().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
