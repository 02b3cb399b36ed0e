//! W: watches the source file and drives reconciliation of hotreload units
//! against the running binary's shared objects (spec.md §4.5).
//!
//! The debounced `notify` event loop is grounded on the teacher's own
//! `with_std` file-watch thread (see DESIGN.md); the reconciliation state
//! machine itself is this crate's addition, since the teacher reloads one
//! whole library rather than one function per unit.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info, warn};

use crate::artifact::ArtifactManager;
use crate::ast::Program;
use crate::compiler::CompilerInvoker;
use crate::error::DriverError;
use crate::lower::emit_hotreload_tu;
use crate::parser::parse;
use crate::validator::{classify, validate, MethodRole};

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Per-unit knowledge W keeps to detect signature/body changes across
/// reloads (the `current_body_hash` from spec.md §3, plus `signature`).
struct KnownUnit {
    signature: String,
    body_hash: u64,
}

/// The hotreload-unit state machine from spec.md §4.5, tracked for
/// observability only — the live binary's behavior is governed entirely by
/// the filesystem (H reads `lib`/`lock`, not this enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Known to W but not yet built or rebuilt this run.
    Registered,
    /// The live `lib` reflects the last successfully reconciled body.
    UpToDate,
    /// A body change was detected and `build_shared_object` is in flight.
    Rebuilding,
    /// The last rebuild attempt failed; the previous `lib` is still live.
    Failed,
}

fn body_hash(tu: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    tu.hash(&mut hasher);
    hasher.finish()
}

/// Owns the known-patches map and drives rebuilds. One `Reconciler` per
/// running program; `reconcile` is called once per settled filesystem event.
pub struct Reconciler {
    compiler: CompilerInvoker,
    artifacts: ArtifactManager,
    known: HashMap<String, KnownUnit>,
    states: HashMap<String, UnitState>,
}

impl Reconciler {
    /// Seeds `known` from the program that was just built into the running
    /// binary, so the first reconcile after startup compares against the
    /// artifacts K already produced.
    pub fn new(compiler: CompilerInvoker, artifacts: ArtifactManager, initial: &Program) -> Result<Self, DriverError> {
        let mut known = HashMap::new();
        let mut states = HashMap::new();
        for method in &initial.methods {
            if classify(method) != MethodRole::Hotreload {
                continue;
            }
            let tu = emit_hotreload_tu(initial, method)?;
            known.insert(
                method.name.clone(),
                KnownUnit {
                    signature: crate::lower::signature_string(method),
                    body_hash: body_hash(&tu),
                },
            );
            states.insert(method.name.clone(), UnitState::UpToDate);
        }
        Ok(Reconciler { compiler, artifacts, known, states })
    }

    /// The last observed `UnitState` for a reloadable function, or `None`
    /// if `name` isn't a known hotreload unit.
    pub fn state_of(&self, name: &str) -> Option<UnitState> {
        self.states.get(name).copied()
    }

    /// Re-runs L+V+C over `src` and reconciles against `known`, following
    /// spec.md §4.5 step by step. Never returns an error the caller must
    /// treat as fatal: every failure mode here is logged and swallowed.
    pub fn reconcile(&mut self, src: &str) {
        let program = match parse(src)
            .map_err(DriverError::from)
            .and_then(|p| validate(p).map_err(DriverError::from))
        {
            Ok(p) => p,
            Err(e) => {
                warn!("reload rejected: {e}");
                return;
            }
        };

        let mut fresh: HashMap<String, (String, String)> = HashMap::new();
        for method in &program.methods {
            if classify(method) != MethodRole::Hotreload {
                continue;
            }
            let tu = match emit_hotreload_tu(&program, method) {
                Ok(tu) => tu,
                Err(e) => {
                    warn!("reload rejected, lowering failed for {:?}: {e}", method.name);
                    return;
                }
            };
            fresh.insert(method.name.clone(), (crate::lower::signature_string(method), tu));
        }

        for (name, _) in self.known.iter() {
            if !fresh.contains_key(name) {
                warn!("deletion unsupported for hotreload function {name:?}; keeping prior implementation live");
                return;
            }
        }
        for (name, known) in self.known.iter() {
            let (new_sig, _) = &fresh[name];
            if *new_sig != known.signature {
                warn!("signature change rejected for {name:?} ({} -> {new_sig}); keeping prior implementation live", known.signature);
                return;
            }
        }

        for (name, (_, tu)) in &fresh {
            let Some(known) = self.known.get(name) else {
                warn!("addition unsupported for hotreload function {name:?}; ignoring");
                continue;
            };
            let new_hash = body_hash(tu);
            if new_hash == known.body_hash {
                continue;
            }

            self.states.insert(name.clone(), UnitState::Rebuilding);
            let paths = match self.artifacts.paths_for(name) {
                Ok(p) => p.clone(),
                Err(e) => {
                    error!("artifact lookup failed for {name:?}: {e}");
                    self.states.insert(name.clone(), UnitState::Failed);
                    continue;
                }
            };
            match self.compiler.build_shared_object(&paths.src, tu, &paths.lib, &paths.lock) {
                Ok(()) => {
                    info!("rebuilt {name:?}");
                    self.known.insert(
                        name.clone(),
                        KnownUnit {
                            signature: fresh[name].0.clone(),
                            body_hash: new_hash,
                        },
                    );
                    self.states.insert(name.clone(), UnitState::UpToDate);
                }
                Err(e) => {
                    error!("compile failed for {name:?}: {e}");
                    self.states.insert(name.clone(), UnitState::Failed);
                }
            }
        }
    }
}

/// Blocks the calling thread, watching `source_path` for content changes and
/// feeding settled batches to `reconciler`. Renames and deletions of the
/// source file are logged and ignored (spec.md §4.5): the prior program
/// remains live either way.
pub fn watch_loop(source_path: &Path, mut reconciler: Reconciler) -> notify::Result<()> {
    let (tx, rx) = channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(tx)?;
    watcher.watch(source_path, RecursiveMode::NonRecursive)?;

    loop {
        let first = match rx.recv() {
            Ok(event) => event,
            Err(_) => return Ok(()),
        };
        if !is_content_change(&first) {
            continue;
        }

        // Drain any further events within the debounce window so one save
        // (which editors often turn into several filesystem events) only
        // triggers a single reconcile pass.
        loop {
            match rx.recv_timeout(DEBOUNCE) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }

        match std::fs::read_to_string(source_path) {
            Ok(src) => reconciler.reconcile(&src),
            Err(e) => warn!("could not read {}: {e}", source_path.display()),
        }
    }
}

fn is_content_change(event: &notify::Result<Event>) -> bool {
    match event {
        Ok(event) => matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)),
        Err(e) => {
            warn!("watch error: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn stub_compiler(dir: &Path, code: i32) -> std::path::PathBuf {
        let script = dir.join("stub_cxx.sh");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\nprev=\"\"\nfor a in \"$@\"; do\n  if [ \"$prev\" = \"-o\" ]; then\n    printf 'obj' > \"$a\"\n  fi\n  prev=\"$a\"\ndone\nexit {code}\n"
            ),
        )
        .unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();
        script
    }

    fn program(src: &str) -> Program {
        validate(parse(src).unwrap()).unwrap()
    }

    const COUNTER_V1: &str = r#"
        class Program extends HotReloadProgram {
            @reload
            shift(a: number): number { return a + 10; }
            scale(a: number): number { return a * 1; }
            main(): number {
                return shift(scale(1));
            }
        }
    "#;

    const COUNTER_BODY_EDIT: &str = r#"
        class Program extends HotReloadProgram {
            @reload
            shift(a: number): number { return a + 99; }
            scale(a: number): number { return a * 1; }
            main(): number {
                return shift(scale(1));
            }
        }
    "#;

    const COUNTER_SIGNATURE_CHANGE: &str = r#"
        class Program extends HotReloadProgram {
            @reload
            shift(a: number, b: number): number { return a + b; }
            scale(a: number): number { return a * 1; }
            main(): number {
                return shift(scale(1), 1);
            }
        }
    "#;

    #[test]
    fn body_edit_triggers_rebuild_and_updates_known_state() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = CompilerInvoker::new(stub_compiler(dir.path(), 0));
        let artifacts = ArtifactManager::new(["shift".to_string()]).unwrap();
        let initial = program(COUNTER_V1);
        let mut reconciler = Reconciler::new(compiler, artifacts, &initial).unwrap();

        reconciler.reconcile(COUNTER_BODY_EDIT);

        assert_eq!(reconciler.state_of("shift"), Some(UnitState::UpToDate));
        assert_eq!(reconciler.known.get("shift").unwrap().body_hash, {
            let prog = program(COUNTER_BODY_EDIT);
            let m = prog.methods.iter().find(|m| m.name == "shift").unwrap();
            body_hash(&emit_hotreload_tu(&prog, m).unwrap())
        });
    }

    #[test]
    fn signature_change_is_rejected_without_rebuilding() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = CompilerInvoker::new(stub_compiler(dir.path(), 0));
        let artifacts = ArtifactManager::new(["shift".to_string()]).unwrap();
        let initial = program(COUNTER_V1);
        let original_hash = {
            let m = initial.methods.iter().find(|m| m.name == "shift").unwrap();
            body_hash(&emit_hotreload_tu(&initial, m).unwrap())
        };
        let mut reconciler = Reconciler::new(compiler, artifacts, &initial).unwrap();

        reconciler.reconcile(COUNTER_SIGNATURE_CHANGE);

        assert_eq!(reconciler.known.get("shift").unwrap().body_hash, original_hash);
    }

    #[test]
    fn failed_compile_marks_unit_failed_but_keeps_known_signature() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = CompilerInvoker::new(stub_compiler(dir.path(), 1));
        let artifacts = ArtifactManager::new(["shift".to_string()]).unwrap();
        let initial = program(COUNTER_V1);
        let mut reconciler = Reconciler::new(compiler, artifacts, &initial).unwrap();

        reconciler.reconcile(COUNTER_BODY_EDIT);

        assert_eq!(reconciler.state_of("shift"), Some(UnitState::Failed));
    }
}
