//! The driver binary: parses arguments, runs the initial L→V→C→A→K build,
//! launches the compiled program, and watches the source file for edits.

use std::path::PathBuf;
use std::process::Command;
use std::thread;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hotdsl::artifact::ArtifactManager;
use hotdsl::compiler::CompilerInvoker;
use hotdsl::error::DriverError;
use hotdsl::lower::{emit_hotreload_tu, emit_main_tu, UnitPaths};
use hotdsl::parser::parse;
use hotdsl::validator::{classify, validate, MethodRole};
use hotdsl::watch::{watch_loop, Reconciler};

struct Args {
    source: PathBuf,
    backend: String,
    show_generated: bool,
}

fn print_usage() {
    println!(
        "usage: hotdsl [--backend native|browser] [--show-generated] <source.hr>\n\n\
         options:\n  \
         --backend {{native,browser}}  select the execution backend (default: native)\n  \
         --show-generated             print the generated C++ source to stderr before running\n  \
         -h, --help                   print this message"
    );
}

fn parse_args() -> Result<Option<Args>> {
    let mut backend = "native".to_string();
    let mut show_generated = false;
    let mut source = None;

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "--backend" => {
                backend = argv.next().context("--backend requires a value")?;
            }
            "--show-generated" => show_generated = true,
            other if !other.starts_with('-') && source.is_none() => {
                source = Some(PathBuf::from(other));
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }

    let source = source.context("missing required source file argument")?;
    Ok(Some(Args { source, backend, show_generated }))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    if args.backend != "native" {
        error!("FATAL: backend {:?} is not implemented; only \"native\" is supported", args.backend);
        std::process::exit(1);
    }

    match run(&args) {
        Ok(status) => std::process::exit(status.code().unwrap_or(0)),
        Err(e) => {
            error!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<std::process::ExitStatus, DriverError> {
    let src = std::fs::read_to_string(&args.source)?;

    let program = validate(parse(&src)?)?;
    info!("parsed and validated {:?} ({} methods)", program.class_name, program.methods.len());

    let reloadable_names: Vec<String> = program
        .methods
        .iter()
        .filter(|m| classify(m) == MethodRole::Hotreload)
        .map(|m| m.name.clone())
        .collect();

    let artifacts = ArtifactManager::new(reloadable_names.iter().cloned())?;
    let compiler = CompilerInvoker::from_env();

    for method in &program.methods {
        if classify(method) != MethodRole::Hotreload {
            continue;
        }
        let tu = emit_hotreload_tu(&program, method)?;
        let paths = artifacts.paths_for(&method.name)?;
        info!("building initial shared object for {:?}", method.name);
        compiler.build_shared_object(&paths.src, &tu, &paths.lib, &paths.lock)?;
    }

    let unit_paths = |name: &str| {
        let paths = artifacts.paths_for(name).expect("unit paths allocated for every reloadable method");
        UnitPaths { lib: &paths.lib, copy: &paths.copy, lock: &paths.lock }
    };
    let main_tu = emit_main_tu(&program, &unit_paths)?;
    if args.show_generated {
        eprintln!("{main_tu}");
    }
    std::fs::write(artifacts.main_src(), &main_tu)?;
    compiler.build_executable(artifacts.main_src(), artifacts.main_exe())?;
    let main_exe = artifacts.main_exe().to_path_buf();

    let reconciler = Reconciler::new(compiler, artifacts, &program)?;
    let source_path = args.source.clone();
    let watch_handle = thread::spawn(move || {
        if let Err(e) = watch_loop(&source_path, reconciler) {
            error!("file watcher stopped: {e}");
        }
    });

    info!("launching {}", main_exe.display());
    let mut child = Command::new(&main_exe).spawn().map_err(DriverError::Io)?;
    let status = child.wait().map_err(DriverError::Io)?;

    // `watch_handle` owns the last `ArtifactManager`/`Reconciler`; it (and
    // the run directory) is torn down when the thread itself exits with the
    // process, not joined here — there is no graceful reload cancellation
    // (spec.md §5).
    drop(watch_handle);
    Ok(status)
}
