#![deny(missing_docs)]

//! An exploratory hot-code-reloading framework.
//!
//! A user authors a small program in a restricted DSL: one class extending
//! `HotReloadProgram`, with methods optionally marked `@reload`. This crate
//! turns that file into a long-running native program whose `@reload`
//! methods can be edited and swapped live while everything else (loop
//! counters, call stacks) keeps running.
//!
//! The pipeline is a straight line from source text to a running process:
//!
//! - [`lexer`] and [`parser`] turn the source file into an [`ast::Program`].
//! - [`validator`] enforces the DSL subset and classifies each method as
//!   `main`, reloadable, or static.
//! - [`lower`] emits C++ translation units: one per reloadable method, and a
//!   main TU that links in the hot-reload runtime template.
//! - [`artifact`] allocates the per-function file paths (source, shared
//!   object, loader copy, lockfile) the rest of the pipeline writes to.
//! - [`compiler`] wraps the external `c++` toolchain and owns the lockfile
//!   protocol that makes concurrent build/load safe.
//! - [`watch`] observes the source file after the initial build and
//!   reconciles edits against what's already running.
//!
//! The hot-reload runtime itself (`HotReload<Fn>`, the `get()` staleness
//! check) is not Rust: it is emitted as a C++ template and linked into the
//! generated binary. See `src/templates/runtime.hpp`.
//!
//! # Example
//!
//! ```rust
//! use hotdsl::parser::parse;
//! use hotdsl::validator::validate;
//! use hotdsl::lower::emit_hotreload_tu;
//!
//! let source = r#"
//!     class Program extends HotReloadProgram {
//!         @reload
//!         shift(a: number): number { return a + 10; }
//!         main(): number { return shift(1); }
//!     }
//! "#;
//!
//! let program = validate(parse(source).unwrap()).unwrap();
//! let shift = program.methods.iter().find(|m| m.name == "shift").unwrap();
//! let tu = emit_hotreload_tu(&program, shift).unwrap();
//! assert!(tu.contains("extern \"C\" int32_t shift"));
//! ```

pub mod artifact;
pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod validator;
pub mod watch;
