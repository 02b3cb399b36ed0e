//! The typed program tree produced by the lexer/parser and consumed by the
//! validator and lowerer.
//!
//! This is intentionally tiny: the DSL admits exactly one numeric type, one
//! class shape, and a small statement/expression grammar (see
//! `SPEC_FULL.md` §4.1). There is no type-checking pass beyond what the
//! validator does inline — the AST itself cannot represent anything outside
//! the accepted subset.

use std::fmt;

/// The only scalar type the DSL surfaces. `Promise<number>` is accepted as
/// a return-type spelling but always lowers to the same `Type::Number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// The DSL's sole numeric type; lowers to C++ `int32_t`.
    Number,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Number => write!(f, "number"),
        }
    }
}

/// Binary arithmetic operators; the grammar has no comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` — integer division.
    Div,
}

/// Unary operators, used both as prefix (`++x`, `--x`, `+x`, `-x`) and
/// postfix (`x++`, `x--`) forms depending on where they appear in an `Expr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Increment (`++`), prefix or postfix.
    Inc,
    /// Decrement (`--`), prefix or postfix.
    Dec,
    /// Unary plus (`+x`); prefix only.
    Pos,
    /// Unary minus (`-x`); prefix only.
    Neg,
}

/// An expression, per the grammar in `SPEC_FULL.md` §4.1.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A decimal integer literal.
    IntLit(i32),
    /// `true` or `false`.
    BoolLit(bool),
    /// A bare identifier reference (variable or zero-arg context).
    Ident(String),
    /// A call to a named function (callee is always a plain identifier).
    Call(String, Vec<Expr>),
    /// `self.name` as parsed, before V rewrites it to `Ident(name)`.
    SelfProp(String),
    /// `self.name(args)` as parsed, before V rewrites it to `Call(name,
    /// args)`.
    SelfCall(String, Vec<Expr>),
    /// A binary arithmetic expression.
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `++x`, `--x`, `+x`, `-x`.
    PrefixUnary(UnOp, Box<Expr>),
    /// `x++`, `x--`. The grammar only admits `Inc`/`Dec` here; a
    /// `PostfixUnary(Pos | Neg, _)` is never constructed by the parser.
    PostfixUnary(UnOp, Box<Expr>),
    /// `await E` — unwraps to `E` per spec.md §4.1.
    Await(Box<Expr>),
}

/// A statement, per the grammar in `SPEC_FULL.md` §4.1.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A brace-delimited sequence of statements.
    Block(Vec<Stmt>),
    /// `while (cond) body`.
    While(Expr, Box<Stmt>),
    /// `for (init; cond; step) body`, with all three slots optional.
    For {
        /// The init slot: a `VarDecl` or expression statement, if present.
        init: Option<Box<Stmt>>,
        /// The loop condition, if present.
        cond: Option<Expr>,
        /// The per-iteration step expression, if present.
        step: Option<Expr>,
        /// The loop body.
        body: Box<Stmt>,
    },
    /// `let name[: type][= init];`.
    VarDecl {
        /// The declared variable's name.
        name: String,
        /// The declared type, if an annotation was given.
        ty: Option<Type>,
        /// The initializer expression, if given.
        init: Option<Expr>,
    },
    /// `return [expr];`.
    Return(Option<Expr>),
    /// An expression used as a statement.
    Expr(Expr),
}

/// One method of the program class.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// The method's name; must be a valid C-ABI external symbol (enforced
    /// by V) and unique within the program.
    pub name: String,
    /// Parameter `(name, type)` pairs, in declaration order.
    pub params: Vec<(String, Type)>,
    /// `None` only ever occurs transiently during parsing; by the time V
    /// sees a `Method`, invariant P2 guarantees this is `Some`.
    pub ret: Option<Type>,
    /// The method's statement list.
    pub body: Vec<Stmt>,
    /// Whether this method carries the `@reload` annotation.
    pub reloadable: bool,
    /// Whether this method was declared `async`. Lowering treats `await`
    /// as a no-op unwrap regardless of this flag (spec.md §9).
    pub is_async: bool,
}

/// The result of L over a source file: one `Program` class extending
/// `HotReloadProgram`, per spec.md §3 invariant set.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// The program class's own name (e.g. `Program` in `class Program
    /// extends HotReloadProgram`).
    pub class_name: String,
    /// The base class name; validated to be exactly `HotReloadProgram`.
    pub base_name: String,
    /// The class's methods, in source order.
    pub methods: Vec<Method>,
}

/// Names that resolve to host-provided I/O rather than to a user `Method`.
/// Calls to these are lowered against the runtime header's `hostapi::`
/// declarations (SPEC_FULL.md §4.1).
pub const HOST_API: &[&str] = &["print", "sleep_seconds", "sleep_millis"];

/// Whether `name` names a host API function rather than a user method.
pub fn is_host_api(name: &str) -> bool {
    HOST_API.contains(&name)
}
