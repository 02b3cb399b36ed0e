//! C: lowers a validated `Program` to C++ translation units, plus the build
//! configuration K needs to compile them.
//!
//! Three outputs, matching spec.md §4.2:
//! - one per-hotreload TU per reloadable method (`emit_hotreload_tu`),
//! - one main TU (`emit_main_tu`), built by prepending the embedded
//!   runtime header (`templates/runtime.hpp`) to the lowered static
//!   functions, hotreload wiring, and `main`,
//! - the build configuration itself, which `main.rs`/`watch.rs` hand to
//!   `CompilerInvoker` (source/output paths, not modeled as a type here —
//!   `ArtifactManager` already owns the paths).

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use crate::ast::*;
use crate::error::LowerError;
use crate::validator::{classify, MethodRole};

const RUNTIME_HEADER: &str = include_str!("templates/runtime.hpp");

fn lower_type(ty: Type) -> &'static str {
    match ty {
        Type::Number => "int32_t",
    }
}

/// The canonical signature string used for R1 (signature-stability)
/// comparisons across reloads. Parameter names never appear in it.
pub fn signature_string(method: &Method) -> String {
    let params: Vec<&str> = method.params.iter().map(|(_, ty)| lower_type(*ty)).collect();
    format!(
        "{}({})",
        method.ret.map(lower_type).unwrap_or("void"),
        params.join(",")
    )
}

struct LowerCtx<'a> {
    reloadable: &'a HashSet<String>,
    static_names: &'a HashSet<String>,
    /// `true` when lowering the isolated per-hotreload TU, where there is
    /// no `HotReload` cell in scope: every call becomes a direct call and
    /// is resolved against the executable's exported trampoline/static
    /// symbol at dlopen time instead.
    in_reloadable_tu: bool,
}

fn lower_call(ctx: &LowerCtx, name: &str, args: &[Expr]) -> Result<String, LowerError> {
    let arg_strs: Result<Vec<String>, LowerError> = args.iter().map(|a| lower_expr(ctx, a)).collect();
    let arg_strs = arg_strs?.join(", ");

    if is_host_api(name) {
        return Ok(format!("{name}({arg_strs})"));
    }
    if !ctx.in_reloadable_tu && ctx.reloadable.contains(name) {
        return Ok(format!("{name}_cell.get()({arg_strs})"));
    }
    if ctx.reloadable.contains(name) || ctx.static_names.contains(name) {
        return Ok(format!("{name}({arg_strs})"));
    }
    Err(LowerError(format!("call to unresolved function {name:?}")))
}

fn lower_expr(ctx: &LowerCtx, expr: &Expr) -> Result<String, LowerError> {
    Ok(match expr {
        Expr::IntLit(n) => n.to_string(),
        Expr::BoolLit(b) => b.to_string(),
        Expr::Ident(name) => name.clone(),
        Expr::Call(name, args) => lower_call(ctx, name, args)?,
        Expr::SelfProp(_) | Expr::SelfCall(_, _) => {
            return Err(LowerError(
                "self-access must be rewritten by the validator before lowering".into(),
            ));
        }
        Expr::Binary(op, lhs, rhs) => {
            let op = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
            };
            format!("({} {} {})", lower_expr(ctx, lhs)?, op, lower_expr(ctx, rhs)?)
        }
        Expr::PrefixUnary(op, inner) => {
            let inner = lower_expr(ctx, inner)?;
            match op {
                UnOp::Inc => format!("(++{inner})"),
                UnOp::Dec => format!("(--{inner})"),
                UnOp::Pos => format!("(+{inner})"),
                UnOp::Neg => format!("(-{inner})"),
            }
        }
        Expr::PostfixUnary(op, inner) => {
            let inner = lower_expr(ctx, inner)?;
            match op {
                UnOp::Inc => format!("({inner}++)"),
                UnOp::Dec => format!("({inner}--)"),
                UnOp::Pos | UnOp::Neg => {
                    return Err(LowerError("postfix +/- is not part of the grammar".into()));
                }
            }
        }
        // `await E` unwraps to `E`: sleeps are thread-blocking host calls,
        // there is no event loop in the native backend (spec.md §9).
        Expr::Await(inner) => lower_expr(ctx, inner)?,
    })
}

fn lower_stmt(ctx: &LowerCtx, stmt: &Stmt, out: &mut String, indent: usize) -> Result<(), LowerError> {
    let pad = "    ".repeat(indent);
    match stmt {
        Stmt::Block(stmts) => {
            writeln!(out, "{pad}{{").unwrap();
            for s in stmts {
                lower_stmt(ctx, s, out, indent + 1)?;
            }
            writeln!(out, "{pad}}}").unwrap();
        }
        Stmt::While(cond, body) => {
            writeln!(out, "{pad}while ({}) {{", lower_expr(ctx, cond)?).unwrap();
            lower_stmt(ctx, body, out, indent + 1)?;
            writeln!(out, "{pad}}}").unwrap();
        }
        Stmt::For { init, cond, step, body } => {
            let init_str = match init {
                Some(s) => lower_for_slot_stmt(ctx, s)?,
                None => String::new(),
            };
            let cond_str = match cond {
                Some(e) => lower_expr(ctx, e)?,
                None => String::new(),
            };
            let step_str = match step {
                Some(e) => lower_expr(ctx, e)?,
                None => String::new(),
            };
            writeln!(out, "{pad}for ({init_str}; {cond_str}; {step_str}) {{").unwrap();
            lower_stmt(ctx, body, out, indent + 1)?;
            writeln!(out, "{pad}}}").unwrap();
        }
        Stmt::VarDecl { name, ty, init } => {
            let rhs = match init {
                Some(e) => lower_expr(ctx, e)?,
                None => {
                    return Err(LowerError(format!(
                        "local variable {name:?} needs an explicit type or an initializer"
                    )));
                }
            };
            let ty_str = match ty {
                Some(t) => lower_type(*t),
                // `auto` is used only for locals without an explicit
                // annotation (spec.md §4.2's tie-break rule).
                None => "auto",
            };
            writeln!(out, "{pad}{ty_str} {name} = {rhs};").unwrap();
        }
        Stmt::Return(value) => match value {
            Some(e) => writeln!(out, "{pad}return {};", lower_expr(ctx, e)?).unwrap(),
            None => writeln!(out, "{pad}return;").unwrap(),
        },
        Stmt::Expr(e) => writeln!(out, "{pad}{};", lower_expr(ctx, e)?).unwrap(),
    }
    Ok(())
}

/// `for`'s init slot is a bare statement with no surrounding braces and no
/// trailing newline — it has to sit inline between the parens.
fn lower_for_slot_stmt(ctx: &LowerCtx, stmt: &Stmt) -> Result<String, LowerError> {
    match stmt {
        Stmt::VarDecl { name, ty, init } => {
            let rhs = match init {
                Some(e) => lower_expr(ctx, e)?,
                None => return Err(LowerError(format!("for-init variable {name:?} needs an initializer"))),
            };
            let ty_str = match ty {
                Some(t) => lower_type(*t),
                None => "auto",
            };
            Ok(format!("{ty_str} {name} = {rhs}"))
        }
        Stmt::Expr(e) => lower_expr(ctx, e),
        other => Err(LowerError(format!("unsupported for-init statement {other:?}"))),
    }
}

fn params_decl(method: &Method) -> String {
    method
        .params
        .iter()
        .map(|(name, ty)| format!("{} {}", lower_type(*ty), name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn name_sets(prog: &Program) -> (HashSet<String>, HashSet<String>) {
    let reloadable: HashSet<String> = prog
        .methods
        .iter()
        .filter(|m| classify(m) == MethodRole::Hotreload)
        .map(|m| m.name.clone())
        .collect();
    let static_names: HashSet<String> = prog
        .methods
        .iter()
        .filter(|m| classify(m) == MethodRole::Static)
        .map(|m| m.name.clone())
        .collect();
    (reloadable, static_names)
}

/// Emits the single externally-visible C++ function for one reloadable
/// method. Compiled alone into its own shared object by K.
pub fn emit_hotreload_tu(prog: &Program, method: &Method) -> Result<String, LowerError> {
    debug_assert_eq!(classify(method), MethodRole::Hotreload);
    let (reloadable, static_names) = name_sets(prog);
    let ctx = LowerCtx {
        reloadable: &reloadable,
        static_names: &static_names,
        in_reloadable_tu: true,
    };

    let mut out = String::new();
    writeln!(out, "#include <cstdint>").unwrap();
    writeln!(out).unwrap();
    for other in prog.methods.iter().filter(|m| m.name != method.name) {
        if classify(other) == MethodRole::Main {
            continue;
        }
        writeln!(
            out,
            "extern \"C\" {} {}({});",
            other.ret.map(lower_type).unwrap_or("void"),
            other.name,
            params_decl(other)
        )
        .unwrap();
    }
    for host in HOST_API {
        writeln!(out, "extern \"C\" void {host}(int32_t);").unwrap();
    }
    writeln!(out).unwrap();
    writeln!(
        out,
        "extern \"C\" {} {}({}) {{",
        method.ret.map(lower_type).unwrap_or("void"),
        method.name,
        params_decl(method)
    )
    .unwrap();
    for stmt in &method.body {
        lower_stmt(&ctx, stmt, &mut out, 1)?;
    }
    writeln!(out, "}}").unwrap();
    Ok(out)
}

/// Paths K needs to wire a `HotReload<Sig>` cell to its file triplet.
pub struct UnitPaths<'a> {
    /// The shared object's stable path.
    pub lib: &'a Path,
    /// The loader-owned copy path.
    pub copy: &'a Path,
    /// The lockfile path.
    pub lock: &'a Path,
}

/// Emits the main translation unit: the embedded runtime header, static
/// functions in source order, hotreload wiring in source order, then
/// `main` last (spec.md §4.2's deterministic emission order).
pub fn emit_main_tu<'a>(
    prog: &Program,
    unit_paths: &dyn Fn(&str) -> UnitPaths<'a>,
) -> Result<String, LowerError> {
    let (reloadable, static_names) = name_sets(prog);
    let main_ctx = LowerCtx {
        reloadable: &reloadable,
        static_names: &static_names,
        in_reloadable_tu: false,
    };

    let mut out = String::new();
    out.push_str(RUNTIME_HEADER);
    out.push('\n');

    for method in &prog.methods {
        if classify(method) != MethodRole::Static {
            continue;
        }
        writeln!(
            out,
            "extern \"C\" {} {}({}) {{",
            method.ret.map(lower_type).unwrap_or("void"),
            method.name,
            params_decl(method)
        )
        .unwrap();
        for stmt in &method.body {
            lower_stmt(&main_ctx, stmt, &mut out, 1)?;
        }
        writeln!(out, "}}\n").unwrap();
    }

    for method in &prog.methods {
        if classify(method) != MethodRole::Hotreload {
            continue;
        }
        let ret_ty = method.ret.map(lower_type).unwrap_or("void");
        let param_types = method
            .params
            .iter()
            .map(|(_, ty)| lower_type(*ty))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "using {}_sig = {}(*)({});", method.name, ret_ty, param_types).unwrap();
        let paths = unit_paths(&method.name);
        writeln!(
            out,
            "static hotdsl::HotReload<{}_sig> {}_cell(\"{}\", \"{}\", \"{}\", \"{}\");",
            method.name,
            method.name,
            method.name,
            path_literal(paths.lib),
            path_literal(paths.copy),
            path_literal(paths.lock),
        )
        .unwrap();
        writeln!(
            out,
            "extern \"C\" {} {}({}) {{ return {}_cell.get()({}); }}\n",
            method.ret.map(lower_type).unwrap_or("void"),
            method.name,
            params_decl(method),
            method.name,
            method.params.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>().join(", "),
        )
        .unwrap();
    }

    let main_method = prog
        .methods
        .iter()
        .find(|m| classify(m) == MethodRole::Main)
        .ok_or_else(|| LowerError("program has no main method".into()))?;
    writeln!(out, "static void user_main() {{").unwrap();
    for stmt in &main_method.body {
        lower_stmt(&main_ctx, stmt, &mut out, 1)?;
    }
    writeln!(out, "}}\n").unwrap();
    writeln!(out, "int main() {{\n    user_main();\n    return 0;\n}}").unwrap();

    Ok(out)
}

fn path_literal(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "\\\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::validator::validate;
    use std::path::PathBuf;

    fn counter_program() -> Program {
        validate(
            parse(
                r#"
                class Program extends HotReloadProgram {
                    @reload
                    shift(a: number): number { return a + 10; }
                    scale(a: number): number { return a * 1; }
                    async main(): Promise<number> {
                        for (let i: number = 0; true; i++) {
                            print(shift(scale(i)));
                            await sleep_seconds(1);
                        }
                    }
                }
                "#,
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn signature_ignores_param_names() {
        let prog = counter_program();
        let shift = prog.methods.iter().find(|m| m.name == "shift").unwrap();
        assert_eq!(signature_string(shift), "int32_t(int32_t)");
    }

    #[test]
    fn hotreload_tu_emits_extern_c_function() {
        let prog = counter_program();
        let shift = prog.methods.iter().find(|m| m.name == "shift").unwrap();
        let tu = emit_hotreload_tu(&prog, shift).unwrap();
        assert!(tu.contains("extern \"C\" int32_t shift(int32_t a) {"));
        assert!(tu.contains("return (a + 10);"));
        assert!(!tu.contains("_cell"));
    }

    #[test]
    fn main_tu_orders_static_then_hotreload_then_main() {
        let prog = counter_program();
        let paths = |name: &str| UnitPaths {
            lib: Box::leak(Box::new(PathBuf::from(format!("/tmp/{name}.lib")))),
            copy: Box::leak(Box::new(PathBuf::from(format!("/tmp/{name}.copy")))),
            lock: Box::leak(Box::new(PathBuf::from(format!("/tmp/{name}.lock")))),
        };
        let tu = emit_main_tu(&prog, &paths).unwrap();
        let scale_pos = tu.find("int32_t scale(int32_t a) {").unwrap();
        let cell_pos = tu.find("shift_cell").unwrap();
        let main_pos = tu.find("int main()").unwrap();
        assert!(scale_pos < cell_pos);
        assert!(cell_pos < main_pos);
        assert!(tu.contains("shift_cell.get()(scale(i))"));
    }

    #[test]
    fn deterministic_emission_is_byte_identical() {
        let prog = counter_program();
        let paths = |name: &str| UnitPaths {
            lib: Box::leak(Box::new(PathBuf::from(format!("/tmp/{name}.lib")))),
            copy: Box::leak(Box::new(PathBuf::from(format!("/tmp/{name}.copy")))),
            lock: Box::leak(Box::new(PathBuf::from(format!("/tmp/{name}.lock")))),
        };
        let a = emit_main_tu(&prog, &paths).unwrap();
        let b = emit_main_tu(&prog, &paths).unwrap();
        assert_eq!(a, b);
    }
}
