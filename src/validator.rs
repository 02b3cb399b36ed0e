//! V: enforces the DSL subset, classifies methods, and rewrites `self.x`
//! property access to plain identifiers.
//!
//! This runs after a successful parse. Everything it rejects is fatal
//! before the binary starts, and merely logged-and-ignored when it happens
//! during a reload-time re-parse (spec.md §7) — that policy lives in `W`,
//! not here: `validate` always returns a hard error, the caller decides
//! what to do with it.

use std::collections::HashSet;

use crate::ast::*;
use crate::error::ValidationError;

/// How a method participates in the reload scheme, per spec.md §2's L/V
/// split ("classifies methods into `main`, `hotreload`, `static`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRole {
    /// The program's single entry point (named `main`).
    Main,
    /// Carries `@reload`; gets a `HotReload<Sig>` cell and its own TU.
    Hotreload,
    /// Neither `main` nor `@reload`; lowered as a plain free function.
    Static,
}

/// Classifies `method` into its `MethodRole` by name and annotation.
pub fn classify(method: &Method) -> MethodRole {
    if method.name == "main" {
        MethodRole::Main
    } else if method.reloadable {
        MethodRole::Hotreload
    } else {
        MethodRole::Static
    }
}

fn err(msg: impl Into<String>) -> ValidationError {
    ValidationError(msg.into())
}

/// Validates `prog` in place and returns the program with every
/// `SelfProp`/`SelfCall` rewritten to `Ident`/`Call`.
pub fn validate(mut prog: Program) -> Result<Program, ValidationError> {
    if prog.base_name != "HotReloadProgram" {
        return Err(err(format!(
            "class {} must extend HotReloadProgram, found extends {}",
            prog.class_name, prog.base_name
        )));
    }

    let method_names: HashSet<String> = prog.methods.iter().map(|m| m.name.clone()).collect();
    if method_names.len() != prog.methods.len() {
        return Err(err("duplicate method name in program class"));
    }

    for name in &method_names {
        if !is_valid_c_abi_symbol(name) {
            return Err(err(format!("method name {name:?} is not a valid external symbol")));
        }
    }

    let mains: Vec<&Method> = prog.methods.iter().filter(|m| m.name == "main").collect();
    if mains.len() != 1 {
        return Err(err(format!(
            "program must declare exactly one method named main, found {}",
            mains.len()
        )));
    }
    let main = mains[0];
    if main.reloadable {
        return Err(err("main must not carry the @reload annotation"));
    }
    if !main.params.is_empty() {
        return Err(err("main must take no parameters"));
    }

    for m in &prog.methods {
        if is_host_api(&m.name) {
            return Err(err(format!(
                "method name {:?} shadows a host API function",
                m.name
            )));
        }
    }

    for m in &mut prog.methods {
        for stmt in &mut m.body {
            rewrite_self_stmt(stmt, &method_names)?;
        }
    }

    for m in &prog.methods {
        for stmt in &m.body {
            check_calls_stmt(stmt, &method_names)?;
        }
    }

    Ok(prog)
}

fn is_valid_c_abi_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn rewrite_self_stmt(stmt: &mut Stmt, methods: &HashSet<String>) -> Result<(), ValidationError> {
    match stmt {
        Stmt::Block(stmts) => {
            for s in stmts {
                rewrite_self_stmt(s, methods)?;
            }
        }
        Stmt::While(cond, body) => {
            rewrite_self_expr(cond, methods)?;
            rewrite_self_stmt(body, methods)?;
        }
        Stmt::For { init, cond, step, body } => {
            if let Some(init) = init {
                rewrite_self_stmt(init, methods)?;
            }
            if let Some(cond) = cond {
                rewrite_self_expr(cond, methods)?;
            }
            if let Some(step) = step {
                rewrite_self_expr(step, methods)?;
            }
            rewrite_self_stmt(body, methods)?;
        }
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                rewrite_self_expr(init, methods)?;
            }
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                rewrite_self_expr(value, methods)?;
            }
        }
        Stmt::Expr(e) => rewrite_self_expr(e, methods)?,
    }
    Ok(())
}

fn rewrite_self_expr(expr: &mut Expr, methods: &HashSet<String>) -> Result<(), ValidationError> {
    match expr {
        Expr::SelfProp(name) => {
            if !methods.contains(name) {
                return Err(err(format!("self.{name} does not refer to a method of this class")));
            }
            let name = std::mem::take(name);
            *expr = Expr::Ident(name);
        }
        Expr::SelfCall(name, args) => {
            if !methods.contains(name) {
                return Err(err(format!("self.{name} does not refer to a method of this class")));
            }
            for a in args.iter_mut() {
                rewrite_self_expr(a, methods)?;
            }
            let name = std::mem::take(name);
            let args = std::mem::take(args);
            *expr = Expr::Call(name, args);
        }
        Expr::Call(_, args) => {
            for a in args.iter_mut() {
                rewrite_self_expr(a, methods)?;
            }
        }
        Expr::Binary(_, lhs, rhs) => {
            rewrite_self_expr(lhs, methods)?;
            rewrite_self_expr(rhs, methods)?;
        }
        Expr::PrefixUnary(_, inner) | Expr::PostfixUnary(_, inner) | Expr::Await(inner) => {
            rewrite_self_expr(inner, methods)?;
        }
        Expr::IntLit(_) | Expr::BoolLit(_) | Expr::Ident(_) => {}
    }
    Ok(())
}

fn check_calls_stmt(stmt: &Stmt, methods: &HashSet<String>) -> Result<(), ValidationError> {
    match stmt {
        Stmt::Block(stmts) => {
            for s in stmts {
                check_calls_stmt(s, methods)?;
            }
        }
        Stmt::While(cond, body) => {
            check_calls_expr(cond, methods)?;
            check_calls_stmt(body, methods)?;
        }
        Stmt::For { init, cond, step, body } => {
            if let Some(init) = init {
                check_calls_stmt(init, methods)?;
            }
            if let Some(cond) = cond {
                check_calls_expr(cond, methods)?;
            }
            if let Some(step) = step {
                check_calls_expr(step, methods)?;
            }
            check_calls_stmt(body, methods)?;
        }
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                check_calls_expr(init, methods)?;
            }
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                check_calls_expr(value, methods)?;
            }
        }
        Stmt::Expr(e) => check_calls_expr(e, methods)?,
    }
    Ok(())
}

fn check_calls_expr(expr: &Expr, methods: &HashSet<String>) -> Result<(), ValidationError> {
    match expr {
        Expr::Call(name, args) => {
            if !methods.contains(name) && !is_host_api(name) {
                return Err(err(format!("call to undeclared function {name:?}")));
            }
            for a in args {
                check_calls_expr(a, methods)?;
            }
        }
        Expr::SelfProp(_) | Expr::SelfCall(_, _) => {
            unreachable!("self-access must be rewritten before call-checking runs")
        }
        Expr::Binary(_, lhs, rhs) => {
            check_calls_expr(lhs, methods)?;
            check_calls_expr(rhs, methods)?;
        }
        Expr::PrefixUnary(_, inner) | Expr::PostfixUnary(_, inner) | Expr::Await(inner) => {
            check_calls_expr(inner, methods)?;
        }
        Expr::IntLit(_) | Expr::BoolLit(_) | Expr::Ident(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn accepts_counter_program() {
        let prog = parse(
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
        .unwrap();
        let validated = validate(prog.clone()).unwrap();
        assert_eq!(validated.methods.len(), prog.methods.len());
    }

    #[test]
    fn rejects_missing_main() {
        let prog = parse("class Program extends HotReloadProgram { f(): number { return 1; } }").unwrap();
        let err = validate(prog).unwrap_err();
        assert!(err.0.contains("exactly one method named main"));
    }

    #[test]
    fn rejects_main_with_params() {
        let prog = parse(
            "class Program extends HotReloadProgram { main(x: number): number { return x; } }",
        )
        .unwrap();
        let err = validate(prog).unwrap_err();
        assert!(err.0.contains("no parameters"));
    }

    #[test]
    fn rejects_wrong_base_class() {
        let prog = parse("class Program extends Widget { main(): number { return 1; } }").unwrap();
        let err = validate(prog).unwrap_err();
        assert!(err.0.contains("HotReloadProgram"));
    }

    #[test]
    fn rewrites_self_access() {
        let prog = parse(
            r#"
            class Program extends HotReloadProgram {
                helper(): number { return 1; }
                main(): number { return self.helper(); }
            }
            "#,
        )
        .unwrap();
        let validated = validate(prog).unwrap();
        let main = validated.methods.iter().find(|m| m.name == "main").unwrap();
        assert_eq!(main.body[0], Stmt::Return(Some(Expr::Call("helper".into(), vec![]))));
    }

    #[test]
    fn rejects_self_access_to_unknown_method() {
        let prog = parse(
            "class Program extends HotReloadProgram { main(): number { return self.nope(); } }",
        )
        .unwrap();
        let err = validate(prog).unwrap_err();
        assert!(err.0.contains("self.nope"));
    }

    #[test]
    fn rejects_call_to_undeclared_function() {
        let prog = parse(
            "class Program extends HotReloadProgram { main(): number { return mystery(); } }",
        )
        .unwrap();
        let err = validate(prog).unwrap_err();
        assert!(err.0.contains("mystery"));
    }
}
