//! Recursive-descent parser: `Vec<Spanned>` → `Program`.
//!
//! Precedence (lowest to highest): additive (`+ -`) → multiplicative
//! (`* /`) → prefix (`++ -- + -`, `await`) → postfix (`++ --`) → primary.
//! This mirrors the expression subset in `SPEC_FULL.md` §4.1 exactly —
//! there is no comparison or assignment operator in the grammar, so that
//! precedence level simply doesn't exist here.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{lex, Spanned, Token};

/// Lexes and parses `src` into a `Program`. Does not run V — callers must
/// pass the result to `validator::validate` before lowering.
pub fn parse(src: &str) -> Result<Program, ParseError> {
    let tokens = lex(src)?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.offset(), message)
    }

    fn expect(&mut self, want: &Token) -> Result<(), ParseError> {
        if self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {want:?}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError::new(self.offset(), format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        self.expect(&Token::KwClass)?;
        let class_name = self.expect_ident()?;
        self.expect(&Token::KwExtends)?;
        let base_name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;

        let mut methods = Vec::new();
        while self.peek() != &Token::RBrace {
            methods.push(self.parse_method()?);
        }
        self.expect(&Token::RBrace)?;

        if self.peek() != &Token::Eof {
            return Err(self.err("unexpected trailing content after class body"));
        }

        Ok(Program {
            class_name,
            base_name,
            methods,
        })
    }

    fn parse_method(&mut self) -> Result<Method, ParseError> {
        let reloadable = if self.peek() == &Token::At {
            self.advance();
            let marker = self.expect_ident()?;
            if marker != "reload" {
                return Err(self.err(format!("unsupported annotation @{marker}")));
            }
            true
        } else {
            false
        };

        let is_async = if self.peek() == &Token::KwAsync {
            self.advance();
            true
        } else {
            false
        };

        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while self.peek() != &Token::RParen {
            let pname = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let ty = self.parse_type(false)?;
            params.push((pname, ty));
            if self.peek() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        self.expect(&Token::Colon)?;
        let ret = Some(self.parse_type(true)?);

        let body = self.parse_block()?;

        Ok(Method {
            name,
            params,
            ret,
            body: match body {
                Stmt::Block(stmts) => stmts,
                _ => unreachable!("parse_block always returns Stmt::Block"),
            },
            reloadable,
            is_async,
        })
    }

    /// `allow_promise` is only true for return-type position, per spec.md
    /// §4.1's `Promise<number>` exception.
    fn parse_type(&mut self, allow_promise: bool) -> Result<Type, ParseError> {
        let name = self.expect_ident()?;
        match name.as_str() {
            "number" => Ok(Type::Number),
            "Promise" if allow_promise => {
                self.expect(&Token::Lt)?;
                let inner = self.expect_ident()?;
                if inner != "number" {
                    return Err(self.err(format!("unsupported type Promise<{inner}>")));
                }
                self.expect(&Token::Gt)?;
                Ok(Type::Number)
            }
            other => Err(self.err(format!("unsupported type {other}"))),
        }
    }

    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while self.peek() != &Token::RBrace {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(Stmt::Block(stmts))
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::LBrace => self.parse_block(),
            Token::KwWhile => self.parse_while(),
            Token::KwFor => self.parse_for(),
            Token::KwLet => self.parse_var_decl(),
            Token::KwReturn => self.parse_return(),
            _ => {
                let e = self.parse_expr()?;
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::KwWhile)?;
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::While(cond, Box::new(body)))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::KwFor)?;
        self.expect(&Token::LParen)?;

        let init = if self.peek() == &Token::Semicolon {
            None
        } else if self.peek() == &Token::KwLet {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let e = self.parse_expr()?;
            self.expect(&Token::Semicolon)?;
            Some(Box::new(Stmt::Expr(e)))
        };
        if init.is_none() {
            self.expect(&Token::Semicolon)?;
        }

        let cond = if self.peek() == &Token::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semicolon)?;

        let step = if self.peek() == &Token::RParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::RParen)?;

        let body = self.parse_stmt()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body: Box::new(body),
        })
    }

    /// Parses `let name[: type][= expr];` — the trailing `;` is consumed
    /// here too since `for`'s init slot reuses this without a separate
    /// statement wrapper.
    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::KwLet)?;
        let name = self.expect_ident()?;
        let ty = if self.peek() == &Token::Colon {
            self.advance();
            Some(self.parse_type(false)?)
        } else {
            None
        };
        let init = if self.peek() == &Token::Eq {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Token::Semicolon)?;
        Ok(Stmt::VarDecl { name, ty, init })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::KwReturn)?;
        let value = if self.peek() == &Token::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semicolon)?;
        Ok(Stmt::Return(value))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_prefix()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::KwAwait => {
                self.advance();
                let inner = self.parse_prefix()?;
                Ok(Expr::Await(Box::new(inner)))
            }
            Token::PlusPlus => {
                self.advance();
                Ok(Expr::PrefixUnary(UnOp::Inc, Box::new(self.parse_prefix()?)))
            }
            Token::MinusMinus => {
                self.advance();
                Ok(Expr::PrefixUnary(UnOp::Dec, Box::new(self.parse_prefix()?)))
            }
            Token::Plus => {
                self.advance();
                Ok(Expr::PrefixUnary(UnOp::Pos, Box::new(self.parse_prefix()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::PrefixUnary(UnOp::Neg, Box::new(self.parse_prefix()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::PlusPlus => {
                    self.advance();
                    e = Expr::PostfixUnary(UnOp::Inc, Box::new(e));
                }
                Token::MinusMinus => {
                    self.advance();
                    e = Expr::PostfixUnary(UnOp::Dec, Box::new(e));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::IntLit(n)),
            Token::KwTrue => Ok(Expr::BoolLit(true)),
            Token::KwFalse => Ok(Expr::BoolLit(false)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if name == "self" => {
                self.expect(&Token::Dot)?;
                let prop = self.expect_ident()?;
                if self.peek() == &Token::LParen {
                    let args = self.parse_call_args()?;
                    Ok(Expr::SelfCall(prop, args))
                } else {
                    Ok(Expr::SelfProp(prop))
                }
            }
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(ParseError::new(self.offset(), format!("unexpected token {other:?}"))),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        while self.peek() != &Token::RParen {
            args.push(self.parse_expr()?);
            if self.peek() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER_SRC: &str = r#"
        class Program extends HotReloadProgram {
            @reload
            shift(a: number): number {
                return a + 10;
            }

            scale(a: number): number {
                return a * 1;
            }

            async main(): Promise<number> {
                for (let i: number = 0; true; i++) {
                    print(shift(scale(i)));
                    await sleep_seconds(1);
                }
            }
        }
    "#;

    #[test]
    fn parses_counter_program() {
        let prog = parse(COUNTER_SRC).unwrap();
        assert_eq!(prog.class_name, "Program");
        assert_eq!(prog.base_name, "HotReloadProgram");
        assert_eq!(prog.methods.len(), 3);
        assert!(prog.methods[0].reloadable);
        assert!(!prog.methods[1].reloadable);
        let main = &prog.methods[2];
        assert_eq!(main.name, "main");
        assert!(main.is_async);
        assert_eq!(main.params.len(), 0);
    }

    #[test]
    fn rejects_unsupported_annotation() {
        let src = "class Program extends HotReloadProgram { @inline f(): number { return 1; } }";
        let err = parse(src).unwrap_err();
        assert!(err.message.contains("@inline"));
    }

    #[test]
    fn parses_self_call_and_prop() {
        let src = r#"
            class Program extends HotReloadProgram {
                helper(): number { return 1; }
                main(): number {
                    return self.helper() + self.helper();
                }
            }
        "#;
        let prog = parse(src).unwrap();
        let body = &prog.methods[1].body;
        match &body[0] {
            Stmt::Return(Some(Expr::Binary(BinOp::Add, lhs, rhs))) => {
                assert!(matches!(**lhs, Expr::SelfCall(ref n, _) if n == "helper"));
                assert!(matches!(**rhs, Expr::SelfCall(ref n, _) if n == "helper"));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn rejects_field_declaration() {
        // Fields aren't part of the grammar at all: a bare `name: type;` at
        // class scope fails to parse as a method (no parameter list).
        let src = "class Program extends HotReloadProgram { x: number; }";
        assert!(parse(src).is_err());
    }
}
