//! Tokenizer for the DSL surface syntax described in `SPEC_FULL.md` §4.1.
//!
//! Hand-written rather than pulled from a crate: the grammar is small and
//! fixed (one class, a handful of statement/expression forms), and nothing
//! in the retrieval pack reaches for a lexer-generator crate for a surface
//! this narrow.

use crate::error::ParseError;

/// A single lexical token produced by the tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An identifier that isn't one of the reserved keywords below.
    Ident(String),
    /// A decimal integer literal.
    Number(i32),
    /// `class`
    KwClass,
    /// `extends`
    KwExtends,
    /// `async`
    KwAsync,
    /// `await`
    KwAwait,
    /// `let`
    KwLet,
    /// `while`
    KwWhile,
    /// `for`
    KwFor,
    /// `return`
    KwReturn,
    /// `true`
    KwTrue,
    /// `false`
    KwFalse,
    /// `@`
    At,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    /// `=`
    Eq,
    /// `<`, used only in `Promise<number>`.
    Lt,
    /// `>`, used only in `Promise<number>`.
    Gt,
    /// End of input.
    Eof,
}

/// A token paired with the byte offset it started at, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token itself.
    pub token: Token,
    /// The byte offset in the source where this token starts.
    pub offset: usize,
}

/// Tokenizes `src` into a `Vec<Spanned>`, always terminated by `Token::Eof`.
pub fn lex(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = src.as_bytes();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let start = i;

        if c.is_ascii_digit() {
            let mut end = i;
            while end < bytes.len() && (bytes[end] as char).is_ascii_digit() {
                end += 1;
            }
            let text = &src[start..end];
            let value: i32 = text
                .parse()
                .map_err(|_| ParseError::new(start, format!("invalid numeric literal {text:?}")))?;
            out.push(Spanned {
                token: Token::Number(value),
                offset: start,
            });
            i = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = i;
            while end < bytes.len() && ((bytes[end] as char).is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            let text = &src[start..end];
            let token = match text {
                "class" => Token::KwClass,
                "extends" => Token::KwExtends,
                "async" => Token::KwAsync,
                "await" => Token::KwAwait,
                "let" => Token::KwLet,
                "while" => Token::KwWhile,
                "for" => Token::KwFor,
                "return" => Token::KwReturn,
                "true" => Token::KwTrue,
                "false" => Token::KwFalse,
                _ => Token::Ident(text.to_string()),
            };
            out.push(Spanned { token, offset: start });
            i = end;
            continue;
        }

        macro_rules! push {
            ($tok:expr, $len:expr) => {{
                out.push(Spanned {
                    token: $tok,
                    offset: start,
                });
                i += $len;
            }};
        }

        match c {
            '@' => push!(Token::At, 1),
            '{' => push!(Token::LBrace, 1),
            '}' => push!(Token::RBrace, 1),
            '(' => push!(Token::LParen, 1),
            ')' => push!(Token::RParen, 1),
            ',' => push!(Token::Comma, 1),
            ':' => push!(Token::Colon, 1),
            ';' => push!(Token::Semicolon, 1),
            '.' => push!(Token::Dot, 1),
            '=' => push!(Token::Eq, 1),
            '<' => push!(Token::Lt, 1),
            '>' => push!(Token::Gt, 1),
            '+' if bytes.get(i + 1) == Some(&b'+') => push!(Token::PlusPlus, 2),
            '-' if bytes.get(i + 1) == Some(&b'-') => push!(Token::MinusMinus, 2),
            '+' => push!(Token::Plus, 1),
            '-' => push!(Token::Minus, 1),
            '*' => push!(Token::Star, 1),
            '/' => push!(Token::Slash, 1),
            other => {
                return Err(ParseError::new(start, format!("unexpected character {other:?}")));
            }
        }
    }

    out.push(Spanned {
        token: Token::Eof,
        offset: bytes.len(),
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_keywords_and_punctuation() {
        let toks = lex("@reload shift(a: number): number { return a + 10; }").unwrap();
        let kinds: Vec<&Token> = toks.iter().map(|s| &s.token).collect();
        assert_eq!(kinds[0], &Token::At);
        assert_eq!(kinds[1], &Token::Ident("reload".into()));
        assert!(kinds.contains(&&Token::KwReturn));
        assert!(kinds.contains(&&Token::Plus));
        assert_eq!(*kinds.last().unwrap(), &Token::Eof);
    }

    #[test]
    fn lexes_increment_before_plus() {
        let toks = lex("i++ + 1").unwrap();
        assert_eq!(toks[0].token, Token::Ident("i".into()));
        assert_eq!(toks[1].token, Token::PlusPlus);
        assert_eq!(toks[2].token, Token::Plus);
    }

    #[test]
    fn skips_line_comments() {
        let toks = lex("// hello\nlet x: number = 1;").unwrap();
        assert_eq!(toks[0].token, Token::KwLet);
    }

    #[test]
    fn rejects_unknown_character() {
        let err = lex("let x = 1 $ 2;").unwrap_err();
        assert!(err.message.contains('$'));
    }
}
