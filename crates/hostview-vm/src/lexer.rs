//! Lexer for the hostview script language.
//!
//! Built on logos; the compiler consumes the flat token vector produced by
//! [`tokenize`].

use crate::{VmError, VmResult};
use logos::Logos;

/// Script tokens
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    // Whitespace (skip)
    #[regex(r"[ \t\r\n]+", logos::skip)]
    Whitespace,

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    // Keywords (must come before identifiers)
    #[token("func")]
    Func,

    #[token("return")]
    Return,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("while")]
    While,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    Str(String),

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<=")]
    LtEq,

    #[token(">=")]
    GtEq,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("=")]
    Assign,

    #[token("!")]
    Bang,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,
}

fn unescape(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }
    Some(out)
}

/// A token with its 1-based source line
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token
    pub token: Token,
    /// Line the token starts on
    pub line: usize,
}

/// Split source into tokens.
///
/// # Errors
///
/// Returns `VmError::CompileError` at the first unrecognized character or
/// malformed literal.
pub fn tokenize(source: &str) -> VmResult<Vec<Spanned>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut last_end = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[last_end..span.start].matches('\n').count();
        last_end = span.start;

        match result {
            Ok(token) => tokens.push(Spanned { token, line }),
            Err(()) => {
                return Err(VmError::CompileError {
                    line,
                    message: format!("Unexpected input '{}'", lexer.slice()),
                })
            }
        }
    }

    Ok(tokens)
}
