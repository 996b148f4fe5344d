//! Tokenizer for `.ms` manifest source.
//!
//! Produces a flat token stream with line numbers. Double-quoted strings
//! are segmented here: each becomes an ordered list of literal runs and
//! variable splices, so the parser never re-scans string contents.

use crate::ast::{Segment, VariableName};
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    /// `$name`, leading `$` included.
    Var(String),
    Int(i64),
    /// Single-quoted literal.
    Str(String),
    /// Double-quoted string, already segmented.
    Interp(Vec<Segment>),

    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Assign,
    FatArrow,

    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,

    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub line: u32,
    pub kind: TokenKind,
}

struct Lexer<'a> {
    file: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

/// Tokenize a whole source file. The trailing token is always `Eof`.
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lx = Lexer {
        file,
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lx.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            file: self.file.to_string(),
            line: self.line,
            message,
        }
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_ws_and_comments();
        let line = self.line;

        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(Token {
                    line,
                    kind: TokenKind::Eof,
                })
            }
        };

        let kind = match c {
            '{' => self.punct(TokenKind::LBrace),
            '}' => self.punct(TokenKind::RBrace),
            '[' => self.punct(TokenKind::LBracket),
            ']' => self.punct(TokenKind::RBracket),
            '(' => self.punct(TokenKind::LParen),
            ')' => self.punct(TokenKind::RParen),
            ':' => self.punct(TokenKind::Colon),
            ',' => self.punct(TokenKind::Comma),
            '+' => self.punct(TokenKind::Plus),
            '-' => self.punct(TokenKind::Minus),
            '*' => self.punct(TokenKind::Star),
            '/' => self.punct(TokenKind::Slash),
            '=' => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        TokenKind::EqEq
                    }
                    Some('>') => {
                        self.bump();
                        TokenKind::FatArrow
                    }
                    _ => TokenKind::Assign,
                }
            }
            '!' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    return Err(self.error("unexpected character '!'".to_string()));
                }
            }
            '<' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                self.bump();
                if self.peek() == Some('&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    return Err(self.error("unexpected character '&'".to_string()));
                }
            }
            '|' => {
                self.bump();
                if self.peek() == Some('|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    return Err(self.error("unexpected character '|'".to_string()));
                }
            }
            '$' => {
                self.bump();
                let name = self.lex_ident_body()?;
                TokenKind::Var(format!("${}", name))
            }
            '\'' => {
                self.bump();
                let mut s = String::new();
                loop {
                    match self.bump() {
                        Some('\'') => break,
                        Some(ch) => s.push(ch),
                        None => return Err(self.error("unterminated string".to_string())),
                    }
                }
                TokenKind::Str(s)
            }
            '"' => {
                self.bump();
                TokenKind::Interp(self.lex_interpolated()?)
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                    s.push(self.bump().unwrap_or_default());
                }
                let n: i64 = s
                    .parse()
                    .map_err(|_| self.error(format!("integer '{}' out of range", s)))?;
                TokenKind::Int(n)
            }
            c if is_ident_start(c) => {
                let mut s = String::new();
                while matches!(self.peek(), Some(ch) if is_ident_cont(ch)) {
                    s.push(self.bump().unwrap_or_default());
                }
                TokenKind::Ident(s)
            }
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };

        Ok(Token { line, kind })
    }

    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn lex_ident_body(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(c) if is_ident_start(c) => {}
            _ => return Err(self.error("expected identifier after '$'".to_string())),
        }
        let mut s = String::new();
        while matches!(self.peek(), Some(c) if is_ident_cont(c)) {
            s.push(self.bump().unwrap_or_default());
        }
        Ok(s)
    }

    /// Scan a double-quoted string body into segments. Literal runs are
    /// maximal: they extend until a variable splice or the closing quote.
    /// A `$` that does not introduce a splice becomes its own `"$"`
    /// segment and the following text starts a fresh run.
    fn lex_interpolated(&mut self) -> Result<Vec<Segment>, ParseError> {
        let mut segments = Vec::new();
        let mut run = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string".to_string())),
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('$') => {
                    let var_line = self.line;
                    self.bump();
                    match self.peek() {
                        Some(c) if is_ident_start(c) => {
                            flush(&mut segments, &mut run);
                            let name = self.lex_ident_body()?;
                            segments.push(Segment::Var(VariableName {
                                line: var_line,
                                name: format!("${}", name),
                            }));
                        }
                        Some('{') if self.braced_var_follows() => {
                            self.bump();
                            flush(&mut segments, &mut run);
                            let name = self.lex_ident_body()?;
                            self.bump(); // closing '}'
                            segments.push(Segment::Var(VariableName {
                                line: var_line,
                                name: format!("${}", name),
                            }));
                        }
                        _ => {
                            // Literal dollar sign; keeps its own segment.
                            flush(&mut segments, &mut run);
                            segments.push(Segment::Literal("$".to_string()));
                        }
                    }
                }
                Some(_) => {
                    if let Some(c) = self.bump() {
                        run.push(c);
                    }
                }
            }
        }

        flush(&mut segments, &mut run);
        Ok(segments)
    }

    /// True when the cursor sits on `{ident}` (the explicit splice form).
    fn braced_var_follows(&self) -> bool {
        let mut i = 1;
        match self.peek_at(i) {
            Some(c) if is_ident_start(c) => i += 1,
            _ => return false,
        }
        while matches!(self.peek_at(i), Some(c) if is_ident_cont(c)) {
            i += 1;
        }
        self.peek_at(i) == Some('}')
    }
}

fn flush(segments: &mut Vec<Segment>, run: &mut String) {
    if !run.is_empty() {
        segments.push(Segment::Literal(std::mem::take(run)));
    }
}
