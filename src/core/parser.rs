//! Recursive-descent parser for `.ms` manifests.
//!
//! `parse` lexes and parses one file and, only on success, merges the
//! file's classes, defines and nodes into the shared collector. A failed
//! file therefore contributes nothing.

use crate::ast::*;
use crate::core::lexer::{self, Token, TokenKind};
use crate::error::ParseError;

/// Parse `source` as `filename` and accumulate the result into `manifest`.
pub fn parse(manifest: &mut Manifest, filename: &str, source: &str) -> Result<(), ParseError> {
    let tokens = lexer::tokenize(filename, source)?;
    let mut parser = Parser {
        file: filename,
        tokens: &tokens,
        pos: 0,
    };
    let parsed = parser.parse_file()?;

    manifest.classes.extend(parsed.classes);
    manifest.defines.extend(parsed.defines);
    manifest.nodes.extend(parsed.nodes);
    Ok(())
}

struct Parser<'a> {
    file: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    // ── Token helpers ───────────────────────────────────────────────

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn bump(&mut self) -> TokenKind {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            file: self.file.to_string(),
            line: self.line(),
            message,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if *self.peek() == kind {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", what, describe(self.peek()))))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.error(format!("expected {}, found {}", what, describe(&other)))),
        }
    }

    // ── Top level ───────────────────────────────────────────────────

    fn parse_file(&mut self) -> Result<Manifest, ParseError> {
        let mut manifest = Manifest::new();

        loop {
            let word = match self.peek() {
                TokenKind::Eof => return Ok(manifest),
                TokenKind::Ident(word) => word.clone(),
                other => {
                    return Err(self.error(format!(
                        "expected 'class', 'define' or 'node', found {}",
                        describe(other)
                    )))
                }
            };

            match word.as_str() {
                "class" => manifest.classes.push(self.parse_class()?),
                "define" => manifest.defines.push(self.parse_define()?),
                "node" => manifest.nodes.push(self.parse_node()?),
                other => {
                    return Err(self.error(format!(
                        "expected 'class', 'define' or 'node', found '{}'",
                        other
                    )))
                }
            }
        }
    }

    fn parse_class(&mut self) -> Result<Class, ParseError> {
        let line = self.line();
        self.bump(); // 'class'
        let name = self.expect_ident("class name")?;

        let params = if *self.peek() == TokenKind::LParen {
            self.parse_params()?
        } else {
            Vec::new()
        };

        let body = self.parse_block()?;
        Ok(Class {
            file: self.file.to_string(),
            line,
            name,
            params,
            body,
        })
    }

    fn parse_define(&mut self) -> Result<Define, ParseError> {
        let line = self.line();
        self.bump(); // 'define'

        let kind = match self.expect_ident("'single' or 'multiple'")?.as_str() {
            "single" => DefineKind::Single,
            "multiple" => DefineKind::Multiple,
            other => {
                return Err(
                    self.error(format!("expected 'single' or 'multiple', found '{}'", other))
                )
            }
        };

        let name = self.expect_ident("type name")?;
        if *self.peek() != TokenKind::LParen {
            return Err(self.error(format!(
                "expected parameter list, found {}",
                describe(self.peek())
            )));
        }
        let params = self.parse_params()?;
        let body = self.parse_block()?;

        Ok(Define {
            file: self.file.to_string(),
            line,
            name,
            kind,
            params,
            body,
        })
    }

    fn parse_node(&mut self) -> Result<Node, ParseError> {
        let line = self.line();
        self.bump(); // 'node'

        let name = match self.peek().clone() {
            TokenKind::Str(s) => {
                self.bump();
                s
            }
            other => {
                return Err(self.error(format!(
                    "expected quoted node name, found {}",
                    describe(&other)
                )))
            }
        };

        let body = self.parse_block()?;
        Ok(Node {
            file: self.file.to_string(),
            line,
            name,
            body,
        })
    }

    /// `( $a = default, $b, )` — every parameter is comma-terminated.
    fn parse_params(&mut self) -> Result<Vec<VariableDef>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();

        loop {
            match self.peek().clone() {
                TokenKind::RParen => {
                    self.bump();
                    return Ok(params);
                }
                TokenKind::Var(name) => {
                    let line = self.line();
                    self.bump();
                    let value = if *self.peek() == TokenKind::Assign {
                        self.bump();
                        Some(self.parse_value()?)
                    } else {
                        None
                    };
                    self.expect(TokenKind::Comma, "','")?;
                    params.push(VariableDef {
                        line,
                        name: VariableName { line, name },
                        value,
                    });
                }
                other => {
                    return Err(self.error(format!(
                        "expected parameter or ')', found {}",
                        describe(&other)
                    )))
                }
            }
        }
    }

    // ── Blocks and statements ───────────────────────────────────────

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let line = self.line();
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut statements = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RBrace => {
                    self.bump();
                    return Ok(Block {
                        file: self.file.to_string(),
                        line,
                        statements,
                    });
                }
                TokenKind::Var(name) => {
                    let line = self.line();
                    self.bump();
                    self.expect(TokenKind::Assign, "'='")?;
                    let value = self.parse_value()?;
                    statements.push(Statement::Var(VariableDef {
                        line,
                        name: VariableName { line, name },
                        value: Some(value),
                    }));
                }
                TokenKind::Ident(word) if word == "if" => {
                    statements.push(Statement::If(self.parse_if()?));
                }
                TokenKind::Ident(_) => {
                    statements.push(Statement::Decl(self.parse_declaration()?));
                }
                other => {
                    return Err(self.error(format!(
                        "expected statement or '}}', found {}",
                        describe(&other)
                    )))
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<If, ParseError> {
        let line = self.line();
        self.bump(); // 'if'
        let condition = self.parse_value()?;
        let then_block = self.parse_block()?;

        let else_block = if matches!(self.peek(), TokenKind::Ident(w) if w == "else") {
            self.bump();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(If {
            line,
            condition,
            then_block,
            else_block,
        })
    }

    /// `type { scalar: prop => value, … }`
    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        let line = self.line();
        let type_name = self.expect_ident("type name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let scalar = self.parse_value()?;
        self.expect(TokenKind::Colon, "':'")?;

        let mut props = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RBrace => {
                    self.bump();
                    return Ok(Declaration {
                        file: self.file.to_string(),
                        line,
                        type_name,
                        scalar,
                        props,
                    });
                }
                TokenKind::Ident(name) => {
                    let line = self.line();
                    self.bump();
                    self.expect(TokenKind::FatArrow, "'=>'")?;
                    let value = self.parse_value()?;
                    self.expect(TokenKind::Comma, "','")?;
                    props.push(Prop { line, name, value });
                }
                other => {
                    return Err(self.error(format!(
                        "expected property or '}}', found {}",
                        describe(&other)
                    )))
                }
            }
        }
    }

    // ── Values and expressions ──────────────────────────────────────
    //
    // Precedence, loosest first: || < && < comparisons < additive <
    // multiplicative. All operators are left-associative.

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Value, ParseError> {
        let mut left = self.parse_and()?;
        while *self.peek() == TokenKind::OrOr {
            let line = self.line();
            self.bump();
            let right = self.parse_and()?;
            left = binary(line, BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, ParseError> {
        let mut left = self.parse_cmp()?;
        while *self.peek() == TokenKind::AndAnd {
            let line = self.line();
            self.bump();
            let right = self.parse_cmp()?;
            left = binary(line, BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Value, ParseError> {
        let mut left = self.parse_add()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.parse_add()?;
            left = binary(line, op, left, right);
        }
    }

    fn parse_add(&mut self) -> Result<Value, ParseError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.parse_mul()?;
            left = binary(line, op, left, right);
        }
    }

    fn parse_mul(&mut self) -> Result<Value, ParseError> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.parse_primary()?;
            left = binary(line, op, left, right);
        }
    }

    fn parse_primary(&mut self) -> Result<Value, ParseError> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Int(n) => {
                self.bump();
                Ok(Value::Int(n))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Value::Str(s))
            }
            TokenKind::Interp(segments) => {
                self.bump();
                Ok(Value::Interpolated(InterpolatedString { line, segments }))
            }
            TokenKind::Var(name) => {
                self.bump();
                Ok(Value::Var(VariableName { line, name }))
            }
            TokenKind::Ident(word) => {
                if word == "true" {
                    self.bump();
                    Ok(Value::Bool(true))
                } else if word == "false" {
                    self.bump();
                    Ok(Value::Bool(false))
                } else {
                    // Any other identifier in value position must open a
                    // reference: `type[scalar]`.
                    self.bump();
                    self.expect(TokenKind::LBracket, "'['")?;
                    let scalar = self.parse_value()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    Ok(Value::Ref(Reference {
                        line,
                        type_name: word,
                        scalar: Box::new(scalar),
                    }))
                }
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    if *self.peek() == TokenKind::RBracket {
                        self.bump();
                        return Ok(Value::Array(items));
                    }
                    items.push(self.parse_value()?);
                    self.expect(TokenKind::Comma, "','")?;
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_value()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(self.error(format!("expected value, found {}", describe(&other)))),
        }
    }
}

fn binary(line: u32, op: BinOp, left: Value, right: Value) -> Value {
    Value::Expr(Box::new(Expression {
        line,
        op,
        left,
        right,
    }))
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(s) => format!("'{}'", s),
        TokenKind::Var(s) => format!("'{}'", s),
        TokenKind::Int(n) => format!("'{}'", n),
        TokenKind::Str(_) => "quoted string".to_string(),
        TokenKind::Interp(_) => "interpolated string".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Colon => "':'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Assign => "'='".to_string(),
        TokenKind::FatArrow => "'=>'".to_string(),
        TokenKind::Plus => "'+'".to_string(),
        TokenKind::Minus => "'-'".to_string(),
        TokenKind::Star => "'*'".to_string(),
        TokenKind::Slash => "'/'".to_string(),
        TokenKind::EqEq => "'=='".to_string(),
        TokenKind::NotEq => "'!='".to_string(),
        TokenKind::Lt => "'<'".to_string(),
        TokenKind::Le => "'<='".to_string(),
        TokenKind::Gt => "'>'".to_string(),
        TokenKind::Ge => "'>='".to_string(),
        TokenKind::AndAnd => "'&&'".to_string(),
        TokenKind::OrOr => "'||'".to_string(),
        TokenKind::Eof => "end of file".to_string(),
    }
}
