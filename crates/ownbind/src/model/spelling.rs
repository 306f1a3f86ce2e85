//! Native type spellings
//!
//! Turns spellings such as `const Foo *`, `Foo&`, `char ****` or
//! `PointerHolder<Zbr>` into [`TypeShape`]s. Only the structure matters:
//! cv-qualifiers on the pointee are kept, `const` on a pointer itself is
//! dropped, and qualified names (`std::string`) are kept verbatim.

use std::iter::Peekable;
use std::str::Chars;

use crate::context::ClassifyContext;
use crate::error::ModelError;

use super::TypeShape;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Const,
    Star,
    Amp,
    Lt,
    Gt,
    Comma,
}

impl TypeShape {
    /// Parse a native type spelling.
    ///
    /// # Errors
    ///
    /// `UnresolvedType` when the spelling is empty, unbalanced, or uses a
    /// template that is not a known holder.
    pub fn parse(spelling: &str, ctx: &ClassifyContext) -> Result<TypeShape, ModelError> {
        let tokens = tokenize(spelling)?;
        let mut parser = Parser {
            spelling,
            tokens,
            pos: 0,
            ctx,
        };
        let shape = parser.parse_type()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing tokens"));
        }
        Ok(shape)
    }
}

fn tokenize(spelling: &str) -> Result<Vec<Token>, ModelError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Chars<'_>> = spelling.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '&' => {
                chars.next();
                tokens.push(Token::Amp);
            }
            '<' => {
                chars.next();
                tokens.push(Token::Lt);
            }
            '>' => {
                chars.next();
                tokens.push(Token::Gt);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            c if c.is_alphanumeric() || c == '_' || c == ':' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == ':' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "const" => tokens.push(Token::Const),
                    // Elaborated type specifiers carry no structure
                    "struct" | "class" | "volatile" => {}
                    _ => tokens.push(Token::Word(word)),
                }
            }
            other => {
                return Err(ModelError::UnresolvedType {
                    spelling: spelling.to_string(),
                    reason: format!("unexpected character `{}`", other),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    spelling: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a ClassifyContext,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> ModelError {
        ModelError::UnresolvedType {
            spelling: self.spelling.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_type(&mut self) -> Result<TypeShape, ModelError> {
        let leading_const = self.eat(&Token::Const);
        let mut shape = self.parse_base()?;
        let mut pointee_const = leading_const | self.eat(&Token::Const);

        loop {
            if self.eat(&Token::Star) {
                shape = TypeShape::Pointer {
                    inner: Box::new(shape),
                    is_const: pointee_const,
                };
                // `T * const` makes this pointer const, which is the
                // pointee of the next indirection
                pointee_const = self.eat(&Token::Const);
            } else if self.eat(&Token::Amp) {
                shape = TypeShape::Reference {
                    inner: Box::new(shape),
                    is_const: pointee_const,
                };
                pointee_const = false;
            } else {
                return Ok(shape);
            }
        }
    }

    fn parse_base(&mut self) -> Result<TypeShape, ModelError> {
        let mut words = Vec::new();
        while let Some(Token::Word(word)) = self.peek() {
            words.push(word.clone());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(self.error("expected a type name"));
        }
        let name = words.join(" ");

        if !self.eat(&Token::Lt) {
            return Ok(TypeShape::Value { name });
        }

        if words.len() != 1 || !self.ctx.is_holder(&name) {
            return Err(self.error(format!("unknown holder `{}`", name)));
        }
        let inner = self.parse_type()?;
        if self.peek() == Some(&Token::Comma) {
            return Err(self.error(format!("holder `{}` takes exactly one type", name)));
        }
        if !self.eat(&Token::Gt) {
            return Err(self.error("unbalanced `<`"));
        }

        Ok(TypeShape::Wrapper {
            holder: name,
            inner: Box::new(inner),
        })
    }
}
