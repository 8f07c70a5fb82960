use thiserror::Error;
use tracing::trace;

use crate::ast::*;
use crate::lexer::{Lexer, Span, Token, TokenKind};
use crate::normalize::normalize;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed relation '{input}': {reason}")]
    MalformedRelation { input: String, reason: String },
    #[error("Unexpected token: expected {expected}, found '{found}' at position {span:?}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("Unexpected end of input: expected {0}")]
    UnexpectedEnd(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Invalid character '{text}' at position {span:?}")]
    InvalidCharacter { text: String, span: Span },
    #[error("Empty expression")]
    EmptyExpression,
}

impl ParseError {
    /// True for a missing/duplicated comparator or an empty side, as opposed
    /// to a side that is not valid algebra
    pub fn is_malformed_relation(&self) -> bool {
        matches!(self, ParseError::MalformedRelation { .. })
    }
}

/// Normalize and parse an expression such as `"4x + y"`
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    Parser::expression(&normalize(source))
}

/// Normalize and parse a relation such as `"4x + y <= 10"`
pub fn parse_relation(source: &str) -> Result<Relation, ParseError> {
    Parser::relation(&normalize(source))
}

/// Recursive-descent parser over already normalized text
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a single expression. Comparators are not allowed.
    pub fn expression(source: &str) -> Result<Expr, ParseError> {
        let tokens = lex(source)?;
        if let Some(t) = tokens.iter().find(|t| t.kind.is_comparator()) {
            return Err(ParseError::UnexpectedToken {
                expected: "an expression without a comparison operator".to_string(),
                found: t.text.clone(),
                span: t.span,
            });
        }
        Parser::new(tokens).parse_side()
    }

    /// Parse `<expr> <cmp> <expr>`, splitting on the single comparator.
    ///
    /// `=` and `==` both produce [`Comparator::Equal`].
    pub fn relation(source: &str) -> Result<Relation, ParseError> {
        let input = source.trim();
        let mut tokens = lex(input)?;
        let eof = tokens.pop().unwrap_or_else(|| {
            Token::new(TokenKind::Eof, Span::new(input.len(), input.len()), "")
        });

        let malformed = |reason: &str| ParseError::MalformedRelation {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let comparators: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind.is_comparator())
            .map(|(i, _)| i)
            .collect();

        let split = match comparators.as_slice() {
            [] => return Err(malformed("no comparison operator")),
            [idx] => *idx,
            _ => return Err(malformed("more than one comparison operator")),
        };

        let comparator = match tokens[split].kind {
            TokenKind::Le => Comparator::LessEqual,
            TokenKind::Ge => Comparator::GreaterEqual,
            TokenKind::Lt => Comparator::StrictLess,
            TokenKind::Gt => Comparator::StrictGreater,
            _ => Comparator::Equal,
        };

        let mut rhs_tokens = tokens.split_off(split + 1);
        let cmp_token = tokens.pop();
        let mut lhs_tokens = tokens;

        if lhs_tokens.is_empty() {
            return Err(malformed("empty left-hand side"));
        }
        if rhs_tokens.is_empty() {
            return Err(malformed("empty right-hand side"));
        }

        let cmp_span = cmp_token.map(|t| t.span).unwrap_or(eof.span);
        lhs_tokens.push(Token::new(TokenKind::Eof, cmp_span, ""));
        rhs_tokens.push(eof);

        let lhs = Parser::new(lhs_tokens).parse_side()?;
        let rhs = Parser::new(rhs_tokens).parse_side()?;
        trace!(%lhs, %comparator, %rhs, "parsed relation");

        Ok(Relation::new(lhs, comparator, rhs))
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> TokenKind {
        self.current().map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.current() {
            Some(t) if t.kind != TokenKind::Eof => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: t.text.clone(),
                span: t.span,
            },
            _ => ParseError::UnexpectedEnd(expected.to_string()),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), ParseError> {
        if self.peek_kind() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// A whole expression followed by end of input
    fn parse_side(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kind() == TokenKind::Eof {
            return Err(ParseError::EmptyExpression);
        }
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Eof, "an operator or end of expression")?;
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// Exponentiation binds tighter than unary minus and is right-associative
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if self.peek_kind() == TokenKind::Pow {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(base, BinaryOp::Pow, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Number => {
                let text = self.advance().map(|t| t.text.clone()).unwrap_or_default();
                let value: f64 = text.parse().map_err(|_| ParseError::InvalidNumber(text))?;
                Ok(Expr::Number(value))
            }
            TokenKind::Ident => {
                let name = self.advance().map(|t| t.text.clone()).unwrap_or_default();
                Ok(Expr::Variable(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(Expr::Paren(Box::new(expr)))
            }
            _ => Err(self.unexpected("number, variable, or (")),
        }
    }
}

/// Tokenize, rejecting characters the grammar does not know
fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    let tokens = Lexer::tokenize(source);
    if let Some(t) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
        return Err(ParseError::InvalidCharacter {
            text: t.text.clone(),
            span: t.span,
        });
    }
    Ok(tokens)
}
