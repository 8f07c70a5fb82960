pub mod ast;
pub mod lexer;
pub mod linear;
pub mod normalize;
pub mod parser;

pub use ast::*;
pub use lexer::{Lexer, Span, Token, TokenKind};
pub use linear::{
    LinearError, LinearForm, Polynomial, extract_coefficients, extract_variables,
    first_seen_variables,
};
pub use normalize::normalize;
pub use parser::{ParseError, Parser, parse_expression, parse_relation};
