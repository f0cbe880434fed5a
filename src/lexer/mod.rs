pub mod token;
pub mod tokenizer;

pub use token::{Span, Token, TokenKind};
pub use tokenizer::{LexResult, LexerError, tokenize};
