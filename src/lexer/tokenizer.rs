use super::token::{Span, Token, TokenKind};
use crate::utils::errors::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("malformed number literal `{text}` (line {line}, column {column})")]
    MalformedNumber {
        text: String,
        line: usize,
        column: usize,
        span: Span,
    },
    #[error("unexpected character `{ch}` (line {line}, column {column})")]
    UnexpectedCharacter {
        ch: char,
        line: usize,
        column: usize,
        span: Span,
    },
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            LexerError::MalformedNumber { span, .. }
            | LexerError::UnexpectedCharacter { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self, source_id: &str) -> Diagnostic {
        let help = match self {
            LexerError::MalformedNumber { .. } => {
                "numbers are digits with at most one decimal point, like `3` or `2.5`"
            }
            LexerError::UnexpectedCharacter { .. } => {
                "valid symbols are `+ - * / < > ( ) , ;` and `#` starts a comment"
            }
        };
        Diagnostic::error(source_id, self.span(), self.to_string()).with_help(help)
    }
}

pub type LexResult<T> = Result<T, Vec<LexerError>>;

pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut offset = 0usize;

    for (line_idx, chunk) in source.split_inclusive('\n').enumerate() {
        let line_number = line_idx + 1;
        let line = chunk.trim_end_matches(['\n', '\r']);
        let bytes = line.as_bytes();
        let line_offset = offset;

        let mut i = 0usize;
        while i < bytes.len() {
            let ch = bytes[i];
            let absolute_start = line_offset + i;
            let column = i + 1;

            let single = match ch {
                b'(' => Some(TokenKind::LParen),
                b')' => Some(TokenKind::RParen),
                b',' => Some(TokenKind::Comma),
                b';' => Some(TokenKind::Semicolon),
                b'+' => Some(TokenKind::Plus),
                b'-' => Some(TokenKind::Minus),
                b'*' => Some(TokenKind::Star),
                b'/' => Some(TokenKind::Slash),
                b'<' => Some(TokenKind::Lt),
                b'>' => Some(TokenKind::Gt),
                _ => None,
            };
            if let Some(kind) = single {
                tokens.push(Token::new(
                    kind,
                    Span::new(absolute_start, absolute_start + 1),
                ));
                i += 1;
                continue;
            }

            match ch {
                b'#' => break,
                ch if ch.is_ascii_whitespace() => {
                    i += 1;
                }
                ch if ch.is_ascii_digit() || ch == b'.' => {
                    let start = i;
                    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                        i += 1;
                    }
                    let text = &line[start..i];
                    let span = Span::new(line_offset + start, line_offset + i);
                    if text.parse::<f64>().is_ok() {
                        tokens.push(Token::new(TokenKind::Number(text.to_string()), span));
                    } else {
                        errors.push(LexerError::MalformedNumber {
                            text: text.to_string(),
                            line: line_number,
                            column,
                            span,
                        });
                    }
                }
                ch if ch.is_ascii_alphabetic() || ch == b'_' => {
                    let start = i;
                    i += 1;
                    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                    {
                        i += 1;
                    }
                    let word = &line[start..i];
                    let span = Span::new(line_offset + start, line_offset + i);
                    let kind = TokenKind::keyword(word)
                        .unwrap_or_else(|| TokenKind::Identifier(word.to_string()));
                    tokens.push(Token::new(kind, span));
                }
                _ => {
                    // Report the whole character, not just its first byte.
                    let other = line[i..].chars().next().unwrap_or(char::REPLACEMENT_CHARACTER);
                    let width = other.len_utf8();
                    errors.push(LexerError::UnexpectedCharacter {
                        ch: other,
                        line: line_number,
                        column,
                        span: Span::new(absolute_start, absolute_start + width),
                    });
                    i += width;
                }
            }
        }

        offset += chunk.len();
    }

    tokens.push(Token::new(TokenKind::Eof, Span::new(offset, offset)));

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
