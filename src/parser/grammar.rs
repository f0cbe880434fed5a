use chumsky::Stream;
use chumsky::error::SimpleReason;
use chumsky::prelude::*;

use crate::ast::nodes::{BinaryOp, Expr, FunctionDefinition, Item, Program};
use crate::lexer::token::{Span, Token, TokenKind};
use crate::utils::errors::Diagnostic;

#[derive(Debug, Clone)]
pub struct ParserError {
    pub message: String,
    pub span: Span,
    /// The input ran out before the item was complete.
    pub at_end: bool,
}

impl ParserError {
    pub fn to_diagnostic(&self, source_id: &str) -> Diagnostic {
        let help = if self.at_end {
            "the last item is unfinished; check for a missing `)`, operand or `else` branch"
        } else {
            "this item was skipped up to the next `;` or `def`; the items around it still ran"
        };
        Diagnostic::error(source_id, self.span, self.message.clone()).with_help(help)
    }
}

impl From<Simple<TokenKind>> for ParserError {
    fn from(value: Simple<TokenKind>) -> Self {
        let span_range = value.span();
        let span = Span::new(span_range.start, span_range.end);

        if let SimpleReason::Custom(message) = value.reason() {
            return Self {
                message: message.clone(),
                span,
                at_end: false,
            };
        }

        let mut expected: Vec<String> = value
            .expected()
            .map(|token| match token {
                Some(token) => token.to_string(),
                None => "end of input".to_string(),
            })
            .collect();
        expected.sort();

        let at_end = matches!(value.found(), None | Some(TokenKind::Eof));
        let found = match value.found() {
            Some(found) => format!("unexpected token {found}"),
            None => "unexpected end of input".to_string(),
        };
        let message = if expected.is_empty() {
            found
        } else {
            format!("{found}, expected {}", expected.join(" or "))
        };
        Self {
            message,
            span,
            at_end,
        }
    }
}

/// Parses the whole token stream, failing if any item is malformed.
pub fn parse(tokens: &[Token]) -> Result<Program, Vec<ParserError>> {
    match parse_recovering(tokens) {
        (program, errors) if errors.is_empty() => Ok(program),
        (_, errors) => Err(errors),
    }
}

/// Parses every well-formed item, skipping malformed ones up to the next `;`,
/// `def` or end of input. Returns the items that parsed together with one
/// error per skipped region.
pub fn parse_recovering(tokens: &[Token]) -> (Program, Vec<ParserError>) {
    let parser = program_parser();
    let eof_span = tokens
        .last()
        .map(|token| token.span)
        .unwrap_or_else(|| Span::new(0, 0));

    let end = eof_span.end();
    let stream = Stream::from_iter(
        end..end + 1,
        tokens
            .iter()
            .cloned()
            .map(|token| (token.kind, token.span.into())),
    );

    let (program, errors) = parser.parse_recovery(stream);
    (
        program.unwrap_or_else(|| Program::new(Vec::new())),
        errors.into_iter().map(ParserError::from).collect(),
    )
}

fn identifier_parser() -> impl Parser<TokenKind, String, Error = Simple<TokenKind>> + Clone {
    select! { TokenKind::Identifier(name) => name }
}

fn number_parser() -> impl Parser<TokenKind, Expr, Error = Simple<TokenKind>> + Clone {
    select! { TokenKind::Number(text) => text }.try_map(|text, span| {
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| Simple::custom(span, format!("invalid number literal `{text}`")))
    })
}

fn expr_parser() -> impl Parser<TokenKind, Expr, Error = Simple<TokenKind>> + Clone {
    recursive(|expr| {
        let call_args = expr
            .clone()
            .separated_by(just(TokenKind::Comma))
            .allow_trailing()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen));

        // `name(...)` is a call, a bare `name` is a variable reference.
        let identifier_or_call =
            identifier_parser()
                .then(call_args.or_not())
                .map(|(name, args)| match args {
                    Some(args) => Expr::Call { callee: name, args },
                    None => Expr::Variable(name),
                });

        let conditional = just(TokenKind::If)
            .ignore_then(expr.clone())
            .then_ignore(just(TokenKind::Then))
            .then(expr.clone())
            .then(just(TokenKind::Else).ignore_then(expr.clone()).or_not())
            .map(|((cond, then_branch), else_branch)| Expr::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            });

        let atom = choice((
            number_parser(),
            conditional,
            identifier_or_call,
            expr.clone()
                .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen)),
        ))
        .boxed();

        let product = atom
            .clone()
            .then(
                choice((
                    just(TokenKind::Star).to(BinaryOp::Mul),
                    just(TokenKind::Slash).to(BinaryOp::Div),
                ))
                .then(atom)
                .repeated(),
            )
            .foldl(|left, (op, right)| Expr::binary(op, left, right))
            .boxed();

        let sum = product
            .clone()
            .then(
                choice((
                    just(TokenKind::Plus).to(BinaryOp::Add),
                    just(TokenKind::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
            )
            .foldl(|left, (op, right)| Expr::binary(op, left, right))
            .boxed();

        sum.clone()
            .then(
                choice((
                    just(TokenKind::Lt).to(BinaryOp::Lt),
                    just(TokenKind::Gt).to(BinaryOp::Gt),
                ))
                .then(sum)
                .repeated(),
            )
            .foldl(|left, (op, right)| Expr::binary(op, left, right))
    })
}

fn program_parser() -> impl Parser<TokenKind, Program, Error = Simple<TokenKind>> {
    let expr = expr_parser().boxed();
    let semicolons = just(TokenKind::Semicolon).repeated();

    // Parameters are whitespace separated: `def add(a b) a + b`.
    let params = identifier_parser()
        .repeated()
        .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen));

    let definition = just(TokenKind::Def)
        .ignore_then(identifier_parser())
        .then(params)
        .then(expr.clone())
        .map(|((name, params), body)| {
            Item::Definition(FunctionDefinition::new(name, params, body))
        });

    // A malformed item is dropped; skipping always eats its first token so the
    // repetition keeps making progress.
    let item = choice((definition, expr.map(Item::Expression)))
        .map(Some)
        .recover_with(
            skip_until([TokenKind::Semicolon, TokenKind::Def, TokenKind::Eof], |_| None)
                .skip_start(),
        );
    let not_at_end = filter(|token: &TokenKind| *token != TokenKind::Eof).rewind();

    semicolons
        .clone()
        .ignore_then(
            not_at_end
                .ignore_then(item)
                .then_ignore(semicolons)
                .repeated(),
        )
        .then_ignore(just(TokenKind::Eof))
        .map(|items| Program::new(items.into_iter().flatten().collect()))
}
