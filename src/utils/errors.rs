//! Front-end diagnostics, rendered through ariadne.

use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::lexer::token::Span;

/// A located lexing or parsing error, optionally with a hint for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    source_id: String,
    span: Span,
    message: String,
    help: Option<String>,
}

impl Diagnostic {
    pub fn error(source_id: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            span,
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    fn report(&self) -> Report<'static, (String, Range<usize>)> {
        let span: Range<usize> = self.span.into();
        let mut report = Report::build(ReportKind::Error, self.source_id.clone(), span.start)
            .with_message(&self.message)
            .with_label(Label::new((self.source_id.clone(), span)).with_color(Color::Red));
        if let Some(help) = &self.help {
            report = report.with_help(help);
        }
        report.finish()
    }
}

/// Renders every diagnostic against `source` on stderr.
pub fn emit_diagnostics(diagnostics: &[Diagnostic], source: &str) {
    for diagnostic in diagnostics {
        let cache = (diagnostic.source_id.clone(), Source::from(source));
        let _ = diagnostic.report().eprint(cache);
    }
}
