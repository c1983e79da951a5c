//! Error types for template parsing

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::parser::ast::{BlockKind, Span};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unterminated {kind} block starting at byte {}", span.start)]
    UnterminatedBlock { kind: BlockKind, span: Span },

    #[error("malformed {tag} tag: {message}")]
    MalformedTag {
        tag: &'static str,
        message: String,
        span: Span,
    },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            ParseError::UnterminatedBlock { span, .. } => span,
            ParseError::MalformedTag { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let span = self.span().clone();
        let (message, label) = match self {
            ParseError::UnterminatedBlock { kind, .. } => (
                format!("unterminated {} block", kind),
                format!("this {} block is never closed with an end marker", kind),
            ),
            ParseError::MalformedTag { tag, message, .. } => {
                (format!("malformed {} tag", tag), message.clone())
            }
        };

        let mut buf = Vec::new();
        Report::build(ReportKind::Error, filename, span.start)
            .with_message(&message)
            .with_label(
                Label::new((filename, span))
                    .with_message(label)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }
}
