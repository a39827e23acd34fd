//! Front-end diagnostics and their rendering.

use std::fmt;
use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

/// An error found while lexing, parsing or resolving IDL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    /// Byte range in the source text.
    pub span: Range<usize>,
    /// Text attached to the span, if any.
    pub label: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

/// Renders `diagnostics` against `source` as plain (uncolored) reports.
pub fn render(diagnostics: &[Diagnostic], file_name: &str, source: &str) -> String {
    let mut out = Vec::new();
    for diagnostic in diagnostics {
        let span = clamp(&diagnostic.span, source.len());
        let label = Label::new((file_name, span.clone()))
            .with_message(diagnostic.label.as_deref().unwrap_or(&diagnostic.message));
        let report = Report::build(ReportKind::Error, file_name, span.start)
            .with_config(Config::default().with_color(false))
            .with_message(&diagnostic.message)
            .with_label(label)
            .finish();
        if report
            .write((file_name, Source::from(source)), &mut out)
            .is_err()
        {
            out.extend_from_slice(format!("error: {diagnostic}\n").as_bytes());
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn clamp(span: &Range<usize>, len: usize) -> Range<usize> {
    let start = span.start.min(len);
    let end = span.end.clamp(start, len);
    start..end
}
