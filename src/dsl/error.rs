//! Diagnostics for the Weft compiler.
//!
//! Errors never abort a compilation. Every report carries a `file:line`
//! landmark and flows through an [`ErrorSink`]; the pipeline substitutes
//! placeholders and keeps going, and a run counts as failed when the
//! sink saw at least one error.

use std::fmt;

use thiserror::Error;

/// Weight of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    /// Informational line attached to a preceding error, such as an
    /// overload listing.
    Message,
}

/// A single report: where, how bad, what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub landmark: String,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.landmark, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Receiver for compiler diagnostics.
pub trait ErrorSink {
    /// Report an error at `landmark`.
    fn error(&mut self, landmark: &str, message: &str);

    /// Report an informational line at `landmark`.
    fn message(&mut self, landmark: &str, message: &str);
}

/// Sink that stores every diagnostic and counts the errors.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    diagnostics: Vec<Diagnostic>,
    nerrors: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nerrors(&self) -> usize {
        self.nerrors
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl ErrorSink for ErrorCollector {
    fn error(&mut self, landmark: &str, message: &str) {
        self.nerrors += 1;
        self.diagnostics.push(Diagnostic {
            landmark: landmark.to_string(),
            severity: Severity::Error,
            message: message.to_string(),
        });
    }

    fn message(&mut self, landmark: &str, message: &str) {
        self.diagnostics.push(Diagnostic {
            landmark: landmark.to_string(),
            severity: Severity::Message,
            message: message.to_string(),
        });
    }
}

/// Adapter that emits a context line before the first report of a group
/// and indents the group's messages.
pub struct ContextSink<'a> {
    inner: &'a mut dyn ErrorSink,
    context: Option<String>,
}

impl<'a> ContextSink<'a> {
    pub fn new(inner: &'a mut dyn ErrorSink, context: &str) -> Self {
        Self {
            inner,
            context: Some(context.to_string()),
        }
    }

    fn flush_context(&mut self, landmark: &str) {
        if let Some(context) = self.context.take() {
            self.inner.message(landmark, &context);
        }
    }
}

impl ErrorSink for ContextSink<'_> {
    fn error(&mut self, landmark: &str, message: &str) {
        self.flush_context(landmark);
        self.inner.error(landmark, &format!("  {message}"));
    }

    fn message(&mut self, landmark: &str, message: &str) {
        self.flush_context(landmark);
        self.inner.message(landmark, &format!("  {message}"));
    }
}

/// Failed compilation: the full diagnostic log of the run.
#[derive(Debug, Error)]
#[error("compilation failed with {nerrors} error(s)")]
pub struct CompileErrors {
    pub nerrors: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_counts_only_errors() {
        let mut errh = ErrorCollector::new();
        errh.error("t:1", "boom");
        errh.message("t:1", "context");
        assert_eq!(errh.nerrors(), 1);
        assert_eq!(errh.diagnostics().len(), 2);
        assert_eq!(errh.diagnostics()[0].to_string(), "t:1: boom");
    }

    #[test]
    fn context_sink_emits_header_once() {
        let mut errh = ErrorCollector::new();
        let mut ctx = ContextSink::new(&mut errh, "possibilities are:");
        ctx.message("t:2", "'C[0 arguments, 1 input, 1 output]'");
        ctx.message("t:3", "'C[1 argument, 1 input, 1 output]'");
        let all = errh.into_diagnostics();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "possibilities are:");
        assert!(all[1].message.starts_with("  "));
        assert!(all[2].message.starts_with("  "));
    }
}
