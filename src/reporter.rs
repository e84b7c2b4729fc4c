//! Sinks for diagnostics produced while compiling.
//!
//! The parser and linker report syntax and semantic problems through a
//! [`Handler`], which records them per file and forwards them to a
//! caller-supplied [`Reporter`]. The reporter decides whether compilation of
//! the file keeps going after an error; even in continue mode, the pipeline
//! stops at the next stage boundary once any error has been recorded.

use std::{
    fmt,
    ops::{ControlFlow, Range},
    sync::{Arc, Mutex},
};

use miette::SourceSpan;

use crate::ast::SourcePos;

/// The severity of a [`Diagnostic`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Level {
    /// A problem that prevents the file from compiling.
    Error,
    /// A problem that does not prevent the file from compiling.
    Warning,
}

/// A single problem found in a source file.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
pub struct Diagnostic {
    pub(crate) message: String,
    pub(crate) level: Level,
    pub(crate) pos: Option<SourcePos>,
    #[label]
    pub(crate) span: Option<SourceSpan>,
}

impl Diagnostic {
    /// The human-readable description of the problem.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The severity of the problem.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The position the problem was found at, if known.
    pub fn pos(&self) -> Option<&SourcePos> {
        self.pos.as_ref()
    }
}

/// A sink for categorized diagnostics.
///
/// Implementations choose between gathering as many diagnostics as possible
/// per file and aborting at the first error.
pub trait Reporter: Send + Sync {
    /// Handles an error. Returning [`ControlFlow::Break`] aborts work on the
    /// current file immediately; returning [`ControlFlow::Continue`] lets the
    /// producer keep going so further diagnostics can be gathered.
    fn report_error(&self, diagnostic: &Diagnostic) -> ControlFlow<()>;

    /// Handles a warning. Warnings never abort compilation.
    fn report_warning(&self, _diagnostic: &Diagnostic) {}
}

impl<R> Reporter for Box<R>
where
    R: Reporter + ?Sized,
{
    fn report_error(&self, diagnostic: &Diagnostic) -> ControlFlow<()> {
        (**self).report_error(diagnostic)
    }

    fn report_warning(&self, diagnostic: &Diagnostic) {
        (**self).report_warning(diagnostic)
    }
}

/// The default [`Reporter`]: records every diagnostic and keeps going.
#[derive(Debug, Default)]
pub struct CollectReporter {
    _priv: (),
}

impl CollectReporter {
    /// Creates a new `CollectReporter`.
    pub fn new() -> Self {
        Default::default()
    }
}

impl Reporter for CollectReporter {
    fn report_error(&self, _diagnostic: &Diagnostic) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// A [`Reporter`] which aborts work on a file at the first error.
#[derive(Debug, Default)]
pub struct FailFastReporter {
    _priv: (),
}

impl FailFastReporter {
    /// Creates a new `FailFastReporter`.
    pub fn new() -> Self {
        Default::default()
    }
}

impl Reporter for FailFastReporter {
    fn report_error(&self, _diagnostic: &Diagnostic) -> ControlFlow<()> {
        ControlFlow::Break(())
    }
}

/// Per-file diagnostic bookkeeping around a shared [`Reporter`].
pub struct Handler {
    reporter: Arc<dyn Reporter>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    errors: Mutex<usize>,
}

impl Handler {
    /// Creates a handler forwarding to the given reporter.
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Handler {
            reporter,
            diagnostics: Mutex::new(Vec::new()),
            errors: Mutex::new(0),
        }
    }

    pub(crate) fn error(
        &self,
        pos: Option<SourcePos>,
        span: Option<Range<usize>>,
        message: impl Into<String>,
    ) -> ControlFlow<()> {
        let diagnostic = Diagnostic {
            message: message.into(),
            level: Level::Error,
            pos,
            span: span.map(|span| span.into()),
        };
        *self.errors.lock().unwrap() += 1;
        let flow = self.reporter.report_error(&diagnostic);
        self.diagnostics.lock().unwrap().push(diagnostic);
        flow
    }

    pub(crate) fn warning(
        &self,
        pos: Option<SourcePos>,
        span: Option<Range<usize>>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            message: message.into(),
            level: Level::Warning,
            pos,
            span: span.map(|span| span.into()),
        };
        self.reporter.report_warning(&diagnostic);
        self.diagnostics.lock().unwrap().push(diagnostic);
    }

    /// Returns the number of errors reported so far.
    pub fn error_count(&self) -> usize {
        *self.errors.lock().unwrap()
    }

    /// Returns `true` if any error has been reported.
    pub fn has_errors(&self) -> bool {
        self.error_count() != 0
    }

    /// Removes and returns every diagnostic recorded so far.
    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics.lock().unwrap())
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("errors", &self.error_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic_at(handler: &Handler, offset: usize) -> ControlFlow<()> {
        handler.error(None, Some(offset..offset + 1), "test error")
    }

    #[test]
    fn collect_reporter_continues() {
        let handler = Handler::new(Arc::new(CollectReporter::new()));
        assert_eq!(diagnostic_at(&handler, 0), ControlFlow::Continue(()));
        assert_eq!(diagnostic_at(&handler, 1), ControlFlow::Continue(()));
        assert_eq!(handler.error_count(), 2);
        assert_eq!(handler.take_diagnostics().len(), 2);
    }

    #[test]
    fn fail_fast_reporter_breaks() {
        let handler = Handler::new(Arc::new(FailFastReporter::new()));
        assert_eq!(diagnostic_at(&handler, 0), ControlFlow::Break(()));
        assert!(handler.has_errors());
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let handler = Handler::new(Arc::new(CollectReporter::new()));
        handler.warning(None, None, "suspicious");
        assert!(!handler.has_errors());
        assert_eq!(handler.take_diagnostics().len(), 1);
    }
}
