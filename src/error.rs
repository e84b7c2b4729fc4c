use std::{fmt, io, path::PathBuf, sync::Arc};

use miette::Diagnostic;
use prost_reflect::DescriptorError;
use thiserror::Error;

use crate::parse::ParseError;

/// An error that can occur when compiling protobuf files.
///
/// The error is cheap to clone: a failure in one file is shared with every
/// file that transitively imports it.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct Error {
    kind: Arc<ErrorKind>,
}

impl Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn fmt::Display + '_>> {
        self.kind.code()
    }

    fn severity(&self) -> Option<miette::Severity> {
        self.kind.severity()
    }

    fn help(&self) -> Option<Box<dyn fmt::Display + '_>> {
        self.kind.help()
    }

    fn url(&self) -> Option<Box<dyn fmt::Display + '_>> {
        self.kind.url()
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.kind.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.kind.labels()
    }

    fn related(&self) -> Option<Box<dyn Iterator<Item = &dyn Diagnostic> + '_>> {
        self.kind.related()
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.kind.diagnostic_source()
    }
}

#[derive(Debug, Diagnostic, Error)]
pub(crate) enum ErrorKind {
    #[error("{}", err)]
    #[diagnostic(forward(err))]
    Parse { err: ParseError },
    #[error("{}", err)]
    #[diagnostic(forward(err))]
    Link { err: DescriptorError },
    #[error("error opening file '{}'", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("file '{name}' was not found")]
    NotFound { name: String },
    #[error("import cycle detected: {}", cycle.join(" -> "))]
    CircularImport { cycle: Vec<String> },
    #[error("exceeded import depth limit of {limit} while resolving '{name}'")]
    ImportDepthExceeded { name: String, limit: usize },
    #[error("panicked while compiling '{name}': {message}")]
    Panicked {
        name: String,
        message: String,
        backtrace: String,
    },
    #[error("compilation was canceled")]
    Canceled,
    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates an instance of [`struct@Error`] with an arbitrary payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::from_kind(ErrorKind::Custom(error.into()))
    }

    /// Creates an instance of [`struct@Error`] indicating that a file could
    /// not be found.
    ///
    /// [`Resolver`](crate::Resolver) implementations should return this error
    /// if a file is not available from them.
    pub fn file_not_found(name: impl Into<String>) -> Self {
        Error::from_kind(ErrorKind::NotFound { name: name.into() })
    }

    pub(crate) fn from_kind(kind: ErrorKind) -> Self {
        Error {
            kind: Arc::new(kind),
        }
    }

    /// Returns `true` if this error indicates a file was not found, either
    /// through [`Error::file_not_found()`] or through the filesystem.
    pub fn is_file_not_found(&self) -> bool {
        match &*self.kind {
            ErrorKind::NotFound { .. } => true,
            ErrorKind::OpenFile { err, .. } => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns `true` if this error is the result of cooperative
    /// cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(&*self.kind, ErrorKind::Canceled)
    }

    /// Returns `true` if this error was recovered from a panic in a resolver
    /// or compilation stage.
    pub fn is_panic(&self) -> bool {
        matches!(&*self.kind, ErrorKind::Panicked { .. })
    }

    /// If this error is an import cycle, returns the cycle as the sequence of
    /// logical paths that close it.
    pub fn cycle(&self) -> Option<&[String]> {
        match &*self.kind {
            ErrorKind::CircularImport { cycle } => Some(cycle),
            _ => None,
        }
    }

    pub(crate) fn open_file(path: PathBuf, err: io::Error) -> Self {
        Error::from_kind(ErrorKind::OpenFile { path, err })
    }

    pub(crate) fn panicked(
        name: &str,
        payload: &(dyn std::any::Any + Send),
        backtrace: String,
    ) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panicked with a non-string payload".to_owned()
        };

        Error::from_kind(ErrorKind::Panicked {
            name: name.to_owned(),
            message,
            backtrace,
        })
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::from_kind(ErrorKind::Parse { err })
    }
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        Error::from_kind(ErrorKind::Link { err })
    }
}
