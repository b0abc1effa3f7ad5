use std::borrow::Cow;
use std::error;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;
use std::result;


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = result::Result<T, E>;


/// The classes of errors the crate reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The object bytes are malformed.
    InvalidData,
    /// A provided input was invalid.
    InvalidInput,
    /// An I/O error as reported by the byte sink or source.
    Io,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidData => "invalid data",
            Self::InvalidInput => "invalid input",
            Self::Io => "I/O error",
        }
    }
}


/// The error type used by the crate.
///
/// Errors carry a [`kind`][Error::kind] and render all attached context
/// layers, separated by `": "`, via their [`Display`] implementation.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: Option<Cow<'static, str>>,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl Error {
    fn with_error<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self {
            kind,
            context: None,
            source: Some(error.into()),
        }
    }

    /// Create an [`Error`] of the [`ErrorKind::InvalidData`] kind.
    pub fn with_invalid_data<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::with_error(ErrorKind::InvalidData, error)
    }

    /// Create an [`Error`] of the [`ErrorKind::InvalidInput`] kind.
    pub fn with_invalid_input<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::with_error(ErrorKind::InvalidInput, error)
    }

    /// Retrieve the error's kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.context {
            Some(context) => write!(f, "{context}")?,
            None => write!(f, "{}", self.kind.as_str())?,
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(other: io::Error) -> Self {
        Self::with_error(ErrorKind::Io, other)
    }
}


/// A trait providing ergonomic context chaining on errors and results.
pub trait ErrorExt: Sized {
    /// The output type produced by [`context`][ErrorExt::context] and
    /// [`with_context`][ErrorExt::with_context].
    type Output;

    /// Add context to this error.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>;

    /// Add context to this error, lazily evaluated.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        Self {
            kind: self.kind,
            context: Some(context.into()),
            source: Some(Box::new(self)),
        }
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.context(f())
    }
}

impl<T, E> ErrorExt for result::Result<T, E>
where
    E: ErrorExt,
{
    type Output = result::Result<T, E::Output>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        self.map_err(|err| err.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.with_context(f))
    }
}


/// A trait providing conversion of an [`Option`] into a [`Result`].
pub trait IntoError<T>: Sized {
    /// Convert into a [`Result`], producing an error of the given kind
    /// when no value is present.
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;

    /// Convert into a [`Result`], producing an [`ErrorKind::InvalidData`]
    /// error when no value is present.
    #[inline]
    fn ok_or_invalid_data<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidData, f)
    }

    /// Convert into a [`Result`], producing an [`ErrorKind::InvalidInput`]
    /// error when no value is present.
    #[inline]
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidInput, f)
    }
}

impl<T> IntoError<T> for Option<T> {
    #[inline]
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error {
            kind,
            context: Some(f().into()),
            source: None,
        })
    }
}
