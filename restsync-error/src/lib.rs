//! Shared error taxonomy used by every `restsync-*` crate.
//!
//! Mirrors the `Error`/`Code`/`ResultExt` shape used throughout the rest of
//! this workspace: a `Code` classifies *what kind* of failure occurred, and
//! `Error` carries a stack of human-readable "tips" appended as the error
//! bubbles up through layers, similar to `anyhow::Context` but with a
//! stable, matchable code.

use std::fmt;

/// Coarse classification of a failure. Downstream code (in particular the
/// sync engine's outcome classifier) matches on this to decide retry
/// behavior, so the variants are named after *why* something failed rather
/// than *where*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// No durable-storage facility is available at all (e.g. the configured
    /// path cannot be opened as a database).
    Environment,
    /// A storage transaction failed.
    Storage,
    /// The HTTP client itself errored (DNS, connect, timeout) rather than
    /// returning a response.
    Network,
    /// The server returned a response classified as a permanent failure
    /// (4xx, excluding 401 and 429).
    PermanentResponse,
    /// The server returned 401 and no refresh hook is configured, or the
    /// refresh hook itself failed.
    AuthExpired,
    /// The server returned a response classified as transient (429, 5xx).
    TransientResponse,
    /// Retries were exhausted; reported to callers as permanent.
    GiveUp,
    /// Caller supplied invalid input.
    InvalidArgument,
    /// The requested item does not exist.
    NotFound,
    /// Catch-all for anything not covered above.
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error with a stable [`Code`] and a stack of context messages, the
/// innermost pushed first.
#[derive(Debug, Clone)]
pub struct Error {
    pub code: Code,
    pub messages: Vec<String>,
}

impl Error {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Error {
            code,
            messages: vec![message.into()],
        }
    }

    /// Append another tip to the error, describing what the caller was
    /// doing when it observed this error.
    #[must_use]
    pub fn append(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:", self.code)?;
        for message in &self.messages {
            write!(f, " {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Constructs an [`Error`] with a formatted message, in the style of
/// `anyhow::anyhow!` but pinned to a [`Code`].
#[macro_export]
macro_rules! make_err {
    ($code:expr, $($arg:tt)+) => {
        $crate::Error::new($code, format!($($arg)+))
    };
}

/// Extension methods for attaching context to a `Result<T, Error>` as it
/// propagates, without losing the original [`Code`].
pub trait ResultExt<T> {
    /// Lazily attach a tip to the error path of this result.
    fn err_tip<F: FnOnce() -> S, S: Into<String>>(self, f: F) -> Result<T, Error>;

    /// Like [`ResultExt::err_tip`], but also allows overriding the
    /// [`Code`] the error is reported with.
    fn err_tip_with_code<F: FnOnce(Error) -> (Code, S), S: Into<String>>(
        self,
        f: F,
    ) -> Result<T, Error>;
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
    fn err_tip<F: FnOnce() -> S, S: Into<String>>(self, f: F) -> Result<T, Error> {
        self.map_err(|e| e.into().append(f().into()))
    }

    fn err_tip_with_code<F: FnOnce(Error) -> (Code, S), S: Into<String>>(
        self,
        f: F,
    ) -> Result<T, Error> {
        self.map_err(|e| {
            let err = e.into();
            let (code, message) = f(err);
            Error::new(code, message.into())
        })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(Code::Storage, err.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::new(Code::Storage, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(Code::InvalidArgument, err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::new(Code::Storage, err.to_string())
    }
}
