use std::error::Error as StdError;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee that the error is not caused by
    /// the caller - merely that it cannot be confidently determined.
    Internal,

    /// The caller provided invalid input or asked for something that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A precondition on an argument, file or stream did not hold. Raised
    /// before any output is produced.
    InvalidArgument,
    /// A block's authentication tag did not match: wrong secret, tampering
    /// or corruption.
    AuthenticationFailed,
    /// The block counter outgrew the nonce width of the backend.
    NonceExhausted,
    /// The requested combination of backend and block geometry is not supported.
    UnsupportedConfiguration,
    /// Input ended before an expected block, tag or pepper could be read.
    TruncatedInput,
    /// Hex or base64 text could not be decoded.
    Codec,
    /// Unexpected state reached within churn logic.
    InternalInvariant,
    /// Interaction with the filesystem or a caller stream failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct ChurnError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag. Any code consuming errors MUST
    /// handle the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl ChurnError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for a precondition failure attributed to the caller.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::InvalidArgument, msg)
    }

    /// The message carried by the error, without its sources.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// True when the failure means the data (or the secret) did not authenticate.
    pub fn is_authentication_failure(&self) -> bool {
        self.kind == Some(ErrorKind::AuthenticationFailed)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// Classifies an I/O failure on a stream the engine reads from or writes to.
    pub(crate) fn stream(msg: impl Into<String>, err: io::Error) -> Self {
        let kind = if err.kind() == io::ErrorKind::UnexpectedEof {
            ErrorKind::TruncatedInput
        } else {
            ErrorKind::Io
        };
        Self::with_kind_and_source(ErrorCategory::Internal, kind, msg, err)
    }

    /// Classifies an I/O failure on a named path; a missing file is the caller's fault.
    pub(crate) fn path(action: &str, path: &Path, err: io::Error) -> Self {
        let category = if err.kind() == io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        Self::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to {} {}", action, path.display()),
            err,
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ChurnError>;
