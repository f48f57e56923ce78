//! Error types of the session store.

use std::error::Error as StdError;

use poem::{error::ResponseError, http::StatusCode};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors produced by the session store.
///
/// Failures that prevent a session from being *read* are normally absorbed by
/// [`SessionStore::new_session`](crate::SessionStore::new_session) and
/// replaced with a fresh session. Failures that prevent a session from being
/// *written* are always returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operating system randomness source is unavailable.
    #[error("failed to generate a session identifier: {0}")]
    IdentifierGeneration(#[source] rand::Error),

    /// A cookie key is unusable.
    #[error("invalid cookie key: {0}")]
    InvalidKey(&'static str),

    /// The session identifier could not be encoded into a cookie value.
    #[error("failed to encode a cookie value")]
    EncodeCookie,

    /// The cookie value is not a valid token for any configured key.
    #[error("failed to decode a cookie value")]
    DecodeCookie,

    /// The session values could not be encoded.
    #[error("failed to encode session values: {0}")]
    Serialize(String),

    /// The stored session values could not be decoded.
    #[error("failed to decode session values: {0}")]
    Deserialize(String),

    /// The backing store failed to read a record.
    #[error("failed to get item from the session table: {0}")]
    StoreRead(#[source] BoxError),

    /// The backing store failed to write a record.
    #[error("failed to put item to the session table: {0}")]
    StoreWrite(#[source] BoxError),

    /// The backing store failed to delete a record.
    #[error("failed to delete item from the session table: {0}")]
    StoreDelete(#[source] BoxError),

    /// A backing store operation exceeded the configured deadline.
    #[error("session table operation timed out")]
    Timeout,

    /// A session without an identifier was saved.
    #[error("illegal session")]
    IllegalSession,

    /// The cookie name contains characters not allowed by RFC 6265.
    #[error("invalid character in cookie name: {0}")]
    InvalidCookieName(String),

    /// The `Sessions` extractor was used without the `SessionManager`
    /// middleware.
    #[error("the `SessionManager` middleware is required")]
    MissingSessionManager,
}

impl Error {
    pub(crate) fn store_read(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::StoreRead(Box::new(err))
    }

    pub(crate) fn store_write(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::StoreWrite(Box::new(err))
    }

    pub(crate) fn store_delete(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::StoreDelete(Box::new(err))
    }
}

impl ResponseError for Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidCookieName(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A specialized `Result` type for session store operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
