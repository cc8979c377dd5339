//! Player Error Types
//!
//! Every failure the player can run into falls in one of a handful of
//! categories, and each category has exactly one way of being handled:
//!
//! | Kind | Handling |
//! |---|---|
//! | [`TransientNetwork`](ErrorKind::TransientNetwork), [`Timeout`](ErrorKind::Timeout) | retried, then the player degrades to cached content |
//! | [`Resolution`](ErrorKind::Resolution) | the item that referenced it is dropped |
//! | [`Rejected`](ErrorKind::Rejected), [`Protocol`](ErrorKind::Protocol) | treated like the backend being down, without retries |
//! | [`Storage`](ErrorKind::Storage) | logged; playback continues from memory |
//! | [`InvalidIdentity`](ErrorKind::InvalidIdentity) | fatal for the session |

use derive_more::{Display, Error};
use std::time::Duration;

/// A player error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for player operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The backend or a media host could not be reached, or answered with a
    /// server-side error.
    #[display("network request failed: {_0}")]
    TransientNetwork(#[error(not(source))] String),
    /// The thing asked for does not exist (any more).
    #[display("not found: {_0}")]
    Resolution(#[error(not(source))] String),
    /// The backend refused the request outright (bad credentials, bad filter).
    #[display("request rejected with HTTP {_0}: {_1}")]
    Rejected(#[error(not(source))] u16, #[error(not(source))] String),
    /// The backend answered with something the player cannot understand.
    #[display("unexpected response: {_0}")]
    Protocol(#[error(not(source))] String),
    /// The blob or snapshot store failed.
    #[display("local storage failure")]
    Storage,
    /// The player key is malformed.
    #[display("invalid player identity: {_0:?}")]
    InvalidIdentity(#[error(not(source))] String),
    /// A remote call or download attempt did not finish in time.
    #[display("timed out after {}ms", _0.as_millis())]
    Timeout(#[error(not(source))] Duration),
    /// The HTTP client could not be set up.
    #[display("invalid client configuration: {_0}")]
    Configuration(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Timeout(_))
    }

    /// Classify an HTTP status that is not a success.
    pub(crate) fn from_status(status: u16, what: impl Into<String>) -> Self {
        match status {
            404 | 410 => Self::Resolution(what.into()),
            408 | 429 | 500..=599 => Self::TransientNetwork(format!("HTTP {status} for {}", what.into())),
            _ => Self::Rejected(status, what.into()),
        }
    }
}
