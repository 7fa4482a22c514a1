use thiserror::Error;
use tidal_core::EndpointKind;

/// Errors from a [`TokenStore`](crate::store::TokenStore) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("token store unavailable: {0}")]
    Unavailable(String),
    #[error("token store corrupted: {0}")]
    Corrupted(String),
}

/// Why a call ended in a terminal authentication failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("no refresh token stored")]
    NoRefreshToken,
    #[error("refresh rejected with status {status}")]
    RefreshRejected { status: u16 },
    #[error("refresh response malformed: {0}")]
    MalformedRefreshResponse(String),
    #[error("unauthorized on {} endpoint", .0.as_str())]
    Unrefreshable(EndpointKind),
    #[error("still unauthorized after refreshing the session")]
    RetryUnauthorized,
}

/// Outcome of a failed client call.
///
/// `Clone` so a single refresh failure can be handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request aborted")]
    Aborted,
    #[error("session ended: {0}")]
    AuthTerminal(#[from] AuthFailure),
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("service error ({status})")]
    Service { status: u16 },
    #[error("unexpected status {status}")]
    UnexpectedStatus { status: u16 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
