use std::fmt;

/// The single user-visible message produced by a failing call.
///
/// `key` is a stable identifier a UI layer can localise; `message` is the
/// default English text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SessionExpired,
    PublicEndpointUnauthorized,
    Unauthorized,
    InvalidCredentials(String),
    BadRequest(String),
    ServiceUnavailable,
    ServerError,
    RequestFailed(u16),
    NetworkError,
    StorageUnavailable,
}

impl Notice {
    pub fn key(&self) -> &'static str {
        match self {
            Self::SessionExpired => "session.expired",
            Self::PublicEndpointUnauthorized => "session.public_endpoint",
            Self::Unauthorized => "session.unauthorized",
            Self::InvalidCredentials(_) => "session.invalid_credentials",
            Self::BadRequest(_) => "request.bad_request",
            Self::ServiceUnavailable => "request.service_unavailable",
            Self::ServerError => "request.server_error",
            Self::RequestFailed(_) => "request.failed",
            Self::NetworkError => "request.network_error",
            Self::StorageUnavailable => "session.storage_unavailable",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::SessionExpired => "Your session has expired, please log in again".to_string(),
            Self::PublicEndpointUnauthorized => {
                "Cannot refresh the session for a public endpoint".to_string()
            }
            Self::Unauthorized => "Not authorized".to_string(),
            Self::InvalidCredentials(message) | Self::BadRequest(message) => message.clone(),
            Self::ServiceUnavailable => "Service unavailable, please try again later".to_string(),
            Self::ServerError => "Server error, please try again later".to_string(),
            Self::RequestFailed(status) => format!("Request failed ({status})"),
            Self::NetworkError => "Network error, please check your connection".to_string(),
            Self::StorageUnavailable => "Could not access stored credentials".to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
