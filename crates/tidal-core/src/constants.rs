pub mod session_keys {
    /// Short-lived bearer credential attached to every request.
    pub const ACCESS_TOKEN: &str = "access_token";

    /// Longer-lived credential exchanged for a new access token.
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

pub mod endpoints {
    pub const REFRESH_PATH: &str = "/refresh";
    pub const LOGIN_PATH: &str = "/login";
    pub const LOGOUT_PATH: &str = "/logout";
    pub const PUBLIC_SEGMENT: &str = "/public/";
}

/// Blank line separating two SSE frames once line endings are normalised.
pub const FRAME_DELIMITER: &str = "\n\n";

pub const EVENT_FIELD: &str = "event:";
pub const DATA_FIELD: &str = "data:";
