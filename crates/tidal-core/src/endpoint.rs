use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::endpoints;

/// What a `401` on a given URL means for session recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Ordinary authenticated endpoint; a `401` triggers a token refresh.
    Refreshable,
    Login,
    Logout,
    /// The refresh endpoint itself.
    Refresh,
    /// Reachable without a session; never refreshed.
    Public,
}

impl EndpointKind {
    pub fn is_refreshable(self) -> bool {
        matches!(self, Self::Refreshable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refreshable => "refreshable",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Refresh => "refresh",
            Self::Public => "public",
        }
    }
}

/// Path conventions used to classify outbound URLs.
///
/// The auth paths are full request paths (already joined with any base path),
/// compared exactly; a route that merely ends in `/refresh` is an ordinary
/// endpoint. The public segment matches any path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRules {
    pub refresh_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub public_segment: String,
}

impl Default for EndpointRules {
    fn default() -> Self {
        Self {
            refresh_path: endpoints::REFRESH_PATH.to_string(),
            login_path: endpoints::LOGIN_PATH.to_string(),
            logout_path: endpoints::LOGOUT_PATH.to_string(),
            public_segment: endpoints::PUBLIC_SEGMENT.to_string(),
        }
    }
}

impl EndpointRules {
    pub fn classify(&self, url: &str) -> EndpointKind {
        let path = normalize_path(&request_path(url));

        if is_endpoint(&path, &self.refresh_path) {
            EndpointKind::Refresh
        } else if is_endpoint(&path, &self.login_path) {
            EndpointKind::Login
        } else if is_endpoint(&path, &self.logout_path) {
            EndpointKind::Logout
        } else if is_public(&path, &self.public_segment) {
            EndpointKind::Public
        } else {
            EndpointKind::Refreshable
        }
    }
}

fn request_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

fn is_endpoint(path: &str, endpoint: &str) -> bool {
    let endpoint = normalize_path(&request_path(endpoint));
    endpoint != "/" && path == endpoint
}

fn is_public(path: &str, segment: &str) -> bool {
    let segment = segment.trim_matches('/');
    if segment.is_empty() {
        return false;
    }
    path.split('/').any(|part| part == segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_endpoints() {
        let rules = EndpointRules::default();
        assert_eq!(
            rules.classify("https://api.example.com/refresh"),
            EndpointKind::Refresh
        );
        assert_eq!(rules.classify("/login"), EndpointKind::Login);
        assert_eq!(rules.classify("/logout/"), EndpointKind::Logout);
        assert_eq!(
            rules.classify("https://api.example.com/api/public/share/1?x=1"),
            EndpointKind::Public
        );
        assert_eq!(
            rules.classify("https://api.example.com/api/chat"),
            EndpointKind::Refreshable
        );
    }

    #[test]
    fn routes_ending_like_auth_endpoints_stay_refreshable() {
        let rules = EndpointRules::default();
        assert_eq!(rules.classify("/documents/7/refresh"), EndpointKind::Refreshable);
        assert_eq!(rules.classify("/api/login"), EndpointKind::Refreshable);
        assert_eq!(rules.classify("/api/autorefresh"), EndpointKind::Refreshable);
        assert_eq!(rules.classify("/api/publication"), EndpointKind::Refreshable);
        assert_eq!(rules.classify("/refresh?next=/x"), EndpointKind::Refresh);
    }

    #[test]
    fn custom_rules() {
        let rules = EndpointRules {
            refresh_path: "/v1/auth/refresh".to_string(),
            login_path: "https://api.example.com/v1/auth/login".to_string(),
            logout_path: "v1/auth/logout".to_string(),
            public_segment: "open".to_string(),
        };
        assert_eq!(rules.classify("/v1/auth/refresh"), EndpointKind::Refresh);
        assert_eq!(
            rules.classify("https://api.example.com/v1/auth/login"),
            EndpointKind::Login
        );
        assert_eq!(rules.classify("/v1/auth/logout"), EndpointKind::Logout);
        assert_eq!(rules.classify("/refresh"), EndpointKind::Refreshable);
        assert_eq!(rules.classify("/v1/open/feed"), EndpointKind::Public);
    }
}
