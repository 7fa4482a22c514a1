use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidal_core::constants::endpoints;
use tidal_core::{Batching, EndpointRules};
use tracing::warn;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TOKEN_DOMAIN: &str = "localhost";
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStoreKind {
    Memory,
    File,
    #[default]
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub refresh_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub public_segment: String,
    /// Where users are sent when their session can no longer be recovered.
    pub login_surface: String,
    pub token_domain: String,
    pub token_store: TokenStoreKind,
    /// Additional session entries removed on teardown.
    pub extra_session_keys: Vec<String>,
    pub batching: Batching,
    pub channel_capacity: usize,
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_path: endpoints::REFRESH_PATH.to_string(),
            login_path: endpoints::LOGIN_PATH.to_string(),
            logout_path: endpoints::LOGOUT_PATH.to_string(),
            public_segment: endpoints::PUBLIC_SEGMENT.to_string(),
            login_surface: endpoints::LOGIN_PATH.to_string(),
            token_domain: DEFAULT_TOKEN_DOMAIN.to_string(),
            token_store: TokenStoreKind::default(),
            extra_session_keys: Vec::new(),
            batching: Batching::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Endpoint rules with each auth path resolved to the request path it
    /// produces under `base_url`.
    pub fn endpoint_rules(&self) -> EndpointRules {
        EndpointRules {
            refresh_path: self.resolved_path(&self.refresh_path),
            login_path: self.resolved_path(&self.login_path),
            logout_path: self.resolved_path(&self.logout_path),
            public_segment: self.public_segment.clone(),
        }
    }

    fn resolved_path(&self, path: &str) -> String {
        self.resolve_url(path)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| path.to_string())
    }

    /// Absolute URL for `target`, which is either absolute already or a path
    /// below `base_url`.
    pub fn resolve_url(&self, target: &str) -> Result<reqwest::Url, ClientError> {
        if let Ok(url) = reqwest::Url::parse(target) {
            return Ok(url);
        }
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            target.trim_start_matches('/')
        );
        reqwest::Url::parse(&joined)
            .map_err(|err| ClientError::Config(format!("invalid url {joined}: {err}")))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Reads a YAML config file, falling back to defaults when it is missing or
/// unreadable.
pub fn load_config(path: &Path) -> ClientConfig {
    if !path.exists() {
        return ClientConfig::default();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(event = "config_read_failed", path = %path.display(), error = %err);
            return ClientConfig::default();
        }
    };
    match serde_yaml::from_str(&contents) {
        Ok(config) => config,
        Err(err) => {
            warn!(event = "config_parse_failed", path = %path.display(), error = %err);
            ClientConfig::default()
        }
    }
}

pub fn apply_env_overrides(config: &mut ClientConfig) {
    apply_overrides_from(config, |name| env::var(name).ok());
}

pub(crate) fn apply_overrides_from<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let strings: [(&str, &mut String); 7] = [
        ("TIDAL_BASE_URL", &mut config.base_url),
        ("TIDAL_REFRESH_PATH", &mut config.refresh_path),
        ("TIDAL_LOGIN_PATH", &mut config.login_path),
        ("TIDAL_LOGOUT_PATH", &mut config.logout_path),
        ("TIDAL_PUBLIC_SEGMENT", &mut config.public_segment),
        ("TIDAL_LOGIN_SURFACE", &mut config.login_surface),
        ("TIDAL_TOKEN_DOMAIN", &mut config.token_domain),
    ];
    for (name, slot) in strings {
        if let Some(value) = lookup(name) {
            if value.trim().is_empty() {
                warn!(event = "config_invalid", field = name, value = %value);
            } else {
                *slot = value.trim().to_string();
            }
        }
    }

    if let Some(value) = lookup("TIDAL_TOKEN_STORE") {
        if let Some(kind) = parse_token_store(&value) {
            config.token_store = kind;
        } else {
            warn!(event = "config_invalid", field = "TIDAL_TOKEN_STORE", value = %value);
        }
    }
    if let Some(value) = lookup("TIDAL_BATCHING") {
        if let Some(batching) = Batching::parse(&value) {
            config.batching = batching;
        } else {
            warn!(event = "config_invalid", field = "TIDAL_BATCHING", value = %value);
        }
    }
    if let Some(value) = lookup("TIDAL_REQUEST_TIMEOUT_SECS") {
        match value.trim().parse::<u64>() {
            Ok(0) => config.request_timeout_secs = None,
            Ok(secs) => config.request_timeout_secs = Some(secs),
            Err(_) => {
                warn!(
                    event = "config_invalid",
                    field = "TIDAL_REQUEST_TIMEOUT_SECS",
                    value = %value
                );
            }
        }
    }
    if let Some(value) = lookup("TIDAL_CHANNEL_CAPACITY") {
        match value.trim().parse::<usize>() {
            Ok(capacity) if capacity > 0 => config.channel_capacity = capacity,
            _ => {
                warn!(
                    event = "config_invalid",
                    field = "TIDAL_CHANNEL_CAPACITY",
                    value = %value
                );
            }
        }
    }
    if let Some(value) = lookup("TIDAL_KEYRING") {
        match parse_bool(&value) {
            Some(true) => config.token_store = TokenStoreKind::Keyring,
            Some(false) if config.token_store == TokenStoreKind::Keyring => {
                config.token_store = TokenStoreKind::File;
            }
            Some(false) => {}
            None => warn!(event = "config_invalid", field = "TIDAL_KEYRING", value = %value),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn normalize_enum(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace('-', "_")
}

fn parse_token_store(value: &str) -> Option<TokenStoreKind> {
    match normalize_enum(value).as_str() {
        "memory" => Some(TokenStoreKind::Memory),
        "file" => Some(TokenStoreKind::File),
        "keyring" | "keychain" => Some(TokenStoreKind::Keyring),
        _ => None,
    }
}
