use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Tokens issued by the login or refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GrantEnvelope {
    Bare(TokenGrant),
    Wrapped { data: TokenGrant },
}

impl TokenGrant {
    /// Accepts both a bare grant and one wrapped in the backend's
    /// `{code, msg, data}` envelope.
    pub fn from_body(body: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(body).map_err(|err| err.to_string())?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, String> {
        let envelope: GrantEnvelope =
            serde_json::from_value(value).map_err(|err| err.to_string())?;
        let grant = match envelope {
            GrantEnvelope::Bare(grant) | GrantEnvelope::Wrapped { data: grant } => grant,
        };
        if grant.access_token.trim().is_empty() {
            return Err("access_token is empty".to_string());
        }
        Ok(grant)
    }
}

const MESSAGE_FIELDS: [&str; 4] = ["msg", "message", "error", "detail"];

/// Human-readable message from a JSON error body, if it carries one.
pub(crate) fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    MESSAGE_FIELDS.iter().find_map(|field| match value.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    })
}
