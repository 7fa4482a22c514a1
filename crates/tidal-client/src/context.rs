use std::sync::Arc;

use tidal_core::{EndpointKind, EndpointRules, Notice};

use crate::config::ClientConfig;
use crate::notify::Notifier;
use crate::store::SessionTokens;

/// Collaborators shared by every component of one client.
#[derive(Clone)]
pub(crate) struct ClientContext {
    pub(crate) http: reqwest::Client,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) rules: Arc<EndpointRules>,
    pub(crate) tokens: SessionTokens,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl ClientContext {
    pub(crate) fn new(
        http: reqwest::Client,
        config: ClientConfig,
        tokens: SessionTokens,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let rules = Arc::new(config.endpoint_rules());
        Self {
            http,
            config: Arc::new(config),
            rules,
            tokens,
            notifier,
        }
    }

    pub(crate) fn classify(&self, url: &reqwest::Url, public: bool) -> EndpointKind {
        if public {
            return EndpointKind::Public;
        }
        self.rules.classify(url.as_str())
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.notifier.notify(&notice);
    }
}

pub(crate) fn with_bearer(
    builder: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}
