use std::sync::Arc;

use serde_json::{json, Value};
use tidal_core::Notice;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::error::ClientError;
use crate::notify::Notifier;
use crate::refresh::{HttpTokenExchange, SessionRefresher, TokenExchange};
use crate::replay::{ApiRequest, RequestReplayer};
use crate::store::{SessionTokens, TokenStore};
use crate::stream::StreamRequester;
use crate::types::TokenGrant;

/// Entry point wiring one refresher, its streaming and plain requesters, and
/// the session's credentials.
#[derive(Clone)]
pub struct SessionClient {
    ctx: ClientContext,
    refresher: SessionRefresher,
    streams: StreamRequester,
    requests: RequestReplayer,
}

impl SessionClient {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build http client: {err}")))?;
        Self::with_http(http, config, store, notifier)
    }

    /// Uses `http` for every call, including the refresh exchange.
    pub fn with_http(
        http: reqwest::Client,
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ClientError> {
        let refresh_url = config.resolve_url(&config.refresh_path)?;
        let exchange = Arc::new(HttpTokenExchange::new(http.clone(), refresh_url));
        Ok(Self::with_exchange(http, config, store, notifier, exchange))
    }

    pub fn with_exchange(
        http: reqwest::Client,
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        let tokens = SessionTokens::new(store, config.extra_session_keys.clone());
        let ctx = ClientContext::new(http, config, tokens, notifier);
        let refresher = SessionRefresher::new(ctx.clone(), exchange);
        Self {
            streams: StreamRequester::new(ctx.clone(), refresher.clone()),
            requests: RequestReplayer::new(ctx.clone(), refresher.clone()),
            ctx,
            refresher,
        }
    }

    pub fn streams(&self) -> &StreamRequester {
        &self.streams
    }

    pub fn requests(&self) -> &RequestReplayer {
        &self.requests
    }

    pub fn refresher(&self) -> &SessionRefresher {
        &self.refresher
    }

    pub fn tokens(&self) -> &SessionTokens {
        &self.ctx.tokens
    }

    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }

    pub fn is_authenticated(&self) -> Result<bool, ClientError> {
        Ok(self.ctx.tokens.access_token()?.is_some())
    }

    /// Posts `credentials` to the login endpoint and stores the issued grant.
    pub async fn login(&self, credentials: Value) -> Result<TokenGrant, ClientError> {
        let login_path = self.ctx.config.login_path.clone();
        let body = self
            .requests
            .send(ApiRequest::post(login_path, credentials))
            .await?;
        let grant = TokenGrant::from_value(body).map_err(|reason| {
            warn!(event = "login_response_invalid", reason = %reason);
            ClientError::Decode(reason)
        })?;

        let stored = self
            .ctx
            .tokens
            .store_access_token(&grant.access_token)
            .and_then(|()| match grant.refresh_token.as_deref() {
                Some(refresh) => self.ctx.tokens.store_refresh_token(refresh),
                None => Ok(()),
            });
        if let Err(err) = stored {
            warn!(event = "login_store_failed", error = %err);
            self.ctx.notify(Notice::StorageUnavailable);
            return Err(err.into());
        }
        info!(event = "logged_in", domain = %self.ctx.config.token_domain);
        Ok(grant)
    }

    /// Tells the backend the session is over, then forgets it locally even
    /// when the backend call failed.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let logout_path = self.ctx.config.logout_path.clone();
        let outcome = self
            .requests
            .send(ApiRequest::post(logout_path, json!({})))
            .await;
        self.ctx.tokens.clear();
        info!(event = "logged_out", domain = %self.ctx.config.token_domain);
        outcome.map(|_| ())
    }
}
