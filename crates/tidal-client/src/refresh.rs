//! Single-flight session refresh.
//!
//! A [`SessionRefresher`] owns the only piece of state shared by concurrent
//! calls: whether a refresh exchange is in flight. [`SessionRefresher::refresh`]
//! is a plain function that moves the state to `Refreshing` before it returns,
//! so any caller that asks afterwards (even before the first one awaits) joins
//! the same exchange instead of starting another.
//!
//! The exchange runs on its own task. Dropping every waiter therefore never
//! leaves the state stuck in `Refreshing`; the task always settles it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tidal_core::Notice;
use tracing::{debug, info, warn};

use crate::context::ClientContext;
use crate::error::{AuthFailure, ClientError};
use crate::types::{RefreshRequest, TokenGrant};

pub type RefreshResult = Result<String, ClientError>;

type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The refresh endpoint answered with a non-2xx status.
    Rejected { status: u16 },
    /// A 2xx answer without a usable access token.
    Malformed(String),
    Transport(String),
}

/// Trades a refresh token for a new grant.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError>;
}

/// `POST <refresh_path>` with `{refresh_token}` and the refresh token as bearer.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    url: reqwest::Url,
}

impl HttpTokenExchange {
    pub fn new(http: reqwest::Client, url: reqwest::Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(refresh_token)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|err| ExchangeError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| ExchangeError::Transport(err.to_string()))?;
        TokenGrant::from_body(&body).map_err(ExchangeError::Malformed)
    }
}

/// Handle on one refresh cycle.
#[derive(Clone)]
pub struct RefreshTicket {
    cycle: u64,
    pending: PendingRefresh,
}

impl RefreshTicket {
    /// Monotonic id of the cycle; every waiter of one exchange sees the same id.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub async fn wait(self) -> RefreshResult {
        self.pending.await
    }
}

enum RefreshState {
    Idle,
    Refreshing(RefreshTicket),
}

struct Inner {
    ctx: ClientContext,
    exchange: Arc<dyn TokenExchange>,
    state: Mutex<RefreshState>,
    cycles: Mutex<u64>,
}

#[derive(Clone)]
pub struct SessionRefresher {
    inner: Arc<Inner>,
}

impl SessionRefresher {
    pub(crate) fn new(ctx: ClientContext, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                exchange,
                state: Mutex::new(RefreshState::Idle),
                cycles: Mutex::new(0),
            }),
        }
    }

    /// Resolves to a fresh access token, joining the in-flight exchange when
    /// there is one.
    pub fn refresh(&self) -> impl Future<Output = RefreshResult> + Send + 'static {
        self.ticket().wait()
    }

    /// Current cycle, starting a new exchange when idle.
    pub fn ticket(&self) -> RefreshTicket {
        let mut state = self.inner.lock_state();
        if let RefreshState::Refreshing(ticket) = &*state {
            debug!(event = "session_refresh_joined", cycle = ticket.cycle);
            return ticket.clone();
        }

        let cycle = self.inner.next_cycle();
        let task = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            async move {
                let outcome = inner.run_exchange(cycle).await;
                inner.settle(cycle);
                outcome
            }
        });
        let inner = Arc::clone(&self.inner);
        let pending = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    inner.settle(cycle);
                    Err(ClientError::Transport(format!("refresh task failed: {err}")))
                }
            }
        }
        .boxed()
        .shared();

        let ticket = RefreshTicket { cycle, pending };
        *state = RefreshState::Refreshing(ticket.clone());
        debug!(event = "session_refresh_started", cycle);
        ticket
    }

    /// The in-flight cycle, if any, without starting one.
    pub fn in_flight(&self) -> Option<RefreshTicket> {
        match &*self.inner.lock_state() {
            RefreshState::Idle => None,
            RefreshState::Refreshing(ticket) => Some(ticket.clone()),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Tears the session down without touching the refresh state: clears
    /// stored credentials, tells the user, and redirects to login.
    pub fn expire_session(&self) {
        self.inner.expire_session();
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_cycle(&self) -> u64 {
        let mut cycles = self.cycles.lock().unwrap_or_else(PoisonError::into_inner);
        *cycles += 1;
        *cycles
    }

    fn settle(&self, cycle: u64) {
        let mut state = self.lock_state();
        if matches!(&*state, RefreshState::Refreshing(ticket) if ticket.cycle == cycle) {
            *state = RefreshState::Idle;
        }
    }

    async fn run_exchange(&self, cycle: u64) -> RefreshResult {
        let refresh_token = match self.ctx.tokens.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => return Err(self.fail(cycle, AuthFailure::NoRefreshToken)),
            Err(err) => {
                warn!(event = "session_refresh_store_failed", cycle, error = %err);
                return Err(self.fail(cycle, AuthFailure::NoRefreshToken));
            }
        };

        let grant = match self.exchange.exchange(&refresh_token).await {
            Ok(grant) => grant,
            Err(ExchangeError::Rejected { status }) => {
                return Err(self.fail(cycle, AuthFailure::RefreshRejected { status }));
            }
            Err(ExchangeError::Malformed(reason)) => {
                return Err(self.fail(cycle, AuthFailure::MalformedRefreshResponse(reason)));
            }
            Err(ExchangeError::Transport(reason)) => {
                warn!(event = "session_refresh_unreachable", cycle, error = %reason);
                self.ctx.notify(Notice::NetworkError);
                return Err(ClientError::Transport(reason));
            }
        };

        let stored = self
            .ctx
            .tokens
            .store_access_token(&grant.access_token)
            .and_then(|()| match grant.refresh_token.as_deref() {
                Some(rotated) => self.ctx.tokens.store_refresh_token(rotated),
                None => Ok(()),
            });
        if let Err(err) = stored {
            warn!(event = "session_refresh_store_failed", cycle, error = %err);
            self.ctx.notify(Notice::StorageUnavailable);
            return Err(err.into());
        }

        info!(event = "session_refreshed", cycle);
        Ok(grant.access_token)
    }

    fn fail(&self, cycle: u64, failure: AuthFailure) -> ClientError {
        warn!(event = "session_refresh_failed", cycle, reason = %failure);
        self.expire_session();
        ClientError::AuthTerminal(failure)
    }

    fn expire_session(&self) {
        self.ctx.tokens.clear();
        self.ctx.notify(Notice::SessionExpired);
        if !self.ctx.notifier.on_login_surface() {
            self.ctx.notifier.redirect_to_login();
        }
    }
}
