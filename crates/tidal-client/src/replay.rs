//! Plain JSON requests with queued replay across a session refresh.
//!
//! A refreshable call answered with `401` is parked under the refresh cycle
//! it joined. The first call parked for a cycle arms one drain task; when the
//! cycle settles the drain takes every entry of that cycle out of the queue in
//! a single critical section and replays them in arrival order, or rejects
//! them all with the cycle's error.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use reqwest::Method;
use serde_json::Value;
use tidal_core::EndpointKind;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::context::{with_bearer, ClientContext};
use crate::error::ClientError;
use crate::policy::{FailurePolicy, StatusClass};
use crate::refresh::{RefreshTicket, SessionRefresher};

type Reply = oneshot::Sender<Result<Value, ClientError>>;

/// One outbound call, kept whole so it can be reissued unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub public: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            public: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }
}

struct QueuedCall {
    cycle: u64,
    request: ApiRequest,
    reply: Reply,
}

#[derive(Default)]
struct ReplayQueue {
    calls: VecDeque<QueuedCall>,
    /// Cycles that already have a drain task waiting on them.
    armed: HashSet<u64>,
}

impl ReplayQueue {
    fn take_cycle(&mut self, cycle: u64) -> Vec<QueuedCall> {
        self.armed.remove(&cycle);
        let (taken, kept): (VecDeque<_>, VecDeque<_>) =
            self.calls.drain(..).partition(|call| call.cycle == cycle);
        self.calls = kept;
        taken.into()
    }
}

struct Inner {
    ctx: ClientContext,
    refresher: SessionRefresher,
    policy: FailurePolicy,
    queue: Mutex<ReplayQueue>,
}

#[derive(Clone)]
pub struct RequestReplayer {
    inner: Arc<Inner>,
}

impl RequestReplayer {
    pub(crate) fn new(ctx: ClientContext, refresher: SessionRefresher) -> Self {
        let policy = FailurePolicy::new(ctx.clone(), refresher.clone());
        Self {
            inner: Arc::new(Inner {
                ctx,
                refresher,
                policy,
                queue: Mutex::new(ReplayQueue::default()),
            }),
        }
    }

    /// Sends `request` and resolves to its decoded JSON body.
    ///
    /// Non-JSON bodies come back as a string value and empty bodies as
    /// `null`.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ClientError> {
        let target = self.inner.ctx.config.resolve_url(&request.url)?;
        let kind = self.inner.ctx.classify(&target, request.public);
        let token = self.inner.ctx.tokens.access_token()?;

        let response = self.inner.dispatch(&request, &target, token.as_deref()).await?;
        match StatusClass::of(response.status()) {
            StatusClass::Success => Ok(decode_body(response).await),
            StatusClass::Unauthorized if kind.is_refreshable() => self.park(request).await,
            StatusClass::Unauthorized => {
                Err(self.inner.policy.reject_unauthorized(kind, response).await)
            }
            StatusClass::Failure => Err(self.inner.policy.reject_status(response).await),
        }
    }

    /// Calls waiting for a refresh cycle to settle.
    pub fn pending_len(&self) -> usize {
        self.inner.lock_queue().calls.len()
    }

    async fn park(&self, request: ApiRequest) -> Result<Value, ClientError> {
        let ticket = self.inner.refresher.ticket();
        let cycle = ticket.cycle();
        let (reply, outcome) = oneshot::channel();

        let arm = {
            let mut queue = self.inner.lock_queue();
            queue.calls.push_back(QueuedCall {
                cycle,
                request,
                reply,
            });
            debug!(event = "request_parked", cycle, queued = queue.calls.len());
            queue.armed.insert(cycle)
        };
        if arm {
            tokio::spawn(Arc::clone(&self.inner).drain(ticket));
        }

        outcome.await.unwrap_or(Err(ClientError::Aborted))
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, ReplayQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        target: &reqwest::Url,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut builder = with_bearer(
            self.ctx.http.request(request.method.clone(), target.clone()),
            token,
        );
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
            .send()
            .await
            .map_err(|err| self.policy.reject_transport(err))
    }

    async fn drain(self: Arc<Self>, ticket: RefreshTicket) {
        let cycle = ticket.cycle();
        let outcome = ticket.wait().await;
        let calls = self.lock_queue().take_cycle(cycle);

        match outcome {
            Ok(token) => {
                info!(event = "requests_replayed", cycle, count = calls.len());
                join_all(calls.into_iter().map(|call| {
                    let token = token.as_str();
                    let inner = &self;
                    async move {
                        let result = inner.replay(&call.request, token).await;
                        // The caller may have given up waiting.
                        let _ = call.reply.send(result);
                    }
                }))
                .await;
            }
            Err(err) => {
                debug!(event = "requests_rejected", cycle, count = calls.len(), error = %err);
                for call in calls {
                    let _ = call.reply.send(Err(err.clone()));
                }
            }
        }
    }

    async fn replay(&self, request: &ApiRequest, token: &str) -> Result<Value, ClientError> {
        let target = self.ctx.config.resolve_url(&request.url)?;
        let response = self.dispatch(request, &target, Some(token)).await?;
        match StatusClass::of(response.status()) {
            StatusClass::Success => Ok(decode_body(response).await),
            StatusClass::Unauthorized => Err(self
                .policy
                .reject_unauthorized(EndpointKind::Refreshable, response)
                .await),
            StatusClass::Failure => Err(self.policy.reject_status(response).await),
        }
    }
}

async fn decode_body(response: reqwest::Response) -> Value {
    let body = response.bytes().await.unwrap_or_default();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
}
