//! Streaming POST calls decoded into SSE events.

use std::ops::ControlFlow;

use async_trait::async_trait;
use serde_json::Value;
use tidal_core::{parse_frame, Batching, EndpointKind, FrameDecoder, ParsedEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::{with_bearer, ClientContext};
use crate::error::ClientError;
use crate::policy::{FailurePolicy, StatusClass};
use crate::refresh::SessionRefresher;

/// Receives decoded event batches in arrival order.
#[async_trait]
pub trait EventSink: Send {
    /// Returning `Break` stops the stream as if it had been cancelled.
    async fn deliver(&mut self, batch: Vec<ParsedEvent>) -> ControlFlow<()>;
}

/// Adapts a closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

#[async_trait]
impl<F> EventSink for FnSink<F>
where
    F: FnMut(Vec<ParsedEvent>) + Send,
{
    async fn deliver(&mut self, batch: Vec<ParsedEvent>) -> ControlFlow<()> {
        (self.0)(batch);
        ControlFlow::Continue(())
    }
}

#[async_trait]
impl EventSink for Vec<Vec<ParsedEvent>> {
    async fn deliver(&mut self, batch: Vec<ParsedEvent>) -> ControlFlow<()> {
        self.push(batch);
        ControlFlow::Continue(())
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<Vec<ParsedEvent>> {
    async fn deliver(&mut self, batch: Vec<ParsedEvent>) -> ControlFlow<()> {
        match self.send(batch).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub cancel: Option<CancellationToken>,
    /// Overrides the configured batching for this call.
    pub batching: Option<Batching>,
    /// Treat the endpoint as public regardless of its path.
    pub public: bool,
}

impl StreamOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_batching(mut self, batching: Batching) -> Self {
        self.batching = Some(batching);
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: usize,
    pub frames: usize,
    pub events: usize,
    pub batches: usize,
    /// Whether the call needed its refresh hop.
    pub refreshed: bool,
}

#[derive(Clone)]
pub struct StreamRequester {
    ctx: ClientContext,
    refresher: SessionRefresher,
    policy: FailurePolicy,
}

impl StreamRequester {
    pub(crate) fn new(ctx: ClientContext, refresher: SessionRefresher) -> Self {
        let policy = FailurePolicy::new(ctx.clone(), refresher.clone());
        Self {
            ctx,
            refresher,
            policy,
        }
    }

    /// Opens one streaming call and drives it to completion.
    ///
    /// A `401` on a refreshable endpoint is recovered with at most one refresh
    /// and one reissue of the identical request; every other failure is
    /// surfaced once through the notifier and returned.
    pub async fn open<S>(
        &self,
        url: &str,
        payload: &Value,
        sink: &mut S,
        options: &StreamOptions,
    ) -> Result<StreamSummary, ClientError>
    where
        S: EventSink + ?Sized,
    {
        let target = self.ctx.config.resolve_url(url)?;
        let kind = self.ctx.classify(&target, options.public);
        let cancel = options.cancel.clone().unwrap_or_default();
        let batching = options.batching.unwrap_or(self.ctx.config.batching);

        let token = self.ctx.tokens.access_token()?;
        let mut response = self
            .send(&target, payload, token.as_deref(), &cancel)
            .await?;
        let mut refreshed = false;
        loop {
            match StatusClass::of(response.status()) {
                StatusClass::Success => break,
                StatusClass::Unauthorized if kind.is_refreshable() && !refreshed => {
                    debug!(event = "stream_needs_refresh", url = %target);
                    // The refresher has already told the user when this fails.
                    let token = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ClientError::Aborted),
                        token = self.refresher.refresh() => token?,
                    };
                    refreshed = true;
                    response = self.send(&target, payload, Some(&token), &cancel).await?;
                }
                StatusClass::Unauthorized => {
                    let kind = if refreshed { EndpointKind::Refreshable } else { kind };
                    return Err(self.policy.reject_unauthorized(kind, response).await);
                }
                StatusClass::Failure => return Err(self.policy.reject_status(response).await),
            }
        }

        let mut summary = self.pump(response, sink, batching, &cancel).await?;
        summary.refreshed = refreshed;
        info!(
            event = "stream_completed",
            url = %target,
            events = summary.events,
            batches = summary.batches,
            refreshed
        );
        Ok(summary)
    }

    /// Runs [`open`](Self::open) on a task, delivering batches through a
    /// bounded channel. Dropping the receiver stops the stream.
    pub fn open_channel(
        &self,
        url: &str,
        payload: Value,
        options: StreamOptions,
    ) -> (
        mpsc::Receiver<Vec<ParsedEvent>>,
        JoinHandle<Result<StreamSummary, ClientError>>,
    ) {
        let (mut tx, rx) = mpsc::channel(self.ctx.config.channel_capacity.max(1));
        let requester = self.clone();
        let url = url.to_string();
        let handle = tokio::spawn(async move {
            requester.open(&url, &payload, &mut tx, &options).await
        });
        (rx, handle)
    }

    async fn send(
        &self,
        target: &reqwest::Url,
        payload: &Value,
        token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        let request = with_bearer(self.ctx.http.post(target.clone()), token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(payload);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Aborted),
            sent = request.send() => sent.map_err(|err| self.policy.reject_transport(err)),
        }
    }

    async fn pump<S>(
        &self,
        mut response: reqwest::Response,
        sink: &mut S,
        batching: Batching,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary, ClientError>
    where
        S: EventSink + ?Sized,
    {
        let mut decoder = FrameDecoder::new();
        let mut summary = StreamSummary::default();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(event = "stream_aborted", chunks = summary.chunks);
                    return Err(ClientError::Aborted);
                }
                chunk = response.chunk() => chunk.map_err(|err| self.policy.reject_transport(err))?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            summary.chunks += 1;
            summary.bytes += chunk.len();

            let frames = decoder.push(&chunk);
            if deliver(&frames, batching, sink, &mut summary, cancel)
                .await
                .is_break()
            {
                return Err(ClientError::Aborted);
            }
        }
        drop(response);

        if let Some(rest) = decoder.finish() {
            debug!(event = "stream_flushed_tail", bytes = rest.len());
            if deliver(&[rest], batching, sink, &mut summary, cancel)
                .await
                .is_break()
            {
                return Err(ClientError::Aborted);
            }
        }
        Ok(summary)
    }
}

async fn deliver<S>(
    frames: &[String],
    batching: Batching,
    sink: &mut S,
    summary: &mut StreamSummary,
    cancel: &CancellationToken,
) -> ControlFlow<()>
where
    S: EventSink + ?Sized,
{
    summary.frames += frames.len();
    let batches: Vec<Vec<ParsedEvent>> = match batching {
        Batching::PerChunk => vec![frames.iter().flat_map(|frame| parse_frame(frame)).collect()],
        Batching::PerFrame => frames.iter().map(|frame| parse_frame(frame)).collect(),
    };
    for batch in batches.into_iter().filter(|batch| !batch.is_empty()) {
        if cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        summary.events += batch.len();
        summary.batches += 1;
        if sink.deliver(batch).await.is_break() {
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}
