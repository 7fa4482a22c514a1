use reqwest::StatusCode;
use tidal_core::{EndpointKind, Notice};
use tracing::{debug, warn};

use crate::context::ClientContext;
use crate::error::{AuthFailure, ClientError};
use crate::refresh::SessionRefresher;
use crate::types::error_message;

/// How a response status moves one logical call forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Unauthorized,
    Failure,
}

impl StatusClass {
    pub(crate) fn of(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized
        } else {
            Self::Failure
        }
    }
}

/// Terminal handling shared by streaming and plain requests. Every path that
/// returns an error here has emitted exactly one notice.
#[derive(Clone)]
pub(crate) struct FailurePolicy {
    ctx: ClientContext,
    refresher: SessionRefresher,
}

impl FailurePolicy {
    pub(crate) fn new(ctx: ClientContext, refresher: SessionRefresher) -> Self {
        Self { ctx, refresher }
    }

    /// Rejects a non-2xx, non-401 response.
    pub(crate) async fn reject_status(&self, response: reqwest::Response) -> ClientError {
        let status = response.status();
        let url = response.url().clone();
        match status.as_u16() {
            400 => {
                let body = response.bytes().await.unwrap_or_default();
                let message = error_message(&body).unwrap_or_else(|| status.to_string());
                warn!(event = "request_rejected", url = %url, status = 400, message = %message);
                self.ctx.notify(Notice::BadRequest(message.clone()));
                ClientError::BadRequest { message }
            }
            500 | 502 => {
                warn!(event = "service_unavailable", url = %url, status = status.as_u16());
                self.ctx.notify(Notice::ServiceUnavailable);
                ClientError::Service {
                    status: status.as_u16(),
                }
            }
            504 => {
                warn!(event = "server_error", url = %url, status = 504);
                self.ctx.notify(Notice::ServerError);
                ClientError::Service { status: 504 }
            }
            other => {
                warn!(event = "request_failed", url = %url, status = other);
                self.ctx.notify(Notice::RequestFailed(other));
                ClientError::UnexpectedStatus { status: other }
            }
        }
    }

    /// Rejects a `401` that will not lead to a refresh: the endpoint is not
    /// refreshable, or the call already spent its single refresh hop.
    pub(crate) async fn reject_unauthorized(
        &self,
        kind: EndpointKind,
        response: reqwest::Response,
    ) -> ClientError {
        let url = response.url().clone();
        debug!(event = "unauthorized_terminal", url = %url, kind = kind.as_str());
        match kind {
            EndpointKind::Public => {
                self.ctx.notify(Notice::PublicEndpointUnauthorized);
                AuthFailure::Unrefreshable(kind).into()
            }
            EndpointKind::Login => {
                let body = response.bytes().await.unwrap_or_default();
                let message = error_message(&body).unwrap_or_else(|| "Invalid credentials".into());
                self.ctx.notify(Notice::InvalidCredentials(message));
                AuthFailure::Unrefreshable(kind).into()
            }
            EndpointKind::Logout | EndpointKind::Refresh => {
                self.refresher.expire_session();
                AuthFailure::Unrefreshable(kind).into()
            }
            EndpointKind::Refreshable => {
                warn!(event = "unauthorized_after_refresh", url = %url);
                self.ctx.notify(Notice::Unauthorized);
                AuthFailure::RetryUnauthorized.into()
            }
        }
    }

    pub(crate) fn reject_transport(&self, err: reqwest::Error) -> ClientError {
        warn!(event = "transport_failed", error = %err);
        self.ctx.notify(Notice::NetworkError);
        ClientError::transport(err)
    }
}
