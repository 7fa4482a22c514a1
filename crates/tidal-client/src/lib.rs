#![allow(clippy::pedantic)]
#![allow(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
mod context;
pub mod error;
pub mod notify;
mod policy;
pub mod refresh;
pub mod replay;
pub mod session;
pub mod store;
pub mod stream;
pub mod types;

pub use crate::config::{ClientConfig, TokenStoreKind};
pub use crate::error::{AuthFailure, ClientError, StoreError};
pub use crate::notify::{Notifier, TracingNotifier};
pub use crate::refresh::{
    ExchangeError, HttpTokenExchange, RefreshTicket, SessionRefresher, TokenExchange,
};
pub use crate::replay::{ApiRequest, RequestReplayer};
pub use crate::session::SessionClient;
pub use crate::store::{
    store_for, FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionTokens, TokenStore,
};
pub use crate::stream::{EventSink, FnSink, StreamOptions, StreamRequester, StreamSummary};
pub use crate::types::TokenGrant;

pub use tidal_core::{Batching, EndpointKind, EventData, Notice, ParsedEvent};
