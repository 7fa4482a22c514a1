#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tidal_client::{
    ClientConfig, ExchangeError, MemoryTokenStore, Notice, Notifier, SessionClient, TokenExchange,
    TokenGrant, TokenStore,
};
use tokio::sync::Semaphore;

pub const DOMAIN: &str = "tests.local";

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    redirects: AtomicUsize,
    on_login: bool,
}

impl RecordingNotifier {
    pub fn on_login_surface() -> Self {
        Self {
            on_login: true,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices lock").clone()
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().expect("notices lock").push(notice.clone());
    }

    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_login_surface(&self) -> bool {
        self.on_login
    }
}

/// Token exchange that blocks until the test releases it and answers from a
/// scripted list of outcomes.
pub struct GatedExchange {
    gate: Semaphore,
    calls: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<TokenGrant, ExchangeError>>>,
}

impl GatedExchange {
    pub fn new(outcomes: Vec<Result<TokenGrant, ExchangeError>>) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            outcomes: Mutex::new(outcomes.into()),
        })
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for GatedExchange {
    async fn exchange(&self, _refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.expect("gate open").forget();
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted outcome".into())))
    }
}

pub fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
    }
}

pub fn config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        token_domain: DOMAIN.to_string(),
        ..ClientConfig::default()
    }
}

pub fn signed_in_store(access: &str, refresh: &str) -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new(DOMAIN));
    store.set("access_token", access).expect("store access");
    store.set("refresh_token", refresh).expect("store refresh");
    store
}

pub fn http_client(
    base_url: &str,
    store: Arc<MemoryTokenStore>,
    notifier: Arc<RecordingNotifier>,
) -> SessionClient {
    SessionClient::with_http(reqwest::Client::new(), config(base_url), store, notifier)
        .expect("client")
}

pub fn gated_client(
    base_url: &str,
    store: Arc<MemoryTokenStore>,
    notifier: Arc<RecordingNotifier>,
    exchange: Arc<GatedExchange>,
) -> SessionClient {
    SessionClient::with_exchange(
        reqwest::Client::new(),
        config(base_url),
        store,
        notifier,
        exchange,
    )
}
