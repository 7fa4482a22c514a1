use tidal_core::Notice;
use tracing::warn;

/// UI collaborator receiving user-visible notices and login redirects.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);

    fn redirect_to_login(&self);

    /// Whether the user is already looking at the login surface, in which
    /// case no redirect is issued.
    fn on_login_surface(&self) -> bool {
        false
    }
}

/// Reports notices and redirects as structured `tracing` events, for
/// headless callers that read logs rather than a terminal.
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    login_surface: String,
}

impl TracingNotifier {
    pub fn new(login_surface: &str) -> Self {
        Self {
            login_surface: login_surface.to_string(),
        }
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        warn!(event = "user_notice", key = notice.key(), "{notice}");
    }

    fn redirect_to_login(&self) {
        warn!(event = "login_redirect", target = %self.login_surface, "sign in again");
    }
}
