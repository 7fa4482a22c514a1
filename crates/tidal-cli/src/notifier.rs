use tidal_client::{Notice, Notifier};

/// Prints notices to stderr so stdout stays machine-readable.
pub(crate) struct TerminalNotifier {
    on_login_surface: bool,
}

impl TerminalNotifier {
    pub(crate) fn new(on_login_surface: bool) -> Self {
        Self { on_login_surface }
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: &Notice) {
        eprintln!("warning: {notice}");
    }

    fn redirect_to_login(&self) {
        eprintln!("Run `tidal login` to start a new session.");
    }

    fn on_login_surface(&self) -> bool {
        self.on_login_surface
    }
}
