//! User-facing messages.

use tracing::{error, info};

/// Shows messages to the user. Foreground actions report failures through it; background
/// refreshes only log.
pub trait Notifier: Send + Sync {
    fn show_error(&self, message: &str);

    fn show_info(&self, message: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_error(&self, message: &str) {
        error!(target: "mirror::notify", "{message}");
    }

    fn show_info(&self, message: &str) {
        info!(target: "mirror::notify", "{message}");
    }
}