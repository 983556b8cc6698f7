//! Component-scoped logging handle.
//!
//! Each cache receives its own `Logger` at construction instead of reaching for a
//! process-wide logger, so every event it records carries its component name. Events
//! with structured fields call the `tracing` macros directly and pass
//! `component = logger.component()`.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logger {
    component: &'static str,
}

impl Logger {
    pub const fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn trace(&self, message: impl Display) {
        tracing::trace!(component = self.component, "{message}");
    }

    pub fn debug(&self, message: impl Display) {
        tracing::debug!(component = self.component, "{message}");
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(component = self.component, "{message}");
    }

    pub fn warn(&self, message: impl Display) {
        tracing::warn!(component = self.component, "{message}");
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(component = self.component, "{message}");
    }

    /// Log a failure of one item in a batch, naming the entity it belongs to.
    pub fn batch_error(&self, entity: &str, id: &str, error: impl Display) {
        tracing::error!(component = self.component, entity, id, "{error}");
    }
}
