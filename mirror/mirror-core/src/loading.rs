//! Loading-state guard: at most one refresh cycle of a cache in flight at a time.

use tokio::sync::watch;

/// Tracks whether a refresh cycle is in flight and lets callers await its end.
pub struct LoadingState {
    loading: watch::Sender<bool>,
}

/// Held for the duration of a refresh cycle. Dropping it ends the cycle, including when
/// the cycle fails or its future is cancelled.
#[must_use = "the cycle ends as soon as the guard is dropped"]
pub struct LoadingGuard<'a> {
    loading: &'a watch::Sender<bool>,
}

impl LoadingState {
    pub fn new() -> Self {
        let (loading, _) = watch::channel(false);
        Self { loading }
    }

    /// Start a cycle. Returns `None` when one is already in flight; the request is
    /// dropped, not queued.
    pub fn try_begin(&self) -> Option<LoadingGuard<'_>> {
        let started = self.loading.send_if_modified(|loading| {
            if *loading {
                false
            } else {
                *loading = true;
                true
            }
        });
        started.then_some(LoadingGuard {
            loading: &self.loading,
        })
    }

    /// Start a cycle once the one in flight, if any, has ended.
    pub async fn begin(&self) -> LoadingGuard<'_> {
        loop {
            if let Some(guard) = self.try_begin() {
                return guard;
            }
            self.idle().await;
        }
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Resolves when no cycle is in flight, immediately if none is.
    pub async fn idle(&self) {
        let mut receiver = self.loading.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = receiver.wait_for(|loading| !*loading).await;
    }
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading.send_replace(false);
    }
}
