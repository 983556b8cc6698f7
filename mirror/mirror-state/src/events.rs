//! Typed event channels connecting the caches.
//!
//! Every component owns one [`EventChannel`] over its own event enum. Emission is
//! synchronous and never blocks; subscribers are spawned listener tasks that handle
//! events one at a time in emission order.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast channel for one component's events.
#[derive(Debug)]
pub struct EventChannel<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventChannel<E> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: E) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone + Send + 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventChannel<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Receive the next event, skipping over a lag. `None` once the channel is closed.
pub async fn next_event<E: Clone>(
    receiver: &mut broadcast::Receiver<E>,
    component: &'static str,
) -> Option<E> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(component, skipped, "Listener lagged behind, events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Spawn a task feeding every event of `receiver` to `handler`.
///
/// The task only holds a weak reference to `target` between events, so it never keeps
/// its component alive and ends once the component is gone.
pub fn spawn_listener<T, E, F, Fut>(
    target: &Arc<T>,
    mut receiver: broadcast::Receiver<E>,
    component: &'static str,
    handler: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    E: Clone + Send + 'static,
    F: Fn(Arc<T>, E) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let target = Arc::downgrade(target);
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut receiver, component).await {
            let Some(target) = target.upgrade() else {
                break;
            };
            handler(target, event).await;
        }
    })
}

/// Background tasks owned by a component, aborted when it is disposed.
#[derive(Debug, Default)]
pub struct Subscriptions {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handle: JoinHandle<()>) {
        self.handles.lock().push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn abort_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.abort_all();
    }
}
