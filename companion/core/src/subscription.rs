//! Listener subscription
//!
//! Host applications forward IPC events (a prompt typed into a separate
//! input window, a tray toggle, ...) to the companion. Only one listener
//! may receive them at a time; a second registration would process every
//! prompt twice.
//!
//! Registration is a value: [`ListenerRegistry::subscribe`] hands out an
//! owned [`Subscription`], and dropping it unregisters. The registry's lock
//! covers registration only. Delivery clones the sender and releases it
//! before sending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Event forwarded from another process or window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IpcEvent {
    /// A prompt to submit
    Chat {
        /// Prompt text
        message: String,
    },
    /// Show or hide the main window
    MainToggle,
    /// Open the input window
    OpenModal,
}

/// Subscription errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Another listener holds the registration
    #[error("A listener is already subscribed")]
    AlreadySubscribed,

    /// Nobody is listening
    #[error("No listener is subscribed")]
    NoListener,
}

#[derive(Debug)]
struct Registration {
    id: u64,
    tx: mpsc::UnboundedSender<IpcEvent>,
}

/// Hands out at most one live [`Subscription`] at a time
#[derive(Clone, Debug, Default)]
pub struct ListenerRegistry {
    slot: Arc<Mutex<Option<Registration>>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener
    pub fn subscribe(&self) -> Result<Subscription, SubscriptionError> {
        let mut slot = self.slot.lock();

        if slot.as_ref().is_some_and(|r| !r.tx.is_closed()) {
            tracing::warn!("Listener registration refused, one is already active");
            return Err(SubscriptionError::AlreadySubscribed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(Registration { id, tx });
        tracing::debug!(subscription = id, "Listener registered");

        Ok(Subscription {
            id,
            rx,
            slot: Arc::downgrade(&self.slot),
        })
    }

    /// Whether a listener is registered
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|r| !r.tx.is_closed())
    }

    /// Deliver an event to the active listener
    pub fn publish(&self, event: IpcEvent) -> Result<(), SubscriptionError> {
        let tx = self
            .slot
            .lock()
            .as_ref()
            .map(|r| r.tx.clone())
            .ok_or(SubscriptionError::NoListener)?;

        tx.send(event).map_err(|_| SubscriptionError::NoListener)
    }
}

fn unregister(slot: &Mutex<Option<Registration>>, id: u64) {
    let mut slot = slot.lock();
    if slot.as_ref().is_some_and(|r| r.id == id) {
        *slot = None;
        tracing::debug!(subscription = id, "Listener unregistered");
    }
}

/// The active listener's end of the registry
///
/// Dropping it unregisters the listener.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<IpcEvent>,
    slot: Weak<Mutex<Option<Registration>>>,
}

impl Subscription {
    /// Receive the next event. `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<IpcEvent> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Option<IpcEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            unregister(&slot, self.id);
        }
    }
}
