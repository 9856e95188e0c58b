//! Connected pages
//!
//! Each page that talks to the worker holds a `Client` with a bounded tokio
//! channel. The hub keeps the sending halves, records which version controls
//! each page, and fans lifecycle notifications out to every page still
//! listening.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::messages::WorkerMessage;

/// Capacity of each client's message channel
const CLIENT_CHANNEL_CAPACITY: usize = 16;

/// A connected page
#[derive(Debug)]
pub struct Client {
    id: u64,
    receiver: mpsc::Receiver<WorkerMessage>,
}

impl Client {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next message from the worker
    ///
    /// Returns `None` once the hub has dropped this client.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.receiver.recv().await
    }

    /// Checks for a pending message without blocking
    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct ClientSlot {
    id: u64,
    controller: Option<String>,
    sender: mpsc::Sender<WorkerMessage>,
}

/// Registry of connected pages
///
/// Cloning a hub yields another handle to the same set of clients.
#[derive(Debug, Clone, Default)]
pub struct ClientHub {
    slots: Arc<Mutex<Vec<ClientSlot>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new page, not yet controlled by any version
    pub fn connect(&self) -> Client {
        let (sender, receiver) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(ClientSlot {
            id,
            controller: None,
            sender,
        });
        Client { id, receiver }
    }

    /// Number of pages still connected
    pub fn len(&self) -> usize {
        let mut slots = self.lock();
        prune(&mut slots);
        slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version currently controlling the given page
    pub fn controller(&self, client_id: u64) -> Option<String> {
        self.lock()
            .iter()
            .find(|s| s.id == client_id)
            .and_then(|s| s.controller.clone())
    }

    /// Makes `version` the controller of every connected page
    ///
    /// Returns how many pages were claimed.
    pub fn claim(&self, version: &str) -> usize {
        let mut slots = self.lock();
        prune(&mut slots);
        for slot in slots.iter_mut() {
            slot.controller = Some(version.to_string());
        }
        slots.len()
    }

    /// Posts `message` to every connected page
    ///
    /// Pages whose channel is full miss the message. Returns how many pages
    /// received it.
    pub fn broadcast(&self, message: &WorkerMessage) -> usize {
        let mut slots = self.lock();
        prune(&mut slots);

        let mut delivered = 0;
        for slot in slots.iter() {
            match slot.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client = slot.id, "client message queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ClientSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops pages whose receiving half is gone
fn prune(slots: &mut Vec<ClientSlot>) {
    slots.retain(|s| !s.sender.is_closed());
}
