//! Command demultiplexer.
//!
//! Sits between the inbound pump and the typed API. Two inbound paths exist:
//! indication bodies complete the pending request keyed by their command byte;
//! notification bodies fan out to every subscriber of the bus, keyed by their
//! first byte.
//!
//! Request discipline: at most one outstanding waiter per command byte. A
//! second request for the same command parks on that command's lock until the
//! first completes or times out. The waiter is registered *before* the write
//! goes out, so a device that answers faster than the caller resumes cannot
//! slip a response past the table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use boltlink_core::command::command_name;

use crate::error::LockError;
use crate::transport::Characteristic;

const BUS_CAPACITY: usize = 64;

/// Outbound write queue shared by the API and the supervisor.
///
/// The queue is bound to a writer task while a link is up; unbound, every
/// send fails with `ConnectionDead`. One writer per connection keeps writes
/// serialized per characteristic.
#[derive(Clone, Default)]
pub struct OutboundSink {
    inner: Arc<Mutex<Option<mpsc::Sender<(Characteristic, Vec<u8>)>>>>,
}

impl OutboundSink {
    pub(crate) fn bind(&self, tx: mpsc::Sender<(Characteristic, Vec<u8>)>) {
        *self.inner.lock().expect("outbound sink lock") = Some(tx);
    }

    pub(crate) fn unbind(&self) {
        *self.inner.lock().expect("outbound sink lock") = None;
    }

    pub(crate) async fn send(
        &self,
        characteristic: Characteristic,
        frame: Vec<u8>,
    ) -> Result<(), LockError> {
        let tx = self
            .inner
            .lock()
            .expect("outbound sink lock")
            .clone()
            .ok_or_else(|| LockError::ConnectionDead("no active link".into()))?;
        tx.send((characteristic, frame))
            .await
            .map_err(|_| LockError::ConnectionDead("link writer stopped".into()))
    }
}

/// Request/response correlation and notification fan-out.
pub struct CommandMux {
    pending: Mutex<HashMap<u8, oneshot::Sender<Vec<u8>>>>,
    locks: Mutex<HashMap<u8, Arc<tokio::sync::Mutex<()>>>>,
    bus: broadcast::Sender<Vec<u8>>,
}

impl Default for CommandMux {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandMux {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            pending: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Subscribe to the notification bus. No backlog: only notifications
    /// published after this call are seen.
    pub fn subscribe(&self) -> NotificationStream {
        NotificationStream {
            rx: self.bus.subscribe(),
        }
    }

    /// Deliver an indication body to its waiter.
    pub(crate) fn complete(&self, body: Vec<u8>) {
        let Some(&command) = body.first() else {
            return;
        };
        let waiter = self.pending.lock().expect("pending table lock").remove(&command);
        match waiter {
            Some(tx) => {
                // Receiver may have timed out concurrently; that's fine.
                let _ = tx.send(body);
            }
            None => {
                tracing::debug!(
                    command = command_name(command),
                    "indication with no outstanding request"
                );
            }
        }
    }

    /// Fan a notification body out to all subscribers.
    pub(crate) fn publish(&self, body: Vec<u8>) {
        // No subscribers is not an error.
        let _ = self.bus.send(body);
    }

    /// Drop every pending waiter. Their requests fail with `ConnectionDead`.
    pub(crate) fn fail_all(&self) {
        self.pending.lock().expect("pending table lock").clear();
    }

    fn command_lock(&self, command: u8) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("command locks lock")
            .entry(command)
            .or_default()
            .clone()
    }

    /// Issue a request and wait for the matching indication.
    ///
    /// `frame` is the ready-to-write wire frame; correlation is on `command`.
    /// Returns the full indication body (`cmd || result || …`).
    pub async fn request(
        &self,
        command: u8,
        frame: Vec<u8>,
        characteristic: Characteristic,
        outbound: &OutboundSink,
        timeout: Duration,
    ) -> Result<Vec<u8>, LockError> {
        // Serialize same-command requests; distinct commands proceed freely.
        let slot = self.command_lock(command);
        let _guard = slot.lock().await;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending table lock")
            .insert(command, tx);
        let _cleanup = PendingCleanup { mux: self, command };

        tracing::debug!(command = command_name(command), "request written");
        outbound.send(characteristic, frame).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(LockError::ConnectionDead("session torn down".into())),
            Err(_) => {
                tracing::warn!(command = command_name(command), "request timed out");
                Err(LockError::Timeout(command))
            }
        }
    }
}

/// Removes the pending entry when a request future is dropped, whether by
/// timeout, teardown, or caller cancellation.
struct PendingCleanup<'a> {
    mux: &'a CommandMux,
    command: u8,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        self.mux
            .pending
            .lock()
            .expect("pending table lock")
            .remove(&self.command);
    }
}

/// A live subscription to the notification bus.
pub struct NotificationStream {
    rx: broadcast::Receiver<Vec<u8>>,
}

impl NotificationStream {
    /// The next notification whose first byte equals `kind`.
    pub async fn next_of(&mut self, kind: u8, timeout: Duration) -> Result<Vec<u8>, LockError> {
        self.next_matching(kind, |_| true, timeout).await
    }

    /// The next notification of `kind` whose body also satisfies `filter`.
    pub async fn next_matching(
        &mut self,
        kind: u8,
        filter: impl Fn(&[u8]) -> bool,
        timeout: Duration,
    ) -> Result<Vec<u8>, LockError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let body = match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Ok(body)) => body,
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    tracing::warn!(missed, "notification subscriber lagged");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(LockError::ConnectionDead("notification bus closed".into()));
                }
                Err(_) => return Err(LockError::Timeout(kind)),
            };
            if body.first() == Some(&kind) && filter(&body) {
                return Ok(body);
            }
        }
    }
}
