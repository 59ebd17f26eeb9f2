//! Connection listeners and callback dispatch.
//!
//! Callbacks run on a dedicated dispatcher task, never on the I/O path. The
//! driver and the API push events through a [`ListenerHandle`]; the dispatcher
//! invokes the user's trait object. On teardown the dispatcher drains what is
//! already queued and stops; nothing is delivered after `clear()` returns.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use boltlink_core::command::{LockState, LockStatus};

use crate::error::LockError;

/// Callbacks for a secure-mode connection.
pub trait SecureConnectionListener: Send + Sync {
    fn on_connection_changed(&self, connecting: bool, connected: bool) {
        let _ = (connecting, connected);
    }
    fn on_lock_status_changed(&self, state: LockState, status: LockStatus) {
        let _ = (state, status);
    }
    fn on_notification(&self, payload: &[u8]) {
        let _ = payload;
    }
    fn on_error(&self, error: &LockError) {
        let _ = error;
    }
}

/// Callbacks for an add-lock (unsecure) connection.
pub trait UnsecureConnectionListener: Send + Sync {
    fn on_unsecure_connection_changed(&self, connecting: bool, connected: bool) {
        let _ = (connecting, connected);
    }
    fn on_notification(&self, payload: &[u8]) {
        let _ = payload;
    }
    fn on_error(&self, error: &LockError) {
        let _ = error;
    }
}

/// Listener attachment for either mode.
pub(crate) enum ListenerKind {
    Secure(Arc<dyn SecureConnectionListener>),
    Unsecure(Arc<dyn UnsecureConnectionListener>),
}

#[derive(Debug)]
enum ListenerEvent {
    ConnectionChanged { connecting: bool, connected: bool },
    LockStatusChanged(LockState, LockStatus),
    Notification(Vec<u8>),
    Error(LockError),
}

/// Sender side of the callback pipeline. Cheap to clone; sends never block
/// the I/O path.
#[derive(Clone)]
pub(crate) struct ListenerHandle {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ListenerHandle {
    pub(crate) fn connection_changed(&self, connecting: bool, connected: bool) {
        let _ = self.tx.send(ListenerEvent::ConnectionChanged {
            connecting,
            connected,
        });
    }

    pub(crate) fn lock_status_changed(&self, state: LockState, status: LockStatus) {
        let _ = self.tx.send(ListenerEvent::LockStatusChanged(state, status));
    }

    pub(crate) fn notification(&self, payload: Vec<u8>) {
        let _ = self.tx.send(ListenerEvent::Notification(payload));
    }

    pub(crate) fn error(&self, error: LockError) {
        let _ = self.tx.send(ListenerEvent::Error(error));
    }
}

/// The dispatcher task plus its stop signal. Owned by the driver.
pub(crate) struct ListenerDispatcher {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerDispatcher {
    /// Signal the dispatcher to drain queued events and stop, then wait for
    /// it. No callback runs after this returns.
    pub(crate) async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

fn dispatch(kind: &ListenerKind, event: ListenerEvent) {
    match (kind, event) {
        (ListenerKind::Secure(l), ListenerEvent::ConnectionChanged { connecting, connected }) => {
            l.on_connection_changed(connecting, connected);
        }
        (ListenerKind::Unsecure(l), ListenerEvent::ConnectionChanged { connecting, connected }) => {
            l.on_unsecure_connection_changed(connecting, connected);
        }
        (ListenerKind::Secure(l), ListenerEvent::LockStatusChanged(state, status)) => {
            l.on_lock_status_changed(state, status);
        }
        (ListenerKind::Unsecure(_), ListenerEvent::LockStatusChanged(..)) => {}
        (ListenerKind::Secure(l), ListenerEvent::Notification(payload)) => {
            l.on_notification(&payload);
        }
        (ListenerKind::Unsecure(l), ListenerEvent::Notification(payload)) => {
            l.on_notification(&payload);
        }
        (ListenerKind::Secure(l), ListenerEvent::Error(error)) => l.on_error(&error),
        (ListenerKind::Unsecure(l), ListenerEvent::Error(error)) => l.on_error(&error),
    }
}

/// Spawn the dispatcher task for a listener.
pub(crate) fn spawn_dispatcher(kind: ListenerKind) -> (ListenerHandle, ListenerDispatcher) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => dispatch(&kind, event),
                    None => break,
                },
                _ = stop_rx.changed() => {
                    // Drain whatever is already queued, then stop for good.
                    while let Ok(event) = rx.try_recv() {
                        dispatch(&kind, event);
                    }
                    break;
                }
            }
        }
    });

    (ListenerHandle { tx }, ListenerDispatcher { stop_tx, task })
}
