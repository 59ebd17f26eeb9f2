//! Teardown and cancellation semantics: `clear()` silences everything, and
//! cancelling an operation releases its waiter without touching the session.

mod common;

use std::time::Duration;

use boltlink_client::testing::{FakeLock, Reply};
use boltlink_client::{ClientConfig, LockError, Phase};
use boltlink_core::command::{self, CommandParam, notification};

use common::{RecordingListener, SERIAL, connect_secure};

#[tokio::test(start_paused = true)]
async fn clear_fails_pending_and_silences_callbacks() {
    // The open request is swallowed so it is still pending when clear() runs.
    let lock = FakeLock::builder(SERIAL)
        .reply(command::OPEN_LOCK, vec![])
        .build();
    let listener = RecordingListener::new();
    let handle = connect_secure(&lock, listener.clone(), ClientConfig::default())
        .await
        .unwrap();

    let api = handle.api().clone();
    let pending = tokio::spawn(async move { api.open_lock(CommandParam::None).await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    handle.clear().await;
    assert_eq!(handle.phase(), Phase::Closed);

    // The in-flight request fails rather than hanging until its timeout.
    assert!(matches!(
        pending.await.unwrap(),
        Err(LockError::ConnectionDead(_))
    ));

    // Nothing arrives after clear(): device events are ignored and no
    // further callbacks are delivered.
    let events_before = listener.event_count();
    lock.notify(vec![notification::LOCK_STATUS_CHANGE, 0x06, 0x00]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(listener.event_count(), events_before);

    // The session is gone: new operations fail immediately.
    assert!(matches!(
        handle.api().open_lock(CommandParam::None).await,
        Err(LockError::ConnectionDead(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn clear_is_idempotent() {
    let lock = FakeLock::builder(SERIAL).build();
    let listener = RecordingListener::new();
    let handle = connect_secure(&lock, listener.clone(), ClientConfig::default())
        .await
        .unwrap();

    handle.clear().await;
    handle.clear().await;
    handle.disconnect().await;
    assert_eq!(handle.phase(), Phase::Closed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_releases_its_waiter() {
    let lock = FakeLock::builder(SERIAL)
        .reply(command::OPEN_LOCK, vec![]) // first request: swallowed
        .reply(command::OPEN_LOCK, vec![Reply::indication([0x51, 0x00])])
        .build();
    let listener = RecordingListener::new();
    let handle = connect_secure(&lock, listener.clone(), ClientConfig::default())
        .await
        .unwrap();

    let api = handle.api().clone();
    let first = tokio::spawn(async move { api.open_lock(CommandParam::None).await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Cancel the in-flight operation.
    first.abort();
    let _ = first.await;

    // The command slot is free and the session is intact: the next request
    // for the same command completes.
    handle
        .api()
        .open_lock(CommandParam::None)
        .await
        .expect("session survives cancellation");
    handle.clear().await;
}
