//! Add-lock (unsecure) mode: no certificate, no handshake, plaintext
//! registration traffic.

mod common;

use boltlink_client::testing::{FakeLock, Reply};
use boltlink_client::{ClientConfig, LockError, Phase, SessionSupervisor};
use boltlink_core::command;

use common::{RecordingListener, SERIAL};

#[tokio::test(start_paused = true)]
async fn register_device_over_plaintext() {
    let lock = FakeLock::builder(SERIAL).build();
    let listener = RecordingListener::new();

    let handle = SessionSupervisor::connect_add_lock(
        lock.clone(),
        SERIAL,
        listener.clone(),
        ClientConfig::default(),
    )
    .await
    .expect("add-lock connect should succeed");
    assert_eq!(handle.phase(), Phase::ReadyUnsecure);

    handle
        .api()
        .register_device(&[0x01, 0x02, 0x03])
        .await
        .expect("registration should succeed");

    let writes = lock.command_writes(command::REGISTER_DEVICE);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].payload, vec![0x01, 0x02, 0x03]);

    handle.clear().await;
    assert_eq!(
        listener.connection_events(),
        vec![(true, false), (false, true)]
    );
}

#[tokio::test(start_paused = true)]
async fn register_device_error_maps() {
    let lock = FakeLock::builder(SERIAL)
        .reply(
            command::REGISTER_DEVICE,
            vec![Reply::indication([0x70, 0x02])],
        )
        .build();
    let listener = RecordingListener::new();

    let handle = SessionSupervisor::connect_add_lock(
        lock.clone(),
        SERIAL,
        listener.clone(),
        ClientConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(
        handle.api().register_device(&[]).await,
        Err(LockError::RegisterDeviceError)
    );
    handle.clear().await;
    assert_eq!(listener.errors(), vec![LockError::RegisterDeviceError]);
}

#[tokio::test(start_paused = true)]
async fn no_handshake_frames_in_add_lock_mode() {
    let lock = FakeLock::builder(SERIAL).build();
    let listener = RecordingListener::new();

    let handle = SessionSupervisor::connect_add_lock(
        lock.clone(),
        SERIAL,
        listener.clone(),
        ClientConfig::default(),
    )
    .await
    .unwrap();

    // The device saw no SET_SIGNED_TIME, no handshake, nothing encrypted;
    // a plain command round-trips immediately.
    handle.api().send_command(command::GET_STATE, &[]).await.unwrap();
    handle.clear().await;
}
