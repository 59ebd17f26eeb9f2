//! Typed lock operations.
//!
//! Thin mapping from named operations to wire commands: encode, issue through
//! the mux, check the result byte, retry BUSY transparently. Mapped errors
//! surface to the caller and are mirrored to the listener's `on_error`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use boltlink_core::command::{self, CommandParam, LockState, LockStatus};
use boltlink_core::command::notification;
use boltlink_core::settings::DeviceSettings;
use boltlink_core::version::FirmwareVersion;
use boltlink_protocol::result::{CommandKind, check_result, response_result};
use boltlink_protocol::retry::RetryPolicy;
use boltlink_protocol::session::{SecureChannel, plaintext_command};

use crate::error::LockError;
use crate::listener::ListenerHandle;
use crate::mux::{CommandMux, OutboundSink};
use crate::providers::{SignedTime, encode_signed_time_payload};
use crate::transport::Characteristic;

/// Whether commands travel encrypted or in the clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireMode {
    /// Secure mode: commands require a ready session.
    Secure,
    /// Add-lock mode: plaintext only.
    Plaintext,
}

/// The session slot: the one place the active secure channel lives.
///
/// The driver installs a channel when the handshake completes and clears it
/// on teardown or re-key; the API reads it per request.
pub(crate) struct SessionSlot {
    mode: WireMode,
    channel: Mutex<Option<Arc<SecureChannel>>>,
}

impl SessionSlot {
    pub(crate) fn new(mode: WireMode) -> Self {
        Self {
            mode,
            channel: Mutex::new(None),
        }
    }

    pub(crate) fn install(&self, channel: SecureChannel) {
        *self.channel.lock().expect("session slot lock") = Some(Arc::new(channel));
    }

    /// Drop the channel; its keys are zeroed when the last reference goes.
    pub(crate) fn clear(&self) {
        *self.channel.lock().expect("session slot lock") = None;
    }

    pub(crate) fn channel(&self) -> Option<Arc<SecureChannel>> {
        self.channel.lock().expect("session slot lock").clone()
    }

    /// Encode a command frame for the current mode.
    fn encode(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, LockError> {
        match self.mode {
            WireMode::Plaintext => Ok(plaintext_command(command, payload)),
            WireMode::Secure => {
                let channel = self
                    .channel()
                    .ok_or_else(|| LockError::ConnectionDead("no active session".into()))?;
                Ok(channel.encrypt_command(command, payload))
            }
        }
    }
}

/// Typed operations against a connected lock.
///
/// Cloneable and cheap. All operations are cancel-safe: dropping an
/// operation future abandons its waiter without touching the session.
#[derive(Clone)]
pub struct LockApi {
    mux: Arc<CommandMux>,
    outbound: OutboundSink,
    session: Arc<SessionSlot>,
    listener: ListenerHandle,
    request_timeout: Duration,
    notification_timeout: Duration,
}

impl LockApi {
    pub(crate) fn new(
        mux: Arc<CommandMux>,
        outbound: OutboundSink,
        session: Arc<SessionSlot>,
        listener: ListenerHandle,
        request_timeout: Duration,
        notification_timeout: Duration,
    ) -> Self {
        Self {
            mux,
            outbound,
            session,
            listener,
            request_timeout,
            notification_timeout,
        }
    }

    /// Mirror an error to the listener and hand it back to the caller.
    fn fail(&self, error: LockError) -> LockError {
        self.listener.error(error.clone());
        error
    }

    async fn raw_request(&self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, LockError> {
        let frame = self.session.encode(cmd, payload)?;
        self.mux
            .request(
                cmd,
                frame,
                Characteristic::LockNotify,
                &self.outbound,
                self.request_timeout,
            )
            .await
    }

    /// Issue a command, check its result byte, and retry BUSY responses.
    async fn command_with_result(
        &self,
        cmd: u8,
        payload: &[u8],
        kind: CommandKind,
    ) -> Result<Vec<u8>, LockError> {
        let policy = RetryPolicy::busy();
        let mut failed = 0u32;
        loop {
            let body = match self.raw_request(cmd, payload).await {
                Ok(body) => body,
                Err(e) => return Err(self.fail(e)),
            };
            match check_result(kind, response_result(&body)?) {
                Ok(()) => return Ok(body),
                Err(failure) if failure.is_busy() => {
                    failed += 1;
                    match policy.next_delay(failed) {
                        Some(delay) => {
                            tracing::debug!(
                                command = command::command_name(cmd),
                                attempt = failed,
                                "lock busy, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(self.fail(LockError::LockBusy)),
                    }
                }
                Err(failure) => return Err(self.fail(failure.into())),
            }
        }
    }

    /// Movement commands refresh the observed state after an unclassified
    /// error, best effort.
    async fn movement_command(&self, cmd: u8, payload: &[u8]) -> Result<(), LockError> {
        match self.command_with_result(cmd, payload, CommandKind::Generic).await {
            Ok(_) => Ok(()),
            Err(error @ LockError::GeneralLockError(_)) => {
                let _ = self.get_lock_state_quiet().await;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Send an arbitrary command and return the raw indication body.
    pub async fn send_command(&self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, LockError> {
        self.command_with_result(cmd, payload, CommandKind::Generic)
            .await
    }

    pub async fn open_lock(&self, param: CommandParam) -> Result<(), LockError> {
        self.movement_command(command::OPEN_LOCK, &[param as u8]).await
    }

    pub async fn close_lock(&self, param: CommandParam) -> Result<(), LockError> {
        self.movement_command(command::CLOSE_LOCK, &[param as u8]).await
    }

    pub async fn pull_spring(&self) -> Result<(), LockError> {
        self.movement_command(command::PULL_SPRING, &[]).await
    }

    /// Current `(state, status)` of the lock.
    pub async fn get_lock_state(&self) -> Result<(LockState, LockStatus), LockError> {
        let body = self
            .command_with_result(command::GET_STATE, &[], CommandKind::Generic)
            .await?;
        parse_state_body(&body).map_err(|e| self.fail(e))
    }

    /// State refresh that reports nothing to the listener on failure.
    async fn get_lock_state_quiet(&self) -> Result<(), LockError> {
        let body = self.raw_request(command::GET_STATE, &[]).await?;
        check_result(CommandKind::Generic, response_result(&body)?)
            .map_err(LockError::from)?;
        if let Ok((state, status)) = parse_state_body(&body) {
            self.listener.lock_status_changed(state, status);
        }
        Ok(())
    }

    pub async fn get_device_settings(&self) -> Result<DeviceSettings, LockError> {
        let body = self
            .command_with_result(command::GET_SETTINGS, &[], CommandKind::Generic)
            .await?;
        DeviceSettings::from_wire(&body[2..]).map_err(|e| self.fail(e.into()))
    }

    pub async fn get_firmware_version(&self) -> Result<FirmwareVersion, LockError> {
        let body = self
            .command_with_result(command::GET_VERSION, &[], CommandKind::Generic)
            .await?;
        FirmwareVersion::from_wire(&body[2..]).map_err(|e| self.fail(e.into()))
    }

    /// Retrieve the lock's signed serial.
    ///
    /// The notification subscription is armed before the request goes out,
    /// so a device that indicates and notifies back-to-back cannot race the
    /// subscriber.
    pub async fn get_signature(&self) -> Result<String, LockError> {
        let mut sub = self.mux.subscribe();
        self.command_with_result(
            command::REQUEST_SIGNED_SERIAL,
            &[],
            CommandKind::RequestSignature,
        )
        .await?;
        let body = sub
            .next_of(notification::SIGNED_SERIAL, self.notification_timeout)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(BASE64.encode(&body[1..]))
    }

    /// Write a signed-time blob to the lock. Travels in the clear: the lock
    /// accepts trusted time before any session exists.
    pub async fn set_signed_time(&self, signed_time: &SignedTime) -> Result<(), LockError> {
        let payload = encode_signed_time_payload(signed_time)?;
        send_signed_time(&self.mux, &self.outbound, &payload, self.notification_timeout)
            .await
            .map_err(|e| self.fail(e))
    }

    /// Register this device with an uninitialized lock (add-lock mode).
    pub async fn register_device(&self, payload: &[u8]) -> Result<Vec<u8>, LockError> {
        let body = self
            .command_with_result(command::REGISTER_DEVICE, payload, CommandKind::RegisterDevice)
            .await?;
        Ok(body[2..].to_vec())
    }

    /// Wait until the lock reports the target state.
    ///
    /// A JAMMED status fails with `LockJammed` and a TIMEOUT status with
    /// `LockNotResponding`, regardless of the state byte; other states are
    /// skipped until the target arrives or the timeout expires.
    pub async fn wait_for_lock_status_change(
        &self,
        target: LockState,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let mut sub = self.mux.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let body = sub
                .next_of(notification::LOCK_STATUS_CHANGE, remaining)
                .await
                .map_err(|e| self.fail(e))?;
            let state = body.get(1).copied().map(LockState::from_u8);
            let status = body.get(2).copied().map(LockStatus::from_u8);
            match status {
                Some(LockStatus::Jammed) => return Err(self.fail(LockError::LockJammed)),
                Some(LockStatus::Timeout) => {
                    return Err(self.fail(LockError::LockNotResponding));
                }
                _ => {}
            }
            if state == Some(target) {
                return Ok(());
            }
        }
    }
}

/// Parse a `GET_STATE` body: `cmd || result || state || status`.
fn parse_state_body(body: &[u8]) -> Result<(LockState, LockStatus), LockError> {
    let state = body
        .get(2)
        .copied()
        .map(LockState::from_u8)
        .ok_or_else(|| LockError::ConnectionDead("state response too short".into()))?;
    let status = body
        .get(3)
        .copied()
        .map(LockStatus::from_u8)
        .unwrap_or(LockStatus::Ok);
    Ok((state, status))
}

/// Shared signed-time write: subscribe for the SIGNED_DATETIME outcome first,
/// then write the plaintext frame. Used by the API and the supervisor's
/// refresh flow.
pub(crate) async fn send_signed_time(
    mux: &CommandMux,
    outbound: &OutboundSink,
    payload: &[u8],
    timeout: Duration,
) -> Result<(), LockError> {
    let mut sub = mux.subscribe();
    let frame = plaintext_command(command::SET_SIGNED_TIME, payload);
    outbound.send(Characteristic::LockNotify, frame).await?;

    let body = sub
        .next_of(notification::SIGNED_DATETIME, timeout)
        .await?;
    match body.get(1) {
        Some(0x00) => Ok(()),
        _ => Err(LockError::SetSignedTimeError),
    }
}
