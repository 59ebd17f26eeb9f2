//! Session supervisor.
//!
//! Owns the lifetime of one lock connection: scanning, linking, handshake,
//! signed-time refresh, the ready pump, reconnection, and teardown. The
//! driver is a single task; it is the only place that touches the inbound
//! streams, the session slot, and the hello timer, which is what makes the
//! ordering guarantees hold without further locking.
//!
//! ```text
//! Disconnected ──connect()──▶ Scanning
//! Scanning     ──device found──▶ Linking
//! Linking      ──chars ready──▶ Handshaking   (add-lock: ReadyUnsecure)
//! Handshaking  ──SESSION_INITIALIZED──▶ Ready
//! Handshaking  ──ALERT:NoTrustedTime──▶ RefreshingTime ──▶ Handshaking
//! Handshaking  ──ALERT:Timeout──▶ Handshaking (hello resent)
//! Handshaking  ──ALERT:InvalidCert / NotRegistered──▶ Closed
//! Ready        ──link down──▶ Scanning (re-establish)
//! any          ──clear()/disconnect()──▶ Closed
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use boltlink_core::command::{LockState, LockStatus, command_name, notification};
use boltlink_core::frame::FrameKind;
use boltlink_core::serial::SerialNumber;
use boltlink_crypto::{AccessCredentials, DeviceCertificate, MobileKeystore};
use boltlink_protocol::alert::{AlertCode, AlertDisposition, FatalAlert};
use boltlink_protocol::constants::{HELLO_TIMEOUT, HIGH_PRIORITY_DELAY, HIGH_PRIORITY_TIMEOUT};
use boltlink_protocol::handshake::{AwaitingServerHello, AwaitingServerVerify, AwaitingSessionInit};
use boltlink_protocol::retry::{ConnectErrorClass, ConnectRetry, RetryDecision, RetryPolicy};
use boltlink_protocol::session::{SecureChannel, decode_data_frame};

use crate::api::{LockApi, SessionSlot, WireMode, send_signed_time};
use crate::config::ClientConfig;
use crate::error::LockError;
use crate::framer;
use crate::listener::{
    ListenerDispatcher, ListenerHandle, ListenerKind, SecureConnectionListener,
    UnsecureConnectionListener, spawn_dispatcher,
};
use crate::mux::{CommandMux, OutboundSink};
use crate::providers::{NoSignedTimeProvider, SignedTimeProvider, encode_signed_time_payload};
use crate::transport::{Characteristic, InboundStreams, LockLink, LockTransport, TransportError};

/// Observable connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Scanning,
    Linking,
    Handshaking,
    RefreshingTime,
    Ready,
    ReadyUnsecure,
    Closed,
}

enum ControlRequest {
    Shutdown(oneshot::Sender<()>),
}

/// A connected lock: the typed API plus lifecycle control.
pub struct LockHandle {
    api: LockApi,
    control: mpsc::Sender<ControlRequest>,
    phase: watch::Receiver<Phase>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LockHandle {
    pub fn api(&self) -> &LockApi {
        &self.api
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase transitions (e.g. Ready → Scanning on link loss).
    pub fn phase_watch(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Tear the connection down. When this returns, the session keys are
    /// zeroed, in-flight requests have failed, and no further listener
    /// callbacks will be delivered.
    pub async fn clear(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .control
            .send(ControlRequest::Shutdown(ack_tx))
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
        let task = self.driver.lock().expect("driver handle lock").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Disconnect from the lock. Equivalent to [`clear`](Self::clear): the
    /// engine keeps no state worth preserving across connections.
    pub async fn disconnect(&self) {
        self.clear().await;
    }
}

/// Entry points for establishing lock connections.
pub struct SessionSupervisor;

impl SessionSupervisor {
    /// Connect in secure mode: full handshake, encrypted commands.
    ///
    /// Resolves once the first session is ready, or with the first
    /// non-retryable error. Reconnection after link loss is automatic for
    /// the lifetime of the returned handle.
    pub async fn connect_secure<T, P>(
        transport: T,
        serial: &str,
        certificate: &DeviceCertificate,
        keystore: Arc<dyn MobileKeystore>,
        time_provider: P,
        listener: Arc<dyn SecureConnectionListener>,
        config: ClientConfig,
    ) -> Result<LockHandle, LockError>
    where
        T: LockTransport,
        P: SignedTimeProvider,
    {
        let serial = SerialNumber::parse(serial)?;
        let credentials = AccessCredentials::decode(certificate)?;
        spawn_driver(
            transport,
            serial,
            Some(credentials),
            Some(keystore),
            time_provider,
            ListenerKind::Secure(listener),
            config,
            WireMode::Secure,
        )
        .await
    }

    /// Connect in add-lock mode: no certificate, no handshake, plaintext
    /// commands only (`register_device` and friends).
    pub async fn connect_add_lock<T>(
        transport: T,
        serial: &str,
        listener: Arc<dyn UnsecureConnectionListener>,
        config: ClientConfig,
    ) -> Result<LockHandle, LockError>
    where
        T: LockTransport,
    {
        let serial = SerialNumber::parse(serial)?;
        spawn_driver(
            transport,
            serial,
            None,
            None,
            NoSignedTimeProvider,
            ListenerKind::Unsecure(listener),
            config,
            WireMode::Plaintext,
        )
        .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn spawn_driver<T, P>(
    transport: T,
    serial: SerialNumber,
    credentials: Option<AccessCredentials>,
    keystore: Option<Arc<dyn MobileKeystore>>,
    provider: P,
    listener: ListenerKind,
    config: ClientConfig,
    mode: WireMode,
) -> Result<LockHandle, LockError>
where
    T: LockTransport,
    P: SignedTimeProvider,
{
    let mux = Arc::new(CommandMux::new());
    let session = Arc::new(SessionSlot::new(mode));
    let outbound = OutboundSink::default();
    let (listener_handle, dispatcher) = spawn_dispatcher(listener);
    let (phase_tx, phase_rx) = watch::channel(Phase::Disconnected);
    let (control_tx, control_rx) = mpsc::channel(4);
    let (ready_tx, ready_rx) = oneshot::channel();

    let api = LockApi::new(
        Arc::clone(&mux),
        outbound.clone(),
        Arc::clone(&session),
        listener_handle.clone(),
        config.request_timeout,
        config.notification_timeout,
    );

    let driver = Driver {
        transport,
        serial,
        config,
        credentials,
        keystore,
        provider: Arc::new(provider),
        mux,
        session,
        outbound,
        listener: listener_handle,
        dispatcher: Some(dispatcher),
        phase: phase_tx,
        first_ready: Some(ready_tx),
        refresh_task: Mutex::new(None),
        refresh_in_flight: Arc::new(AtomicBool::new(false)),
        reached_ready: false,
    };
    let task = tokio::spawn(driver.run(control_rx));

    match ready_rx.await {
        Ok(Ok(())) => Ok(LockHandle {
            api,
            control: control_tx,
            phase: phase_rx,
            driver: Mutex::new(Some(task)),
        }),
        Ok(Err(error)) => {
            let _ = task.await;
            Err(error)
        }
        Err(_) => {
            let _ = task.await;
            Err(LockError::ConnectionDead("driver terminated".into()))
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Inbound side of one established link.
struct CycleIo {
    secure: mpsc::Receiver<Vec<u8>>,
    indications: mpsc::Receiver<Vec<u8>>,
    notifications: mpsc::Receiver<Vec<u8>>,
    connected: watch::Receiver<bool>,
    mtu: usize,
}

enum CycleEnd {
    Shutdown(Option<oneshot::Sender<()>>),
    Fatal(LockError),
    Retry(LockError, ConnectErrorClass),
}

enum SessionOutcome {
    Ready(SecureChannel),
    Shutdown(Option<oneshot::Sender<()>>),
    LinkLost,
    Fatal(LockError),
}

enum PumpEnd {
    Shutdown(Option<oneshot::Sender<()>>),
    LinkLost,
    RestartSession,
    Fatal(LockError),
}

enum RefreshEnd {
    Done,
    Shutdown(Option<oneshot::Sender<()>>),
    LinkLost,
    Fatal(LockError),
}

enum Step {
    Hello(AwaitingServerHello),
    Verify(AwaitingServerVerify),
    Init(AwaitingSessionInit),
}

struct Driver<T: LockTransport, P: SignedTimeProvider> {
    transport: T,
    serial: SerialNumber,
    config: ClientConfig,
    credentials: Option<AccessCredentials>,
    keystore: Option<Arc<dyn MobileKeystore>>,
    provider: Arc<P>,
    mux: Arc<CommandMux>,
    session: Arc<SessionSlot>,
    outbound: OutboundSink,
    listener: ListenerHandle,
    dispatcher: Option<ListenerDispatcher>,
    phase: watch::Sender<Phase>,
    first_ready: Option<oneshot::Sender<Result<(), LockError>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    refresh_in_flight: Arc<AtomicBool>,
    reached_ready: bool,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn ack_of(request: Option<ControlRequest>) -> Option<oneshot::Sender<()>> {
    request.map(|ControlRequest::Shutdown(ack)| ack)
}

fn fatal_alert_error(alert: FatalAlert) -> LockError {
    match alert {
        FatalAlert::InvalidCertificate => LockError::InvalidCertificate,
        FatalAlert::NotRegistered => LockError::DeviceNotInitialized,
        FatalAlert::Unknown(code) => {
            LockError::ConnectionDead(format!("fatal alert {code:#04x}"))
        }
    }
}

/// Map a transport failure to a retryable cycle end with its back-off class.
fn transport_retry(error: TransportError) -> CycleEnd {
    let class = match &error {
        TransportError::ScanThrottled => ConnectErrorClass::ScanThrottled,
        TransportError::CharacteristicNotFound(_) => ConnectErrorClass::CharacteristicNotFound,
        TransportError::PermissionDenied(_) => ConnectErrorClass::PermissionDenied,
        TransportError::BluetoothDisabled => ConnectErrorClass::BluetoothDisabled,
        _ => ConnectErrorClass::Other,
    };
    CycleEnd::Retry(error.into(), class)
}

impl<T: LockTransport, P: SignedTimeProvider> Driver<T, P> {
    fn set_phase(&self, phase: Phase) {
        let _ = self.phase.send(phase);
    }

    fn finish_first_ready(&mut self, result: Result<(), LockError>) {
        if let Some(tx) = self.first_ready.take() {
            let _ = tx.send(result);
        }
    }

    async fn run(mut self, mut control: mpsc::Receiver<ControlRequest>) {
        let retry = ConnectRetry::new(self.config.keep_connection);
        let mut failed_attempts = 0u32;

        let outcome: Result<Option<oneshot::Sender<()>>, LockError> = loop {
            self.reached_ready = false;
            let end = self.cycle(&mut control).await;
            if self.reached_ready {
                failed_attempts = 0;
            }
            match end {
                CycleEnd::Shutdown(ack) => break Ok(ack),
                CycleEnd::Fatal(error) => break Err(error),
                CycleEnd::Retry(error, class) => {
                    failed_attempts += 1;
                    match retry.decision(class, failed_attempts) {
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                error = %error,
                                attempt = failed_attempts,
                                delay_s = delay.as_secs(),
                                "connection attempt failed, retrying"
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                req = control.recv() => break Ok(ack_of(req)),
                            }
                        }
                        RetryDecision::GiveUp => break Err(error),
                    }
                }
            }
        };

        // Teardown: keys, waiters, write path, background work.
        self.abort_refresh();
        self.session.clear();
        self.mux.fail_all();
        self.outbound.unbind();

        let ack = match outcome {
            Ok(ack) => {
                self.finish_first_ready(Err(LockError::ConnectionDead(
                    "connection closed".into(),
                )));
                ack
            }
            Err(error) => {
                tracing::error!(error = %error, "connection closed with error");
                self.listener.error(error.clone());
                self.finish_first_ready(Err(error));
                None
            }
        };

        self.set_phase(Phase::Closed);
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().await;
        }
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// One scan → link → session → pump cycle.
    async fn cycle(&mut self, control: &mut mpsc::Receiver<ControlRequest>) -> CycleEnd {
        self.set_phase(Phase::Scanning);
        self.listener.connection_changed(true, false);

        let device = {
            let scan = self.transport.scan_for(&self.serial, self.config.scan_mode);
            if self.config.keep_connection {
                tokio::select! {
                    res = scan => match res {
                        Ok(device) => device,
                        Err(error) => return transport_retry(error),
                    },
                    req = control.recv() => return CycleEnd::Shutdown(ack_of(req)),
                }
            } else {
                tokio::select! {
                    res = tokio::time::timeout(self.config.scan_timeout, scan) => match res {
                        Ok(Ok(device)) => device,
                        Ok(Err(TransportError::DeviceNotFound)) | Err(_) => {
                            return CycleEnd::Fatal(LockError::DeviceNotFound);
                        }
                        Ok(Err(error)) => return transport_retry(error),
                    },
                    req = control.recv() => return CycleEnd::Shutdown(ack_of(req)),
                }
            }
        };
        tracing::info!(serial = %self.serial, address = %device.address, "lock discovered");

        self.set_phase(Phase::Linking);
        let mut link = tokio::select! {
            res = self.transport.connect(&device) => match res {
                Ok(link) => link,
                Err(error) => return transport_retry(error),
            },
            req = control.recv() => return CycleEnd::Shutdown(ack_of(req)),
        };
        let Some(streams) = link.take_streams() else {
            return CycleEnd::Retry(
                LockError::ConnectionDead("inbound streams unavailable".into()),
                ConnectErrorClass::Other,
            );
        };
        let InboundStreams {
            secure,
            indications,
            notifications,
        } = streams;
        let mut io = CycleIo {
            secure,
            indications,
            notifications,
            connected: link.connected(),
            mtu: link.mtu(),
        };
        let link = Arc::new(link);
        tracing::info!(mtu = io.mtu, "link established");

        // Serialize all outbound writes through one task.
        let (out_tx, mut out_rx) = mpsc::channel::<(Characteristic, Vec<u8>)>(32);
        let writer_link = Arc::clone(&link);
        let writer = tokio::spawn(async move {
            while let Some((characteristic, frame)) = out_rx.recv().await {
                if let Err(error) = writer_link.write(characteristic, &frame).await {
                    tracing::warn!(error = %error, "outbound write failed");
                    break;
                }
            }
        });
        self.outbound.bind(out_tx);

        // Priority bump is an optimization; failures are swallowed.
        tokio::time::sleep(HIGH_PRIORITY_DELAY).await;
        let _ = tokio::time::timeout(HIGH_PRIORITY_TIMEOUT, link.request_high_priority()).await;

        let end = self.run_connected(&mut io, control).await;

        self.outbound.unbind();
        writer.abort();
        let _ = writer.await;
        self.abort_refresh();
        self.session.clear();
        self.mux.fail_all();
        link.disconnect().await;
        end
    }

    /// Drive an established link: handshake (secure mode) then the pump,
    /// re-keying in place when the session closes without losing the link.
    async fn run_connected(
        &mut self,
        io: &mut CycleIo,
        control: &mut mpsc::Receiver<ControlRequest>,
    ) -> CycleEnd {
        if let Some(credentials) = self.credentials.clone() {
            loop {
                match self.establish_session(io, control, &credentials).await {
                    SessionOutcome::Ready(channel) => {
                        self.session.install(channel);
                        self.set_phase(Phase::Ready);
                        self.reached_ready = true;
                        self.listener.connection_changed(false, true);
                        self.finish_first_ready(Ok(()));
                    }
                    SessionOutcome::Shutdown(ack) => return CycleEnd::Shutdown(ack),
                    SessionOutcome::LinkLost => {
                        return CycleEnd::Retry(
                            LockError::ConnectionDead("link lost".into()),
                            ConnectErrorClass::Other,
                        );
                    }
                    SessionOutcome::Fatal(error) => return CycleEnd::Fatal(error),
                }

                match self.pump(io, control).await {
                    PumpEnd::RestartSession => {
                        tracing::warn!("session closed, re-establishing");
                        self.session.clear();
                        continue;
                    }
                    PumpEnd::Shutdown(ack) => return CycleEnd::Shutdown(ack),
                    PumpEnd::LinkLost => {
                        return CycleEnd::Retry(
                            LockError::ConnectionDead("link lost".into()),
                            ConnectErrorClass::Other,
                        );
                    }
                    PumpEnd::Fatal(error) => return CycleEnd::Fatal(error),
                }
            }
        } else {
            self.set_phase(Phase::ReadyUnsecure);
            self.reached_ready = true;
            self.listener.connection_changed(false, true);
            self.finish_first_ready(Ok(()));
            loop {
                match self.pump(io, control).await {
                    PumpEnd::RestartSession => continue,
                    PumpEnd::Shutdown(ack) => return CycleEnd::Shutdown(ack),
                    PumpEnd::LinkLost => {
                        return CycleEnd::Retry(
                            LockError::ConnectionDead("link lost".into()),
                            ConnectErrorClass::Other,
                        );
                    }
                    PumpEnd::Fatal(error) => return CycleEnd::Fatal(error),
                }
            }
        }
    }

    /// Run the handshake to completion, restarting on hello timeout or a
    /// timeout alert, refreshing signed time when the lock demands it.
    async fn establish_session(
        &mut self,
        io: &mut CycleIo,
        control: &mut mpsc::Receiver<ControlRequest>,
        credentials: &AccessCredentials,
    ) -> SessionOutcome {
        'restart: loop {
            self.set_phase(Phase::Handshaking);
            let (hello_state, hello) =
                AwaitingServerHello::initiate(credentials.clone(), io.mtu);
            if self
                .outbound
                .send(Characteristic::Send, hello)
                .await
                .is_err()
            {
                return SessionOutcome::LinkLost;
            }
            let mut step = Some(Step::Hello(hello_state));
            let hello_timer = tokio::time::sleep(HELLO_TIMEOUT);
            tokio::pin!(hello_timer);

            loop {
                let awaiting_hello = matches!(step, Some(Step::Hello(_)));
                tokio::select! {
                    raw = io.secure.recv() => {
                        let Some(raw) = raw else { return SessionOutcome::LinkLost };
                        let Some(frame) = framer::decode("secure", &raw) else { continue };

                        if frame.kind == FrameKind::Alert {
                            let Ok(code) = AlertCode::parse(&frame.body) else { continue };
                            tracing::warn!(?code, "alert during handshake");
                            match code.disposition() {
                                AlertDisposition::RefreshSignedTime => {
                                    self.set_phase(Phase::RefreshingTime);
                                    match self.refresh_signed_time(io, control).await {
                                        RefreshEnd::Done => continue 'restart,
                                        RefreshEnd::Shutdown(ack) => {
                                            return SessionOutcome::Shutdown(ack);
                                        }
                                        RefreshEnd::LinkLost => return SessionOutcome::LinkLost,
                                        RefreshEnd::Fatal(error) => {
                                            return SessionOutcome::Fatal(error);
                                        }
                                    }
                                }
                                AlertDisposition::RestartHandshake => continue 'restart,
                                AlertDisposition::Fatal(alert) => {
                                    return SessionOutcome::Fatal(fatal_alert_error(alert));
                                }
                            }
                        }

                        step = match (step.take(), frame.kind) {
                            (Some(Step::Hello(state)), FrameKind::Hello) => {
                                match state.on_server_hello(&frame.body, now_ms()) {
                                    Ok((next, verify)) => {
                                        if self
                                            .outbound
                                            .send(Characteristic::Send, verify)
                                            .await
                                            .is_err()
                                        {
                                            return SessionOutcome::LinkLost;
                                        }
                                        Some(Step::Verify(next))
                                    }
                                    Err(error) => return SessionOutcome::Fatal(error.into()),
                                }
                            }
                            (Some(Step::Verify(state)), FrameKind::ServerVerify) => {
                                let keystore = self
                                    .keystore
                                    .as_ref()
                                    .expect("secure mode always has a keystore");
                                match state.on_server_verify(&frame.body, keystore.as_ref()) {
                                    Ok((next, chunks)) => {
                                        for chunk in chunks {
                                            if self
                                                .outbound
                                                .send(Characteristic::Send, chunk)
                                                .await
                                                .is_err()
                                            {
                                                return SessionOutcome::LinkLost;
                                            }
                                        }
                                        Some(Step::Init(next))
                                    }
                                    Err(error) => return SessionOutcome::Fatal(error.into()),
                                }
                            }
                            (Some(Step::Init(state)), FrameKind::SessionInitialized) => {
                                return SessionOutcome::Ready(
                                    state.on_session_initialized(&frame.body),
                                );
                            }
                            (other, kind) => {
                                tracing::warn!(?kind, "unexpected handshake frame");
                                other
                            }
                        };
                    }
                    _ = &mut hello_timer, if awaiting_hello => {
                        tracing::warn!("no server hello within timeout, restarting handshake");
                        continue 'restart;
                    }
                    note = io.notifications.recv() => match note {
                        Some(raw) => {
                            self.ingest_notification(&raw);
                        }
                        None => return SessionOutcome::LinkLost,
                    },
                    ind = io.indications.recv() => match ind {
                        Some(raw) => {
                            self.ingest_indication(&raw);
                        }
                        None => return SessionOutcome::LinkLost,
                    },
                    res = io.connected.changed() => {
                        if res.is_err() || !*io.connected.borrow() {
                            return SessionOutcome::LinkLost;
                        }
                    }
                    req = control.recv() => return SessionOutcome::Shutdown(ack_of(req)),
                }
            }
        }
    }

    /// The signed-time refresh flow: fetch from the provider, write
    /// `SET_SIGNED_TIME` in plaintext, await the SIGNED_DATETIME outcome,
    /// retry on a fixed budget. The notification stream keeps being pumped
    /// while the outcome is awaited.
    async fn refresh_signed_time(
        &mut self,
        io: &mut CycleIo,
        control: &mut mpsc::Receiver<ControlRequest>,
    ) -> RefreshEnd {
        let policy = RetryPolicy::signed_time();
        let mut failed = 0u32;
        loop {
            let Some(signed_time) = self.provider.signed_time().await else {
                return RefreshEnd::Fatal(LockError::NotProvidedSignedTime);
            };
            let Ok(payload) = encode_signed_time_payload(&signed_time) else {
                return RefreshEnd::Fatal(LockError::NotProvidedSignedTime);
            };

            let mux = Arc::clone(&self.mux);
            let outbound = self.outbound.clone();
            let timeout = self.config.notification_timeout;
            let send = send_signed_time(&mux, &outbound, &payload, timeout);
            tokio::pin!(send);

            let result = loop {
                tokio::select! {
                    res = &mut send => break res,
                    note = io.notifications.recv() => match note {
                        Some(raw) => {
                            self.ingest_notification(&raw);
                        }
                        None => return RefreshEnd::LinkLost,
                    },
                    res = io.connected.changed() => {
                        if res.is_err() || !*io.connected.borrow() {
                            return RefreshEnd::LinkLost;
                        }
                    }
                    req = control.recv() => return RefreshEnd::Shutdown(ack_of(req)),
                }
            };

            match result {
                Ok(()) => {
                    tracing::info!("signed time accepted by the lock");
                    return RefreshEnd::Done;
                }
                Err(LockError::ConnectionDead(_)) => return RefreshEnd::LinkLost,
                Err(error) => {
                    failed += 1;
                    match policy.next_delay(failed) {
                        Some(delay) => {
                            tracing::warn!(
                                error = %error,
                                attempt = failed,
                                "signed time write rejected, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return RefreshEnd::Fatal(LockError::NoSignedTime),
                    }
                }
            }
        }
    }

    /// The ready loop: route indications to waiters, notifications to the
    /// bus and listener, and react to out-of-band alerts.
    async fn pump(
        &mut self,
        io: &mut CycleIo,
        control: &mut mpsc::Receiver<ControlRequest>,
    ) -> PumpEnd {
        loop {
            tokio::select! {
                ind = io.indications.recv() => match ind {
                    Some(raw) => {
                        if !self.ingest_indication(&raw) {
                            return PumpEnd::RestartSession;
                        }
                    }
                    None => return PumpEnd::LinkLost,
                },
                note = io.notifications.recv() => match note {
                    Some(raw) => {
                        if !self.ingest_notification(&raw) {
                            return PumpEnd::RestartSession;
                        }
                    }
                    None => return PumpEnd::LinkLost,
                },
                sec = io.secure.recv() => match sec {
                    Some(raw) => {
                        if let Some(frame) = framer::decode("secure", &raw)
                            && frame.kind == FrameKind::Alert
                            && let Ok(code) = AlertCode::parse(&frame.body)
                        {
                            tracing::warn!(?code, "alert during active session");
                            match code.disposition() {
                                AlertDisposition::RefreshSignedTime => {
                                    self.spawn_background_refresh();
                                }
                                AlertDisposition::RestartHandshake => {
                                    return PumpEnd::RestartSession;
                                }
                                AlertDisposition::Fatal(alert) => {
                                    return PumpEnd::Fatal(fatal_alert_error(alert));
                                }
                            }
                        }
                    }
                    None => return PumpEnd::LinkLost,
                },
                res = io.connected.changed() => {
                    if res.is_err() || !*io.connected.borrow() {
                        return PumpEnd::LinkLost;
                    }
                }
                req = control.recv() => return PumpEnd::Shutdown(ack_of(req)),
            }
        }
    }

    /// Decode and dispatch one indication frame. Returns `false` when the
    /// session must close (crypto failure).
    fn ingest_indication(&self, raw: &[u8]) -> bool {
        let Some(frame) = framer::decode("indication", raw) else {
            return true;
        };
        let channel = self.session.channel();
        match decode_data_frame(channel.as_deref(), &frame) {
            Ok(body) => {
                tracing::debug!(
                    command = command_name(body[0]),
                    "indication received"
                );
                self.mux.complete(body);
                true
            }
            Err(boltlink_protocol::SessionError::Crypto(error)) => {
                tracing::warn!(error = %error, "indication failed authentication");
                false
            }
            Err(error) => {
                tracing::warn!(error = %error, "dropping indication");
                true
            }
        }
    }

    /// Decode and dispatch one notification frame. Returns `false` when the
    /// session must close (crypto failure).
    fn ingest_notification(&self, raw: &[u8]) -> bool {
        let Some(frame) = framer::decode("notification", raw) else {
            return true;
        };
        let channel = self.session.channel();
        match decode_data_frame(channel.as_deref(), &frame) {
            Ok(body) => {
                match body.first() {
                    Some(&notification::LOCK_STATUS_CHANGE) if body.len() >= 3 => {
                        self.listener.lock_status_changed(
                            LockState::from_u8(body[1]),
                            LockStatus::from_u8(body[2]),
                        );
                    }
                    Some(&notification::NEED_DATE_TIME) => {
                        tracing::info!("lock requests a signed time refresh");
                        self.spawn_background_refresh();
                    }
                    _ => {}
                }
                self.listener.notification(body.clone());
                self.mux.publish(body);
                true
            }
            Err(boltlink_protocol::SessionError::Crypto(error)) => {
                tracing::warn!(error = %error, "notification failed authentication");
                false
            }
            Err(error) => {
                tracing::warn!(error = %error, "dropping notification");
                true
            }
        }
    }

    /// Start the in-session signed-time refresh unless one is running.
    /// Failures here give up silently; the lock will re-alert if it still
    /// lacks trusted time.
    fn spawn_background_refresh(&self) {
        if !matches!(*self.phase.borrow(), Phase::Ready | Phase::ReadyUnsecure) {
            return;
        }
        if self.refresh_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }

        let mux = Arc::clone(&self.mux);
        let outbound = self.outbound.clone();
        let provider = Arc::clone(&self.provider);
        let timeout = self.config.notification_timeout;
        let in_flight = Arc::clone(&self.refresh_in_flight);

        let task = tokio::spawn(async move {
            let policy = RetryPolicy::signed_time();
            let mut failed = 0u32;
            loop {
                let Some(signed_time) = provider.signed_time().await else {
                    tracing::warn!("signed time provider returned nothing");
                    break;
                };
                let Ok(payload) = encode_signed_time_payload(&signed_time) else {
                    tracing::warn!("signed time blob is malformed");
                    break;
                };
                match send_signed_time(&mux, &outbound, &payload, timeout).await {
                    Ok(()) => {
                        tracing::info!("signed time refreshed");
                        break;
                    }
                    Err(error) => {
                        failed += 1;
                        match policy.next_delay(failed) {
                            Some(delay) => tokio::time::sleep(delay).await,
                            None => {
                                tracing::warn!(error = %error, "signed time refresh gave up");
                                break;
                            }
                        }
                    }
                }
            }
            in_flight.store(false, Ordering::SeqCst);
        });
        *self.refresh_task.lock().expect("refresh task lock") = Some(task);
    }

    fn abort_refresh(&self) {
        if let Some(task) = self.refresh_task.lock().expect("refresh task lock").take() {
            task.abort();
        }
        self.refresh_in_flight.store(false, Ordering::SeqCst);
    }
}
