//! In-process fake lock for tests.
//!
//! [`FakeLock`] implements [`LockTransport`] with a scripted device engine
//! behind it. The engine speaks the real device side of the protocol: it runs
//! the handshake with the same crypto primitives, encrypts its replies once a
//! session is up, and stamps a rolling message counter into every outbound
//! frame header. Tests script per-command replies and fault behaviors through
//! the builder, then drive the supervisor and API against it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use boltlink_core::command;
use boltlink_core::command::notification;
use boltlink_core::frame::{FrameKind, InboundFrame};
use boltlink_core::serial::SerialNumber;
use boltlink_crypto::{
    DeviceCertificate, EphemeralKeypair, MobileKeystore, SessionCipher, SoftwareKeystore,
    derive_session_key,
};
use boltlink_protocol::handshake::server_verify_message;

use crate::transport::{
    Characteristic, DeviceHandle, InboundStreams, LockLink, LockTransport, ScanMode,
    TransportError,
};

const FAKE_CERTIFICATE: &[u8] = b"fake-lock-access-certificate";

/// Where a scripted reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyChannel {
    Indication,
    Notification,
}

/// One scripted device reply.
#[derive(Debug, Clone)]
pub struct Reply {
    channel: ReplyChannel,
    body: Vec<u8>,
    delay: Duration,
}

impl Reply {
    pub fn indication(body: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: ReplyChannel::Indication,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn notification(body: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: ReplyChannel::Notification,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// Delay before this reply is sent (after any previous reply).
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A decoded command write observed by the device, for assertions.
#[derive(Debug, Clone)]
pub struct CommandWrite {
    pub at: Instant,
    pub command: u8,
    pub payload: Vec<u8>,
}

pub struct FakeLockBuilder {
    serial: SerialNumber,
    mtu: usize,
    discoverable: bool,
    connect_failures: VecDeque<TransportError>,
    scripts: HashMap<u8, VecDeque<Vec<Reply>>>,
    alerts_on_hello: VecDeque<u8>,
    drop_hellos: u32,
    require_signed_time: bool,
}

impl FakeLockBuilder {
    /// Script the replies to the next request for `command`. Each call queues
    /// one request's worth of replies; they are consumed in order.
    pub fn reply(mut self, command: u8, replies: Vec<Reply>) -> Self {
        self.scripts.entry(command).or_default().push_back(replies);
        self
    }

    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Lock not advertising; scans will not find it.
    pub fn hidden(mut self) -> Self {
        self.discoverable = false;
        self
    }

    /// Fail the next connection attempts with these errors, in order.
    pub fn fail_connects(mut self, errors: Vec<TransportError>) -> Self {
        self.connect_failures = errors.into();
        self
    }

    /// Swallow the first `n` client hellos (hello-timeout testing).
    pub fn drop_hellos(mut self, n: u32) -> Self {
        self.drop_hellos = n;
        self
    }

    /// Answer each client hello with this alert code, once per call, before
    /// any other hello handling.
    pub fn alert_on_hello(mut self, code: u8) -> Self {
        self.alerts_on_hello.push_back(code);
        self
    }

    /// Refuse the handshake with a NO_TRUSTED_TIME alert until a signed time
    /// has been written.
    pub fn require_signed_time(mut self) -> Self {
        self.require_signed_time = true;
        self
    }

    pub fn build(self) -> FakeLock {
        FakeLock {
            shared: Arc::new(DeviceShared {
                serial: self.serial,
                mtu: self.mtu,
                discoverable: AtomicBool::new(self.discoverable),
                connect_failures: Mutex::new(self.connect_failures),
                scripts: Mutex::new(self.scripts),
                alerts_on_hello: Mutex::new(self.alerts_on_hello),
                drop_hellos: AtomicU32::new(self.drop_hellos),
                require_signed_time: AtomicBool::new(self.require_signed_time),
                signed_time_set: AtomicBool::new(false),
                signer: SoftwareKeystore::new(),
                write_log: Mutex::new(Vec::new()),
                engine_tx: Mutex::new(None),
            }),
        }
    }
}

struct DeviceShared {
    serial: SerialNumber,
    mtu: usize,
    discoverable: AtomicBool,
    connect_failures: Mutex<VecDeque<TransportError>>,
    scripts: Mutex<HashMap<u8, VecDeque<Vec<Reply>>>>,
    alerts_on_hello: Mutex<VecDeque<u8>>,
    drop_hellos: AtomicU32,
    require_signed_time: AtomicBool,
    signed_time_set: AtomicBool,
    signer: SoftwareKeystore,
    write_log: Mutex<Vec<CommandWrite>>,
    engine_tx: Mutex<Option<mpsc::Sender<EngineCmd>>>,
}

/// A scripted in-process lock.
#[derive(Clone)]
pub struct FakeLock {
    shared: Arc<DeviceShared>,
}

impl FakeLock {
    pub fn builder(serial: &str) -> FakeLockBuilder {
        FakeLockBuilder {
            serial: SerialNumber::parse(serial).expect("test serial must be valid"),
            mtu: 128,
            discoverable: true,
            connect_failures: VecDeque::new(),
            scripts: HashMap::new(),
            alerts_on_hello: VecDeque::new(),
            drop_hellos: 0,
            require_signed_time: false,
        }
    }

    /// The certificate material a caller would receive from the backend for
    /// this lock.
    pub fn certificate(&self) -> DeviceCertificate {
        DeviceCertificate {
            certificate: BASE64.encode(FAKE_CERTIFICATE),
            device_public_key: BASE64.encode(
                self.shared
                    .signer
                    .public_key()
                    .expect("software keystore never fails"),
            ),
        }
    }

    pub fn set_discoverable(&self, discoverable: bool) {
        self.shared.discoverable.store(discoverable, Ordering::SeqCst);
    }

    /// Push an asynchronous notification to the client, encrypted if a
    /// session is active.
    pub fn notify(&self, body: Vec<u8>) {
        if let Some(tx) = self.shared.engine_tx.lock().expect("engine tx lock").clone() {
            let _ = tx.try_send(EngineCmd::Notify(body));
        }
    }

    /// Drop the active link, as a radio loss would.
    pub fn drop_link(&self) {
        if let Some(tx) = self.shared.engine_tx.lock().expect("engine tx lock").clone() {
            let _ = tx.try_send(EngineCmd::DropLink);
        }
    }

    /// All decoded command writes the device has seen for `command`.
    pub fn command_writes(&self, command: u8) -> Vec<CommandWrite> {
        self.shared
            .write_log
            .lock()
            .expect("write log lock")
            .iter()
            .filter(|w| w.command == command)
            .cloned()
            .collect()
    }

    fn advertised_uuid(&self) -> String {
        let digits = self.shared.serial.digits();
        let hex = format!("{:0>32}", digits);
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl LockTransport for FakeLock {
    type Link = FakeLink;

    async fn scan_for(
        &self,
        serial: &SerialNumber,
        _mode: ScanMode,
    ) -> Result<DeviceHandle, TransportError> {
        let advertised = self.advertised_uuid();
        if !self.shared.discoverable.load(Ordering::SeqCst)
            || !serial.matches_advertised_uuid(&advertised)
        {
            // A real scan keeps listening for adverts that never come; the
            // caller's timeout bounds the wait.
            std::future::pending::<()>().await;
        }
        Ok(DeviceHandle {
            address: "AA:BB:CC:DD:EE:FF".into(),
            serial: serial.clone(),
        })
    }

    async fn connect(&self, _device: &DeviceHandle) -> Result<FakeLink, TransportError> {
        if let Some(error) = self
            .shared
            .connect_failures
            .lock()
            .expect("connect failures lock")
            .pop_front()
        {
            return Err(error);
        }

        let (secure_tx, secure_rx) = mpsc::channel(64);
        let (ind_tx, ind_rx) = mpsc::channel(64);
        let (note_tx, note_rx) = mpsc::channel(64);
        let (engine_tx, engine_rx) = mpsc::channel(64);
        let (conn_tx, conn_rx) = watch::channel(true);

        *self.shared.engine_tx.lock().expect("engine tx lock") = Some(engine_tx.clone());
        tokio::spawn(engine(
            Arc::clone(&self.shared),
            engine_rx,
            EngineOut {
                secure: secure_tx,
                indications: ind_tx,
                notifications: note_tx,
                connected: conn_tx,
            },
        ));

        Ok(FakeLink {
            shared: Arc::clone(&self.shared),
            streams: Mutex::new(Some(InboundStreams {
                secure: secure_rx,
                indications: ind_rx,
                notifications: note_rx,
            })),
            engine_tx,
            connected: conn_rx,
        })
    }
}

pub struct FakeLink {
    shared: Arc<DeviceShared>,
    streams: Mutex<Option<InboundStreams>>,
    engine_tx: mpsc::Sender<EngineCmd>,
    connected: watch::Receiver<bool>,
}

impl LockLink for FakeLink {
    fn mtu(&self) -> usize {
        self.shared.mtu
    }

    fn take_streams(&mut self) -> Option<InboundStreams> {
        self.streams.lock().expect("streams lock").take()
    }

    fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    async fn write(
        &self,
        characteristic: Characteristic,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        self.engine_tx
            .send(EngineCmd::Write(characteristic, frame.to_vec()))
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    async fn request_high_priority(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.engine_tx.send(EngineCmd::DropLink).await;
    }
}

// ---------------------------------------------------------------------------
// Device engine
// ---------------------------------------------------------------------------

enum EngineCmd {
    Write(Characteristic, Vec<u8>),
    Notify(Vec<u8>),
    DropLink,
}

struct EngineOut {
    secure: mpsc::Sender<Vec<u8>>,
    indications: mpsc::Sender<Vec<u8>>,
    notifications: mpsc::Sender<Vec<u8>>,
    connected: watch::Sender<bool>,
}

struct PendingHandshake {
    key: [u8; 64],
    client_pub: [u8; 32],
    lock_pub: [u8; 32],
}

struct EngineState {
    counter: u8,
    cipher: Option<SessionCipher>,
    pending: Option<PendingHandshake>,
    verify_buf: Vec<u8>,
}

impl EngineState {
    /// Frame a device→client message with the rolling counter nibble.
    fn frame(&mut self, kind: FrameKind, body: &[u8]) -> Vec<u8> {
        let header = (self.counter << 4) | kind as u8;
        self.counter = (self.counter + 1) & 0x0F;
        let mut frame = Vec::with_capacity(1 + body.len());
        frame.push(header);
        frame.extend_from_slice(body);
        frame
    }

    /// Wrap a message body for the data path: encrypted once a session is
    /// active, plaintext before.
    fn data_frame(&mut self, body: &[u8]) -> Vec<u8> {
        match &self.cipher {
            Some(cipher) => {
                let token = cipher.encrypt(body);
                self.frame(FrameKind::DataEncrypted, &token)
            }
            None => self.frame(FrameKind::DataNotEncrypted, body),
        }
    }
}

async fn engine(shared: Arc<DeviceShared>, mut rx: mpsc::Receiver<EngineCmd>, out: EngineOut) {
    let mut st = EngineState {
        counter: 1,
        cipher: None,
        pending: None,
        verify_buf: Vec::new(),
    };

    while let Some(cmd) = rx.recv().await {
        match cmd {
            EngineCmd::Write(Characteristic::Send, raw) => {
                handle_handshake_write(&shared, &mut st, &raw, &out).await;
            }
            EngineCmd::Write(Characteristic::LockNotify, raw) => {
                handle_command_write(&shared, &mut st, &raw, &out).await;
            }
            EngineCmd::Write(..) => {}
            EngineCmd::Notify(body) => {
                let frame = st.data_frame(&body);
                let _ = out.notifications.send(frame).await;
            }
            EngineCmd::DropLink => break,
        }
    }
    let _ = out.connected.send(false);
}

async fn handle_handshake_write(
    shared: &DeviceShared,
    st: &mut EngineState,
    raw: &[u8],
    out: &EngineOut,
) {
    let Ok(frame) = InboundFrame::decode(raw) else {
        return;
    };
    match frame.kind {
        FrameKind::Hello => {
            let pending_drops = shared.drop_hellos.load(Ordering::SeqCst);
            if pending_drops > 0 {
                shared.drop_hellos.store(pending_drops - 1, Ordering::SeqCst);
                return;
            }
            let next_alert_code = shared.alerts_on_hello.lock().expect("alerts lock").pop_front();
            if let Some(code) = next_alert_code {
                let alert = st.frame(FrameKind::Alert, &[code]);
                let _ = out.secure.send(alert).await;
                return;
            }
            if shared.require_signed_time.load(Ordering::SeqCst)
                && !shared.signed_time_set.load(Ordering::SeqCst)
            {
                let alert = st.frame(FrameKind::Alert, &[0x02]);
                let _ = out.secure.send(alert).await;
                return;
            }
            let Ok(client_pub) = <[u8; 32]>::try_from(&frame.body[..32.min(frame.body.len())])
            else {
                return;
            };
            let eph = EphemeralKeypair::generate();
            let lock_pub = eph.public_bytes();
            let key = derive_session_key(&eph.agree(&client_pub), &client_pub, &lock_pub);
            st.pending = Some(PendingHandshake {
                key,
                client_pub,
                lock_pub,
            });
            st.cipher = None;
            st.verify_buf.clear();
            let hello = st.frame(FrameKind::Hello, &lock_pub);
            let _ = out.secure.send(hello).await;
        }
        FrameKind::ServerVerify => {
            let Some(pending) = &st.pending else { return };
            let Ok(time_bytes) = <[u8; 8]>::try_from(&frame.body[..8.min(frame.body.len())])
            else {
                return;
            };
            let time_ms = u64::from_be_bytes(time_bytes);
            let message = server_verify_message(&pending.client_pub, &pending.lock_pub, time_ms);
            let signature = shared
                .signer
                .sign(&message)
                .expect("software keystore never fails");
            let verify = st.frame(FrameKind::ServerVerify, &signature);
            let _ = out.secure.send(verify).await;
        }
        FrameKind::ClientVerify => {
            st.verify_buf.extend_from_slice(&frame.body);
        }
        FrameKind::ClientVerifyEnd => {
            st.verify_buf.extend_from_slice(&frame.body);
            let accepted = st.pending.is_some() && verify_blob_valid(&st.verify_buf);
            st.verify_buf.clear();
            if accepted {
                let pending = st.pending.take().expect("checked above");
                st.cipher = Some(SessionCipher::new(&pending.key));
                let init = st.frame(FrameKind::SessionInitialized, &[0x01]);
                let _ = out.secure.send(init).await;
            } else {
                let alert = st.frame(FrameKind::Alert, &[0x01]);
                let _ = out.secure.send(alert).await;
            }
        }
        _ => {}
    }
}

fn verify_blob_valid(blob: &[u8]) -> bool {
    if blob.len() < 2 + 64 {
        return false;
    }
    let cert_len = u16::from_be_bytes([blob[0], blob[1]]) as usize;
    blob.len() == 2 + cert_len + 64 && &blob[2..2 + cert_len] == FAKE_CERTIFICATE
}

async fn handle_command_write(
    shared: &DeviceShared,
    st: &mut EngineState,
    raw: &[u8],
    out: &EngineOut,
) {
    let Ok(frame) = InboundFrame::decode(raw) else {
        return;
    };
    let message = match frame.kind {
        FrameKind::DataEncrypted => match &st.cipher {
            Some(cipher) => match cipher.decrypt(&frame.body) {
                Ok(message) => message,
                Err(_) => return,
            },
            None => return,
        },
        FrameKind::DataNotEncrypted => frame.body.clone(),
        _ => return,
    };
    let Some(&cmd) = message.first() else { return };

    shared.write_log.lock().expect("write log lock").push(CommandWrite {
        at: Instant::now(),
        command: cmd,
        payload: message[1..].to_vec(),
    });

    if cmd == command::SET_SIGNED_TIME {
        shared.signed_time_set.store(true, Ordering::SeqCst);
    }

    let scripted = shared
        .scripts
        .lock()
        .expect("scripts lock")
        .get_mut(&cmd)
        .and_then(VecDeque::pop_front);

    match scripted {
        Some(replies) => {
            for reply in replies {
                if reply.delay > Duration::ZERO {
                    tokio::time::sleep(reply.delay).await;
                }
                let frame = st.data_frame(&reply.body);
                let tx = match reply.channel {
                    ReplyChannel::Indication => &out.indications,
                    ReplyChannel::Notification => &out.notifications,
                };
                let _ = tx.send(frame).await;
            }
        }
        None => {
            let (channel, body) = default_reply(cmd);
            let frame = st.data_frame(&body);
            let tx = match channel {
                ReplyChannel::Indication => &out.indications,
                ReplyChannel::Notification => &out.notifications,
            };
            let _ = tx.send(frame).await;
        }
    }
}

/// Built-in replies for commands that were not scripted.
fn default_reply(cmd: u8) -> (ReplyChannel, Vec<u8>) {
    match cmd {
        command::GET_STATE => (ReplyChannel::Indication, vec![cmd, 0x00, 0x02, 0x00]),
        command::GET_SETTINGS => (
            ReplyChannel::Indication,
            vec![
                cmd, 0x00, 0x00, 0x01, 0x0E, 0x00, 0x3C, 0x00, 0x05, 0x00, 0x05, 0x00, 0x05,
            ],
        ),
        command::GET_VERSION => (
            ReplyChannel::Indication,
            vec![cmd, 0x00, 0x02, 0x04, 0x01, 0x2C, 0x07],
        ),
        command::SET_SIGNED_TIME => (
            ReplyChannel::Notification,
            vec![notification::SIGNED_DATETIME, 0x00],
        ),
        other => (ReplyChannel::Indication, vec![other, 0x00]),
    }
}
