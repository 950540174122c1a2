//! Robot control channel.
//!
//! The robot controller sends single-word ASCII commands over UDP and reads
//! back a telemetry datagram for every analyzed front-camera frame.
//!
//! - `ControlState`: the shared flags every other component reads
//! - `CommandListener`: one datagram in, one `OK` out
//! - `TelemetrySender`: fire-and-forget target reports

mod telemetry;

use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::CameraRole;
pub use telemetry::{format_report, TelemetrySender};

const MAX_DATAGRAM_BYTES: usize = 1024;
const REPLY: &[u8] = b"OK";
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Front,
    Rear,
    Snapshot,
    Flip,
    Bearing(i32),
}

/// Parses one datagram. Words are case-insensitive; anything after the
/// command's own arguments is ignored.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut words = text.split_whitespace();
    let command = words.next()?.to_ascii_uppercase();
    match command.as_str() {
        "FRONT" => Some(Command::Front),
        "REAR" => Some(Command::Rear),
        "SNAPSHOT" => Some(Command::Snapshot),
        "FLIP" => Some(Command::Flip),
        "BEARING" => words.next()?.parse().ok().map(Command::Bearing),
        _ => None,
    }
}

/// Flags shared by the control listener, capture threads and stream server.
/// Fields are synchronised independently.
#[derive(Debug)]
pub struct ControlState {
    active: AtomicU8,
    snapshot_requested: AtomicBool,
    flip: AtomicBool,
    front_available: AtomicBool,
    rear_available: AtomicBool,
    bearing: Mutex<Option<i32>>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            active: AtomicU8::new(role_index(CameraRole::Front)),
            snapshot_requested: AtomicBool::new(false),
            flip: AtomicBool::new(false),
            front_available: AtomicBool::new(false),
            rear_available: AtomicBool::new(false),
            bearing: Mutex::new(None),
        }
    }
}

fn role_index(role: CameraRole) -> u8 {
    match role {
        CameraRole::Front => 0,
        CameraRole::Rear => 1,
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_camera(&self) -> CameraRole {
        match self.active.load(Ordering::SeqCst) {
            0 => CameraRole::Front,
            _ => CameraRole::Rear,
        }
    }

    pub fn set_available(&self, role: CameraRole, available: bool) {
        self.availability(role).store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self, role: CameraRole) -> bool {
        self.availability(role).load(Ordering::SeqCst)
    }

    fn availability(&self, role: CameraRole) -> &AtomicBool {
        match role {
            CameraRole::Front => &self.front_available,
            CameraRole::Rear => &self.rear_available,
        }
    }

    /// Front when it is available, otherwise rear.
    pub fn select_default_camera(&self) {
        let role = if self.is_available(CameraRole::Front) {
            CameraRole::Front
        } else {
            CameraRole::Rear
        };
        self.active.store(role_index(role), Ordering::SeqCst);
    }

    /// Switches the streamed camera. Ignored when that camera is absent.
    pub fn switch_to(&self, role: CameraRole) -> bool {
        if !self.is_available(role) {
            return false;
        }
        self.active.store(role_index(role), Ordering::SeqCst);
        true
    }

    pub fn request_snapshot(&self) {
        self.snapshot_requested.store(true, Ordering::SeqCst);
    }

    pub fn snapshot_pending(&self) -> bool {
        self.snapshot_requested.load(Ordering::SeqCst)
    }

    /// Clears a pending request, returning whether one was set.
    pub fn take_snapshot_request(&self) -> bool {
        self.snapshot_requested.swap(false, Ordering::SeqCst)
    }

    pub fn flip_image(&self) -> bool {
        self.flip.load(Ordering::SeqCst)
    }

    pub fn toggle_flip(&self) -> bool {
        !self.flip.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn bearing(&self) -> Option<i32> {
        *self.bearing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, command: Command) {
        match command {
            Command::Front => {
                if !self.switch_to(CameraRole::Front) {
                    log::debug!("FRONT ignored: no front camera");
                }
            }
            Command::Rear => {
                if !self.switch_to(CameraRole::Rear) {
                    log::debug!("REAR ignored: no rear camera");
                }
            }
            Command::Snapshot => self.request_snapshot(),
            Command::Flip => {
                let flipped = self.toggle_flip();
                log::info!("stream mirroring {}", if flipped { "on" } else { "off" });
            }
            Command::Bearing(degrees) => {
                *self.bearing.lock().unwrap_or_else(PoisonError::into_inner) = Some(degrees);
            }
        }
    }
}

/// Binds the control socket; `spawn` starts answering.
pub struct CommandListener {
    socket: UdpSocket,
    state: Arc<ControlState>,
}

#[derive(Debug)]
pub struct ListenerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("control listener thread panicked"))?;
        }
        Ok(())
    }
}

impl CommandListener {
    pub fn bind(addr: &str, state: Arc<ControlState>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).with_context(|| format!("bind control socket {addr}"))?;
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;
        Ok(Self { socket, state })
    }

    pub fn spawn(self) -> Result<ListenerHandle> {
        let addr = self.socket.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("control-udp".to_string())
            .spawn(move || {
                self.run(&shutdown_thread);
            })?;
        log::info!("control listener bound on udp {}", addr);
        Ok(ListenerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }

    /// Serves until shutdown. Receive errors are logged and never fatal.
    fn run(&self, shutdown: &AtomicBool) {
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        while !shutdown.load(Ordering::SeqCst) {
            let (n, peer) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                // ICMP port-unreachable from an earlier reply surfaces here on some platforms.
                Err(err) if err.kind() == std::io::ErrorKind::ConnectionReset => continue,
                Err(err) => {
                    log::warn!("control socket receive failed: {}", err);
                    std::thread::sleep(RECV_ERROR_BACKOFF);
                    continue;
                }
            };
            self.handle(&buf[..n], peer);
        }
    }

    fn handle(&self, datagram: &[u8], peer: SocketAddr) {
        let text = String::from_utf8_lossy(datagram);
        match parse_command(&text) {
            Some(command) => {
                log::info!("control command from {}: {:?}", peer, command);
                self.state.apply(command);
            }
            None => log::debug!("unrecognised control datagram from {}: {:?}", peer, text.trim()),
        }
        if let Err(err) = self.socket.send_to(REPLY, peer) {
            log::warn!("control reply to {} failed: {}", peer, err);
        }
    }
}
