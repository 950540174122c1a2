//! MJPEG stream server.
//!
//! Routes:
//! - `GET /`       minimal page embedding the stream
//! - `GET /stream` `multipart/x-mixed-replace` JPEG parts from the active camera
//! - `GET /health` JSON status
//!
//! The stream re-reads the active camera before every part, so a `FRONT` or
//! `REAR` command switches what connected clients see.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::broadcast::{FrameBroadcaster, Recv, Subscriber};
use crate::control::ControlState;
use crate::frame::EncodedFrame;
use crate::CameraRole;

const MAX_REQUEST_BYTES: usize = 8192;
const BOUNDARY: &str = "--frame";
const PART_WAIT: Duration = Duration::from_millis(500);
const INDEX_HTML: &str = "<!doctype html>\n<html><head><title>targetcam</title></head>\n<body style=\"margin:0;background:#000\"><img src=\"/stream\" style=\"width:100%\"></body></html>\n";

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub addr: String,
    /// Minimum delay between parts sent to one client.
    pub frame_lag: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            frame_lag: Duration::from_millis(20),
        }
    }
}

/// One camera as seen by the server.
#[derive(Clone)]
pub struct CameraFeed {
    pub broadcaster: FrameBroadcaster,
    pub running: Arc<AtomicBool>,
}

#[derive(Clone, Default)]
pub struct CameraFeeds {
    pub front: Option<CameraFeed>,
    pub rear: Option<CameraFeed>,
}

impl CameraFeeds {
    pub fn get(&self, role: CameraRole) -> Option<&CameraFeed> {
        match role {
            CameraRole::Front => self.front.as_ref(),
            CameraRole::Rear => self.rear.as_ref(),
        }
    }

    pub fn set(&mut self, role: CameraRole, feed: CameraFeed) {
        match role {
            CameraRole::Front => self.front = Some(feed),
            CameraRole::Rear => self.rear = Some(feed),
        }
    }
}

#[derive(Debug)]
pub struct StreamHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StreamServer {
    cfg: StreamConfig,
    feeds: CameraFeeds,
    control: Arc<ControlState>,
}

impl StreamServer {
    pub fn new(cfg: StreamConfig, feeds: CameraFeeds, control: Arc<ControlState>) -> Self {
        Self { cfg, feeds, control }
    }

    pub fn spawn(self) -> Result<StreamHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(ServerShared {
            cfg: self.cfg,
            feeds: self.feeds,
            control: self.control,
            shutdown: shutdown.clone(),
        });
        let join = std::thread::Builder::new()
            .name("stream-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_server(listener, shared) {
                    log::error!("stream server stopped: {}", err);
                }
            })?;
        log::info!("stream server listening on http://{}", addr);

        Ok(StreamHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct ServerShared {
    cfg: StreamConfig,
    feeds: CameraFeeds,
    control: Arc<ControlState>,
    shutdown: Arc<AtomicBool>,
}

fn run_server(listener: TcpListener, shared: Arc<ServerShared>) -> Result<()> {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                let spawned = std::thread::Builder::new()
                    .name("stream-client".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &shared) {
                            log::debug!("stream client {} closed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("stream client {} rejected: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, shared: &ServerShared) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }
    match request.path.as_str() {
        "/" | "/index.html" => write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML.as_bytes()),
        "/health" => {
            let body = health_json(shared);
            write_response(&mut stream, 200, "application/json", body.to_string().as_bytes())
        }
        "/stream" => {
            let role = shared.control.active_camera();
            if shared.feeds.get(role).is_none() {
                log::warn!("stream requested but no {role} camera is running");
                return write_json_response(&mut stream, 503, r#"{"error":"no_camera"}"#);
            }
            log::info!("stream client connected: {}", stream.peer_addr()?);
            stream_frames(&mut stream, shared)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn health_json(shared: &ServerShared) -> serde_json::Value {
    let camera = |role: CameraRole| match shared.feeds.get(role) {
        Some(feed) => json!({
            "running": feed.running.load(Ordering::SeqCst),
            "subscribers": feed.broadcaster.subscriber_count(),
        }),
        None => serde_json::Value::Null,
    };
    json!({
        "status": "ok",
        "active_camera": shared.control.active_camera().to_string(),
        "flip": shared.control.flip_image(),
        "bearing": shared.control.bearing(),
        "cameras": {
            "front": camera(CameraRole::Front),
            "rear": camera(CameraRole::Rear),
        },
    })
}

fn stream_frames(stream: &mut TcpStream, shared: &ServerShared) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={BOUNDARY}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;

    let mut subscribers: HashMap<CameraRole, Subscriber> = HashMap::new();
    while !shared.shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(shared.cfg.frame_lag);
        let role = shared.control.active_camera();
        let Some(feed) = shared.feeds.get(role) else {
            return Err(anyhow!("no {role} camera to stream"));
        };
        // Only the active camera keeps a registration; the other would go stale.
        subscribers.retain(|r, _| *r == role);
        let subscriber = subscribers
            .entry(role)
            .or_insert_with(|| feed.broadcaster.subscribe());
        match subscriber.recv_timeout(PART_WAIT) {
            Recv::Frame(frame) => write_part(stream, &frame)?,
            Recv::TimedOut => continue,
            // A lost camera hands over before closing; follow the new one.
            Recv::Closed if shared.control.active_camera() != role => continue,
            Recv::Closed => return Err(anyhow!("{role} camera stream closed")),
        }
    }
    Ok(())
}

fn write_part(stream: &mut TcpStream, frame: &EncodedFrame) -> Result<()> {
    let prefix = format!(
        "{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-length: {}\r\n\r\n",
        frame.len()
    );
    stream.write_all(prefix.as_bytes())?;
    stream.write_all(&frame.jpeg)?;
    stream.write_all(b"\r\n")?;
    stream.flush()?;
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text.split("\r\n").next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
