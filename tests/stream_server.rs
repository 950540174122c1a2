use anyhow::Result;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use targetcam::broadcast::FrameBroadcaster;
use targetcam::control::ControlState;
use targetcam::frame::{encode_jpeg, EncodedFrame};
use targetcam::stream::{CameraFeed, CameraFeeds, StreamConfig, StreamHandle, StreamServer};
use targetcam::CameraRole;

/// Stream server fed by one thread per camera, each publishing a small JPEG
/// every 20ms.
struct TestStream {
    handle: Option<StreamHandle>,
    publishers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    control: Arc<ControlState>,
    feeds: CameraFeeds,
    addr: SocketAddr,
}

impl TestStream {
    fn start() -> Result<Self> {
        Self::with_cameras(&[CameraRole::Front])
    }

    fn with_cameras(roles: &[CameraRole]) -> Result<Self> {
        let control = Arc::new(ControlState::new());
        let stop = Arc::new(AtomicBool::new(false));
        let mut feeds = CameraFeeds::default();
        let mut publishers = Vec::new();
        for &role in roles {
            control.set_available(role, true);
            let broadcaster = FrameBroadcaster::new();
            feeds.set(
                role,
                CameraFeed {
                    broadcaster: broadcaster.clone(),
                    running: Arc::new(AtomicBool::new(true)),
                },
            );
            let jpeg = encode_jpeg(&image::RgbImage::new(16, 12), 40)?;
            let stop_thread = stop.clone();
            publishers.push(std::thread::spawn(move || {
                let mut seq = 0;
                while !stop_thread.load(Ordering::SeqCst) {
                    seq += 1;
                    broadcaster.publish(EncodedFrame {
                        seq,
                        jpeg: jpeg.clone(),
                        captured_at: Instant::now(),
                    });
                    std::thread::sleep(Duration::from_millis(20));
                }
                broadcaster.close();
            }));
        }
        control.select_default_camera();

        let handle = StreamServer::new(
            StreamConfig {
                addr: "127.0.0.1:0".to_string(),
                frame_lag: Duration::from_millis(5),
            },
            feeds.clone(),
            control.clone(),
        )
        .spawn()?;
        Ok(Self {
            addr: handle.addr,
            handle: Some(handle),
            publishers,
            stop,
            control,
            feeds,
        })
    }
}

impl Drop for TestStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for publisher in self.publishers.drain(..) {
            let _ = publisher.join();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
        }
    }
}

fn connect(addr: SocketAddr, request: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.write_all(request.as_bytes())?;
    Ok(stream)
}

fn read_response(addr: SocketAddr, request: &str) -> Result<(String, String)> {
    let mut stream = connect(addr, request)?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or_default().to_string();
    let body = parts.next().unwrap_or_default().to_string();
    Ok((head, body))
}

fn read_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches("\r\n").to_string())
}

/// Reads one multipart part and returns its JPEG payload.
fn read_part(reader: &mut impl BufRead) -> Result<Vec<u8>> {
    assert_eq!(read_line(reader)?, "--frame");
    assert_eq!(read_line(reader)?, "Content-Type: image/jpeg");
    let length: usize = read_line(reader)?
        .strip_prefix("Content-length: ")
        .expect("length header")
        .parse()?;
    assert_eq!(read_line(reader)?, "");
    let mut jpeg = vec![0u8; length];
    reader.read_exact(&mut jpeg)?;
    assert_eq!(read_line(reader)?, "");
    Ok(jpeg)
}

fn skip_headers(reader: &mut impl BufRead) -> Result<()> {
    assert_eq!(read_line(reader)?, "HTTP/1.1 200 OK");
    while !read_line(reader)?.is_empty() {}
    Ok(())
}

#[test]
fn stream_delivers_multipart_jpeg_parts() -> Result<()> {
    let server = TestStream::start()?;
    let stream = connect(server.addr, "GET /stream HTTP/1.1\r\nHost: robot\r\n\r\n")?;
    let mut reader = BufReader::new(stream);

    assert_eq!(read_line(&mut reader)?, "HTTP/1.1 200 OK");
    let mut content_type = None;
    loop {
        let line = read_line(&mut reader)?;
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Type: ") {
            content_type = Some(value.to_string());
        }
    }
    assert_eq!(
        content_type.as_deref(),
        Some("multipart/x-mixed-replace; boundary=--frame")
    );

    for _ in 0..2 {
        let jpeg = read_part(&mut reader)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
    Ok(())
}

#[test]
fn stream_follows_fallback_when_active_camera_is_lost() -> Result<()> {
    let server = TestStream::with_cameras(&[CameraRole::Front, CameraRole::Rear])?;
    assert_eq!(server.control.active_camera(), CameraRole::Front);
    let stream = connect(server.addr, "GET /stream HTTP/1.1\r\n\r\n")?;
    let mut reader = BufReader::new(stream);
    skip_headers(&mut reader)?;
    read_part(&mut reader)?;

    // What a capture thread does when its camera goes away.
    server.control.set_available(CameraRole::Front, false);
    server.control.select_default_camera();
    server.feeds.get(CameraRole::Front).expect("front feed").broadcaster.close();
    assert_eq!(server.control.active_camera(), CameraRole::Rear);

    for _ in 0..3 {
        read_part(&mut reader)?;
    }
    Ok(())
}

#[test]
fn stream_without_active_camera_is_unavailable() -> Result<()> {
    let server = TestStream::with_cameras(&[])?;
    let (head, body) = read_response(server.addr, "GET /stream HTTP/1.1\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 503"), "{head}");
    assert!(body.contains("no_camera"));
    Ok(())
}

#[test]
fn health_reports_active_camera() -> Result<()> {
    let server = TestStream::start()?;
    let (head, body) = read_response(server.addr, "GET /health HTTP/1.1\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 200 OK"), "{head}");
    let json: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["active_camera"], "front");
    assert_eq!(json["flip"], false);
    assert_eq!(json["cameras"]["front"]["running"], true);
    assert!(json["cameras"]["rear"].is_null());
    Ok(())
}

#[test]
fn index_page_embeds_stream() -> Result<()> {
    let server = TestStream::start()?;
    let (head, body) = read_response(server.addr, "GET / HTTP/1.1\r\n\r\n")?;
    assert!(head.contains("text/html"), "{head}");
    assert!(body.contains("src=\"/stream\""));
    Ok(())
}

#[test]
fn unknown_paths_and_methods_are_rejected() -> Result<()> {
    let server = TestStream::start()?;
    let (head, _) = read_response(server.addr, "GET /nope HTTP/1.1\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 404"), "{head}");
    let (head, _) = read_response(server.addr, "POST /stream HTTP/1.1\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 405"), "{head}");
    Ok(())
}
