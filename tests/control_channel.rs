use anyhow::Result;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use targetcam::control::{CommandListener, ControlState, ListenerHandle};
use targetcam::CameraRole;

struct TestListener {
    handle: Option<ListenerHandle>,
    client: UdpSocket,
}

impl TestListener {
    fn start(state: Arc<ControlState>) -> Result<Self> {
        let handle = CommandListener::bind("127.0.0.1:0", state)?.spawn()?;
        let client = UdpSocket::bind("127.0.0.1:0")?;
        client.set_read_timeout(Some(Duration::from_secs(2)))?;
        Ok(Self {
            handle: Some(handle),
            client,
        })
    }

    fn send(&self, text: &str) -> Result<String> {
        let addr = self.handle.as_ref().expect("listener running").addr;
        self.client.send_to(text.as_bytes(), addr)?;
        let mut buf = [0u8; 64];
        let (n, _) = self.client.recv_from(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }
}

impl Drop for TestListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
        }
    }
}

#[test]
fn commands_update_shared_state() -> Result<()> {
    let state = Arc::new(ControlState::new());
    state.set_available(CameraRole::Front, true);
    state.set_available(CameraRole::Rear, true);
    state.select_default_camera();
    let listener = TestListener::start(state.clone())?;

    assert_eq!(listener.send("bearing 45")?, "OK");
    assert_eq!(state.bearing(), Some(45));

    assert_eq!(listener.send("REAR")?, "OK");
    assert_eq!(state.active_camera(), CameraRole::Rear);
    assert_eq!(listener.send("front\n")?, "OK");
    assert_eq!(state.active_camera(), CameraRole::Front);

    assert_eq!(listener.send("FLIP")?, "OK");
    assert!(state.flip_image());
    assert_eq!(listener.send("flip")?, "OK");
    assert!(!state.flip_image());

    assert_eq!(listener.send("SNAPSHOT")?, "OK");
    assert!(state.take_snapshot_request());
    Ok(())
}

#[test]
fn switching_to_missing_camera_is_ignored() -> Result<()> {
    let state = Arc::new(ControlState::new());
    state.set_available(CameraRole::Rear, true);
    state.select_default_camera();
    assert_eq!(state.active_camera(), CameraRole::Rear);
    let listener = TestListener::start(state.clone())?;

    assert_eq!(listener.send("FRONT")?, "OK");
    assert_eq!(state.active_camera(), CameraRole::Rear);
    Ok(())
}

#[test]
fn unrecognised_datagrams_are_still_acknowledged() -> Result<()> {
    let state = Arc::new(ControlState::new());
    let listener = TestListener::start(state.clone())?;

    assert_eq!(listener.send("warp 9")?, "OK");
    assert_eq!(listener.send("BEARING north")?, "OK");
    assert_eq!(state.bearing(), None);
    assert!(!state.snapshot_pending());
    Ok(())
}

#[test]
fn listener_survives_oversized_and_binary_datagrams() -> Result<()> {
    let state = Arc::new(ControlState::new());
    let listener = TestListener::start(state.clone())?;

    let junk: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(listener.send(&String::from_utf8_lossy(&junk))?, "OK");
    assert_eq!(listener.send("BEARING 12")?, "OK");
    assert_eq!(state.bearing(), Some(12));
    Ok(())
}
