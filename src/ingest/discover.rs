//! Capture device lookup by USB serial number.
//!
//! udev publishes stable names under `/dev/v4l/by-id/`, e.g.
//! `usb-046d_HD_Pro_Webcam_C920_8A3F1E2F-video-index0`. The `video-index0`
//! node is the capture interface; higher indexes are metadata nodes.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const BY_ID_DIR: &str = "/dev/v4l/by-id";
const CAPTURE_SUFFIX: &str = "video-index0";

/// Capture nodes under `dir`, sorted by name, resolved to their targets.
pub fn capture_devices(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(CAPTURE_SUFFIX) {
            continue;
        }
        let path = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path());
        found.push((name, path));
    }
    found.sort();
    Ok(found)
}

/// Capture node whose by-id name contains `serial`.
pub fn find_by_serial(dir: &Path, serial: &str) -> Result<Option<PathBuf>> {
    if serial.is_empty() {
        return Ok(None);
    }
    Ok(capture_devices(dir)?
        .into_iter()
        .find(|(name, _)| name.contains(serial))
        .map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_lookup_matches_capture_node_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "usb-046d_C920_AAA111-video-index0",
            "usb-046d_C920_AAA111-video-index1",
            "usb-046d_C922_BBB222-video-index0",
        ] {
            fs::write(dir.path().join(name), b"")?;
        }

        let found = find_by_serial(dir.path(), "BBB222")?.unwrap();
        assert!(found.ends_with("usb-046d_C922_BBB222-video-index0"));
        assert!(find_by_serial(dir.path(), "CCC333")?.is_none());
        assert_eq!(capture_devices(dir.path())?.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_directory_lists_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(capture_devices(&dir.path().join("absent"))?.is_empty());
        Ok(())
    }
}
