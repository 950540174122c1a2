use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::frame::{encode_jpeg, SNAPSHOT_JPEG_QUALITY};

/// Writes `snapshot-<YYYYmmdd-HHMMSS>-<kind>.jpg` files into one directory.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, taken_at: DateTime<Local>, kind: &str) -> PathBuf {
        self.dir.join(format!(
            "snapshot-{}-{}.jpg",
            taken_at.format("%Y%m%d-%H%M%S"),
            kind
        ))
    }

    /// Writes the raw and processed images with a shared timestamp.
    pub fn write_pair(&self, raw: &RgbImage, processed: &RgbImage) -> Result<[PathBuf; 2]> {
        let now = Local::now();
        let raw_path = self.write(raw, self.path_for(now, "raw"))?;
        let processed_path = self.write(processed, self.path_for(now, "processed"))?;
        Ok([raw_path, processed_path])
    }

    fn write(&self, image: &RgbImage, path: PathBuf) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create snapshot dir {}", self.dir.display()))?;
        let jpeg = encode_jpeg(image, SNAPSHOT_JPEG_QUALITY)?;
        std::fs::write(&path, jpeg).with_context(|| format!("write snapshot {}", path.display()))?;
        log::info!("snapshot saved: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_names_carry_timestamp_and_kind() {
        let writer = SnapshotWriter::new("/tmp/snaps");
        let at = Local.with_ymd_and_hms(2019, 3, 2, 14, 5, 9).unwrap();
        assert_eq!(
            writer.path_for(at, "raw"),
            PathBuf::from("/tmp/snaps/snapshot-20190302-140509-raw.jpg")
        );
    }

    #[test]
    fn writes_both_images() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = SnapshotWriter::new(dir.path().join("nested"));
        let image = RgbImage::new(8, 8);
        let [raw, processed] = writer.write_pair(&image, &image)?;
        assert!(raw.exists());
        assert!(processed.exists());
        assert!(processed.to_string_lossy().ends_with("-processed.jpg"));
        Ok(())
    }
}
