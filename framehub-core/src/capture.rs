//! Frame sources for the producer loop.
//!
//! The payload is opaque to the rest of the crate, so a source only has
//! to hand back encoded bytes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::LinkError;

/// Something that yields encoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// The next frame, or [`LinkError::CaptureExhausted`] once a finite
    /// source has nothing left.
    async fn next_frame(&mut self) -> Result<Vec<u8>, LinkError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl FrameSource for Box<dyn FrameSource> {
    async fn next_frame(&mut self) -> Result<Vec<u8>, LinkError> {
        (**self).next_frame().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Generates binary PPM test patterns that scroll one pixel per frame.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    limit: Option<u64>,
    produced: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            limit: None,
            produced: 0,
        }
    }

    /// Stop after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let pixels = self.width as usize * self.height as usize * 3;
        let mut image = Vec::with_capacity(header.len() + pixels);
        image.extend_from_slice(header.as_bytes());

        let shift = self.produced as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                image.push(x.wrapping_add(shift) as u8);
                image.push(y.wrapping_add(shift) as u8);
                image.push(((x ^ y) & 0xFF) as u8);
            }
        }

        // Frame counter in the first pixels, so frames are distinguishable.
        let counter = self.produced.to_le_bytes();
        let body = header.len();
        let n = counter.len().min(pixels);
        image[body..body + n].copy_from_slice(&counter[..n]);
        image
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<Vec<u8>, LinkError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(LinkError::CaptureExhausted);
        }
        let frame = self.render();
        self.produced += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

// ── DirectorySource ──────────────────────────────────────────────

/// Reads every regular file of a directory in file-name order.
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    repeat: bool,
}

impl DirectorySource {
    /// Fails if the directory cannot be listed or holds no files.
    pub fn open(dir: impl AsRef<Path>, repeat: bool) -> Result<Self, LinkError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| LinkError::Capture(format!("{}: {e}", dir.display())))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LinkError::Capture(e.to_string()))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        if files.is_empty() {
            return Err(LinkError::Capture(format!(
                "{}: no frames found",
                dir.display()
            )));
        }
        files.sort();
        debug!(dir = %dir.display(), count = files.len(), "frame directory opened");

        Ok(Self {
            dir,
            files,
            next: 0,
            repeat,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    async fn next_frame(&mut self) -> Result<Vec<u8>, LinkError> {
        if self.next >= self.files.len() {
            if !self.repeat {
                return Err(LinkError::CaptureExhausted);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        tokio::fs::read(path)
            .await
            .map_err(|e| LinkError::Capture(format!("{}: {e}", path.display())))
    }

    fn describe(&self) -> String {
        format!("directory {} ({} files)", self.dir.display(), self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framehub-capture-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn synthetic_frames_are_ppm() {
        let mut source = SyntheticSource::new(4, 2);
        let frame = source.next_frame().await.unwrap();
        let header = b"P6\n4 2\n255\n";
        assert!(frame.starts_with(header));
        assert_eq!(frame.len(), header.len() + 4 * 2 * 3);

        let second = source.next_frame().await.unwrap();
        assert_ne!(frame, second);
        assert_eq!(source.produced(), 2);
    }

    #[test]
    fn synthetic_limit_exhausts() {
        let mut source = SyntheticSource::new(8, 8).with_limit(2);
        tokio_test::assert_ok!(tokio_test::block_on(source.next_frame()));
        tokio_test::assert_ok!(tokio_test::block_on(source.next_frame()));
        let err = tokio_test::assert_err!(tokio_test::block_on(source.next_frame()));
        assert!(matches!(err, LinkError::CaptureExhausted));
    }

    #[tokio::test]
    async fn directory_in_name_order() {
        let dir = scratch_dir("order");
        std::fs::write(dir.join("b.jpg"), b"second").unwrap();
        std::fs::write(dir.join("a.jpg"), b"first").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();

        let mut source = DirectorySource::open(&dir, false).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_frame().await.unwrap(), b"first");
        assert_eq!(source.next_frame().await.unwrap(), b"second");
        assert!(matches!(
            source.next_frame().await,
            Err(LinkError::CaptureExhausted)
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn directory_repeat_wraps() {
        let dir = scratch_dir("repeat");
        std::fs::write(dir.join("only.ppm"), b"frame").unwrap();

        let mut source = DirectorySource::open(&dir, true).unwrap();
        for _ in 0..3 {
            assert_eq!(source.next_frame().await.unwrap(), b"frame");
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = scratch_dir("empty");
        assert!(matches!(
            DirectorySource::open(&dir, false),
            Err(LinkError::Capture(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
