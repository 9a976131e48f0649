//! Local video file source.
//!
//! Decoding happens entirely in-memory via FFmpeg when the
//! `ingest-file-ffmpeg` feature is enabled. Without the feature a file
//! input is a startup error; remote URLs are never accepted.

use std::path::Path;

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::Frame;
use crate::ingest::VideoSource;

pub struct FileSource {
    #[cfg(feature = "ingest-file-ffmpeg")]
    backend: FfmpegFileSource,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        if display.trim().is_empty() {
            return Err(anyhow!("file source path must not be empty"));
        }
        if display.contains("://") {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FfmpegFileSource::open(path)?,
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "file ingestion requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
impl VideoSource for FileSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        self.backend.read()
    }

    fn geometry(&self) -> (u32, u32) {
        self.backend.geometry()
    }

    fn frame_rate(&self) -> u32 {
        self.backend.frame_rate()
    }
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
impl VideoSource for FileSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("file source is not available in this build"))
    }

    fn geometry(&self) -> (u32, u32) {
        (0, 0)
    }

    fn frame_rate(&self) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_url_schemes() {
        let err = FileSource::open(&PathBuf::from("https://example/video.mp4"))
            .err()
            .expect("url scheme must be rejected");
        assert!(err.to_string().contains("local paths"));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(FileSource::open(&PathBuf::from("")).is_err());
    }
}
