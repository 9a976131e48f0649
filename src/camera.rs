//! On-demand streaming camera.
//!
//! Independent of the worker-pool pipeline: a pull-based component that
//! holds one capture handle and serves one JPEG-encoded frame per
//! `get_frame` call. An optional perspective correction (set once via
//! `set_rect`) is applied before encoding.
//!
//! When the stream is exhausted the camera reopens the capture handle
//! against the same source and serves a pre-existing placeholder image for
//! that call only, so pull consumers never see an error frame and an HTTP
//! stream built on top never closes unexpectedly.
//!
//! The camera is not internally synchronized. Concurrent pullers must
//! serialize access (the HTTP layer wraps it in a `Mutex`).

use anyhow::{Context, Result};

use crate::config::{CameraSettings, SourceSpec};
use crate::ingest::{self, VideoSource};
use crate::transform::{warp_perspective, Homography, Point};

pub struct StreamingCamera {
    capture: Box<dyn VideoSource>,
    transform: Option<Homography>,
    width: u32,
    height: u32,
    source: SourceSpec,
    placeholder: Vec<u8>,
    jpeg_quality: u8,
}

impl StreamingCamera {
    /// Open the capture handle and load the placeholder image. Both are
    /// required: a missing placeholder is a startup error, not a runtime
    /// surprise on the first exhausted stream.
    pub fn open(settings: &CameraSettings) -> Result<Self> {
        let capture = ingest::open_source(&settings.source)?;
        let placeholder = std::fs::read(&settings.placeholder_path).with_context(|| {
            format!(
                "failed to read placeholder image {}",
                settings.placeholder_path.display()
            )
        })?;
        Ok(Self::from_parts(capture, placeholder, settings))
    }

    /// Assemble a camera from an already-opened capture handle. Tests use
    /// this to inject deterministic sources; the reopen path still goes
    /// through `settings.source`.
    pub fn from_parts(
        capture: Box<dyn VideoSource>,
        placeholder: Vec<u8>,
        settings: &CameraSettings,
    ) -> Self {
        Self {
            capture,
            transform: None,
            width: settings.width,
            height: settings.height,
            source: settings.source.clone(),
            placeholder,
            jpeg_quality: settings.jpeg_quality,
        }
    }

    /// Compute and store the perspective transform mapping the given quad
    /// (top-left, top-right, bottom-left, bottom-right) onto the camera's
    /// output rectangle. Calling again replaces the transform.
    pub fn set_rect(&mut self, points: [Point; 4]) -> Result<()> {
        let transform = Homography::quad_to_rect(points, self.width, self.height)?;
        self.transform = Some(transform);
        Ok(())
    }

    /// Pull the next frame and return it as encoded JPEG bytes.
    ///
    /// On exhaustion the capture handle is replaced with a fresh one for
    /// the same source (the old handle is released by the assignment) and
    /// this call returns the placeholder bytes; the next call reads from
    /// the reopened stream.
    pub fn get_frame(&mut self) -> Result<Vec<u8>> {
        match self.capture.read()? {
            Some(frame) => {
                let frame = match &self.transform {
                    Some(transform) => {
                        warp_perspective(&frame, transform, self.width, self.height)?
                    }
                    None => frame,
                };
                frame.encode_jpeg(self.jpeg_quality)
            }
            None => {
                log::info!("stream exhausted, reopening {}", self.source);
                self.capture = ingest::open_source(&self.source)?;
                Ok(self.placeholder.clone())
            }
        }
    }

    pub fn geometry(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StubSpec;
    use crate::frame::Frame;

    fn stub_settings(frames: u64) -> CameraSettings {
        CameraSettings {
            source: SourceSpec::Stub(StubSpec {
                name: "camera".to_string(),
                frames: Some(frames),
                width: 32,
                height: 24,
            }),
            width: 40,
            height: 40,
            placeholder_path: "unused".into(),
            jpeg_quality: 85,
        }
    }

    fn placeholder_bytes() -> Vec<u8> {
        // Any recognizable byte string works; the camera serves it verbatim.
        b"placeholder-jpeg-bytes".to_vec()
    }

    fn open_stub_camera(frames: u64) -> StreamingCamera {
        let settings = stub_settings(frames);
        let capture = ingest::open_source(&settings.source).unwrap();
        StreamingCamera::from_parts(capture, placeholder_bytes(), &settings)
    }

    #[test]
    fn serves_encoded_frames_while_stream_has_data() {
        let mut camera = open_stub_camera(3);
        for _ in 0..3 {
            let bytes = camera.get_frame().unwrap();
            assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn exhaustion_serves_placeholder_once_then_recovers() {
        let mut camera = open_stub_camera(2);
        assert_eq!(&camera.get_frame().unwrap()[..2], &[0xFF, 0xD8]);
        assert_eq!(&camera.get_frame().unwrap()[..2], &[0xFF, 0xD8]);

        // Third pull hits the exhausted stream: placeholder, verbatim.
        assert_eq!(camera.get_frame().unwrap(), placeholder_bytes());

        // The handle was reopened; real frames flow again.
        assert_eq!(&camera.get_frame().unwrap()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn set_rect_applies_perspective_and_output_geometry() {
        let mut camera = open_stub_camera(5);
        camera
            .set_rect([(0.0, 0.0), (31.0, 0.0), (0.0, 23.0), (31.0, 23.0)])
            .unwrap();
        let bytes = camera.get_frame().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(image::GenericImageView::dimensions(&decoded), (40, 40));
    }

    #[test]
    fn set_rect_with_same_points_is_bit_identical() {
        // A source that replays one fixed frame forever, so two pulls see
        // identical input.
        struct Replay(Frame);
        impl VideoSource for Replay {
            fn read(&mut self) -> Result<Option<Frame>> {
                Ok(Some(self.0.clone()))
            }
            fn geometry(&self) -> (u32, u32) {
                (self.0.width, self.0.height)
            }
            fn frame_rate(&self) -> u32 {
                25
            }
        }

        let mut data = Vec::new();
        for i in 0..32 * 24 {
            data.extend_from_slice(&[(i % 251) as u8, (i % 17) as u8, (i % 97) as u8]);
        }
        let frame = Frame::rgb24(data, 32, 24).unwrap();
        let settings = stub_settings(0);
        let mut camera = StreamingCamera::from_parts(
            Box::new(Replay(frame)),
            placeholder_bytes(),
            &settings,
        );

        let quad = [(1.0, 2.0), (30.0, 1.0), (2.0, 22.0), (29.0, 21.0)];
        camera.set_rect(quad).unwrap();
        let first = camera.get_frame().unwrap();
        camera.set_rect(quad).unwrap();
        let second = camera.get_frame().unwrap();
        assert_eq!(first, second);
    }
}
