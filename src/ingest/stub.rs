//! Deterministic synthetic frame source.
//!
//! Generates a moving gradient pattern entirely in memory. With
//! `frames=K` in the source string the source exhausts after K frames,
//! which is how tests exercise draining and the streaming camera's reopen
//! path without real media.

use anyhow::Result;

use crate::config::StubSpec;
use crate::frame::Frame;
use crate::ingest::VideoSource;

const STUB_FRAME_RATE: u32 = 25;

pub struct SyntheticSource {
    spec: StubSpec,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(spec: StubSpec) -> Self {
        log::debug!("SyntheticSource: opened stub://{}", spec.name);
        Self {
            spec,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.spec.width * self.spec.height * 3) as usize;

        // Advance the simulated scene occasionally so detectors see motion.
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl VideoSource for SyntheticSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.spec.frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        let frame = Frame::rgb24(pixels, self.spec.width, self.spec.height)?;
        Ok(Some(frame))
    }

    fn geometry(&self) -> (u32, u32) {
        (self.spec.width, self.spec.height)
    }

    fn frame_rate(&self) -> u32 {
        STUB_FRAME_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_spec(frames: u64) -> StubSpec {
        StubSpec {
            name: "scene".to_string(),
            frames: Some(frames),
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn produces_frames_with_configured_geometry() {
        let mut source = SyntheticSource::new(bounded_spec(3));
        let frame = source.read().unwrap().unwrap();
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        assert_eq!(frame.byte_len(), 32 * 24 * 3);
    }

    #[test]
    fn exhausts_after_frame_limit_and_stays_exhausted() {
        let mut source = SyntheticSource::new(bounded_spec(2));
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn unbounded_source_keeps_producing() {
        let spec = StubSpec {
            frames: None,
            ..bounded_spec(0)
        };
        let mut source = SyntheticSource::new(spec);
        for _ in 0..200 {
            assert!(source.read().unwrap().is_some());
        }
    }
}
