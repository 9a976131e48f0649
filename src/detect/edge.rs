use anyhow::Result;

use crate::detect::backend::Detector;
use crate::frame::Frame;

/// Dependency-free detector that highlights luma edges in green.
///
/// Deterministic and stateless: the same input frame always produces the
/// same annotated output, which is what the pipeline tests rely on.
pub struct EdgeOverlayDetector {
    threshold: u16,
}

impl EdgeOverlayDetector {
    pub fn new() -> Self {
        Self { threshold: 48 }
    }

    pub fn with_threshold(threshold: u16) -> Self {
        Self { threshold }
    }
}

impl Default for EdgeOverlayDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for EdgeOverlayDetector {
    fn name(&self) -> &'static str {
        "edge-overlay"
    }

    fn annotate(&mut self, mut frame: Frame) -> Result<Frame> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        if width < 3 || height < 3 {
            return Ok(frame);
        }

        // Luma plane computed from the untouched input so painted pixels do
        // not feed back into neighboring gradients.
        let mut luma = vec![0u8; width * height];
        for (i, px) in frame.data.chunks_exact(3).enumerate() {
            let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            luma[i] = y as u8;
        }

        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let i = y * width + x;
                let dx = luma[i + 1].abs_diff(luma[i - 1]) as u16;
                let dy = luma[i + width].abs_diff(luma[i - width]) as u16;
                if dx + dy > self.threshold {
                    let p = i * 3;
                    frame.data[p] = 0;
                    frame.data[p + 1] = 255;
                    frame.data[p + 2] = 0;
                }
            }
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::rgb24(data, width, height).unwrap()
    }

    #[test]
    fn annotation_is_deterministic() {
        let frame = checkerboard(16, 16);
        let mut detector = EdgeOverlayDetector::new();
        let a = detector.annotate(frame.clone()).unwrap();
        let b = detector.annotate(frame).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn high_contrast_pixels_are_painted() {
        let frame = checkerboard(16, 16);
        let mut detector = EdgeOverlayDetector::new();
        let annotated = detector.annotate(frame.clone()).unwrap();
        assert_ne!(annotated.data, frame.data);
        // Interior pixel of a checkerboard sits on an edge in both axes.
        let i = (8 * 16 + 8) * 3;
        assert_eq!(&annotated.data[i..i + 3], &[0, 255, 0]);
    }

    #[test]
    fn border_rows_are_left_untouched() {
        let frame = checkerboard(16, 16);
        let mut detector = EdgeOverlayDetector::new();
        let annotated = detector.annotate(frame.clone()).unwrap();
        assert_eq!(&annotated.data[..16 * 3], &frame.data[..16 * 3]);
    }

    #[test]
    fn flat_frames_pass_through_unchanged() {
        let data = vec![128u8; 16 * 16 * 3];
        let frame = Frame::rgb24(data, 16, 16).unwrap();
        let mut detector = EdgeOverlayDetector::new();
        let annotated = detector.annotate(frame.clone()).unwrap();
        assert_eq!(annotated.data, frame.data);
    }
}
