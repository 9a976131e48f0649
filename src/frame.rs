//! Frame container shared by every pipeline stage.
//!
//! A `Frame` is an opaque pixel payload: the pipeline never inspects its
//! content, it only moves ownership from stage to stage. A frame has no
//! identity beyond its position in whatever queue currently holds it.
//!
//! All shipped sources produce tightly-packed RGB24 buffers. Stages that
//! need another layout (the FFmpeg writer, the JPEG encoder) convert at
//! their own boundary.

use anyhow::{anyhow, Context, Result};
use image::ImageEncoder;

/// Pixel layout of a frame buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGB, 3 bytes per pixel, no row padding.
    Rgb24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// One captured or annotated video frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Frame {
    /// Wrap a tightly-packed RGB24 buffer. The buffer length must match the
    /// advertised geometry exactly.
    pub fn rgb24(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * PixelFormat::Rgb24.bytes_per_pixel();
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format: PixelFormat::Rgb24,
        })
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Nearest-neighbor resize to a new geometry. Used by writers whose
    /// configured geometry differs from what the detector produced.
    pub fn resized_nearest(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let bpp = self.format.bytes_per_pixel();
        let mut out = vec![0u8; width as usize * height as usize * bpp];
        for y in 0..height as usize {
            let src_y = (y * self.height as usize) / height as usize;
            for x in 0..width as usize {
                let src_x = (x * self.width as usize) / width as usize;
                let src = (src_y * self.width as usize + src_x) * bpp;
                let dst = (y * width as usize + x) * bpp;
                out[dst..dst + bpp].copy_from_slice(&self.data[src..src + bpp]);
            }
        }
        Frame {
            data: out,
            width,
            height,
            format: self.format,
        }
    }

    /// Encode the frame as JPEG. `quality` is the usual 1..=100 scale.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder
            .write_image(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("encode frame as jpeg")?;
        Ok(buf)
    }
}
