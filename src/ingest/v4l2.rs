//! V4L2 device source.
//!
//! Captures frames from a local device node (e.g. /dev/video0) via libv4l
//! memory-mapped buffers. A live device never reports exhaustion; capture
//! failures propagate as errors.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use crate::frame::Frame;
use crate::ingest::VideoSource;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 25;

pub struct V4l2Source {
    device_path: String,
    state: DeviceState,
    active_width: u32,
    active_height: u32,
    frame_rate: u32,
    frame_count: u64,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn open(device_path: &str) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = DEFAULT_WIDTH;
        format.height = DEFAULT_HEIGHT;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", device_path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let params = v4l::video::capture::Parameters::with_fps(DEFAULT_FPS);
        if let Err(err) = device.set_params(&params) {
            log::warn!("V4l2Source: failed to set fps on {}: {}", device_path, err);
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: opened {} ({}x{})",
            device_path,
            format.width,
            format.height
        );

        Ok(Self {
            device_path: device_path.to_string(),
            state,
            active_width: format.width,
            active_height: format.height,
            frame_rate: DEFAULT_FPS,
            frame_count: 0,
        })
    }
}

impl VideoSource for V4l2Source {
    fn read(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let (buf, _meta) = self
            .state
            .with_mut(|fields| fields.stream.next())
            .with_context(|| format!("capture v4l2 frame from {}", self.device_path))?;

        self.frame_count += 1;
        let frame = Frame::rgb24(buf.to_vec(), self.active_width, self.active_height)?;
        Ok(Some(frame))
    }

    fn geometry(&self) -> (u32, u32) {
        (self.active_width, self.active_height)
    }

    fn frame_rate(&self) -> u32 {
        self.frame_rate
    }
}
