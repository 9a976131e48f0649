//! FFmpeg-backed video writer.
//!
//! Encodes RGB24 frames to an MPEG-4 stream in whatever container the
//! output path's extension selects. Presentation timestamps are the frame
//! index against a 1/fps time base.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::Frame;
use crate::sink::{conform_geometry, VideoWriter, WriterConfig};

pub(crate) struct FfmpegWriter {
    octx: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    config: WriterConfig,
    warned_resize: bool,
    finished: bool,
    written: u64,
}

impl FfmpegWriter {
    pub(crate) fn open(config: &WriterConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("create output directory {}", parent.display())
                })?;
            }
        }

        let mut octx = ffmpeg::format::output(&config.path)
            .with_context(|| format!("open output '{}' with ffmpeg", config.path.display()))?;

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("mpeg4 encoder not available"))?;
        let mut stream = octx.add_stream(codec).context("add video stream")?;

        let mut encoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load encoder parameters")?
            .encoder()
            .video()
            .context("open video encoder context")?;

        let fps = config.frame_rate.max(1) as i32;
        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_format(ffmpeg::util::format::pixel::Pixel::YUV420P);
        encoder.set_time_base(ffmpeg::Rational(1, fps));
        encoder.set_frame_rate(Some(ffmpeg::Rational(fps, 1)));

        let encoder = encoder.open_as(codec).context("open mpeg4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(ffmpeg::Rational(1, fps));
        let stream_index = stream.index();

        octx.write_header().context("write container header")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            config.width,
            config.height,
            ffmpeg::util::format::pixel::Pixel::YUV420P,
            config.width,
            config.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create encoder scaler")?;

        log::info!(
            "FfmpegWriter: opened {} ({}x{} @ {} fps)",
            config.path.display(),
            config.width,
            config.height,
            fps
        );

        Ok(Self {
            octx,
            encoder,
            scaler,
            stream_index,
            config: config.clone(),
            warned_resize: false,
            finished: false,
            written: 0,
        })
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet
                .write_interleaved(&mut self.octx)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl VideoWriter for FfmpegWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("write after finish"));
        }
        let frame = conform_geometry(
            frame,
            self.config.width,
            self.config.height,
            &mut self.warned_resize,
        );

        let mut rgb = ffmpeg::frame::Video::new(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            self.config.width,
            self.config.height,
        );
        let row_bytes = self.config.width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for row in 0..self.config.height as usize {
            let src = row * row_bytes;
            let dst = row * stride;
            data[dst..dst + row_bytes].copy_from_slice(&frame.data[src..src + row_bytes]);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to yuv420p")?;
        yuv.set_pts(Some(self.written as i64));

        self.encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        self.drain_packets()?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush encoder")?;
        self.drain_packets()?;
        self.octx.write_trailer().context("write container trailer")?;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.finish() {
                log::warn!("FfmpegWriter: close on drop failed: {}", err);
            }
        }
    }
}
