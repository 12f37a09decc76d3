use crate::core::{
    CompressedUnit, DecoderConfig, FrameFormat, HardwareSurface, PlayerError, Result, VideoFrame,
};
use crate::player::frame_decoder::FrameDecoder;
use crate::player::hw_accel::{self, DecodeBackend, HwFrameSurface};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{codec, software, util};
use log::{debug, info, warn};
use std::sync::Arc;

/// 视频解码器（硬件加速优先，失败回退软解）
pub struct VideoDecoder {
    // 解码上下文必须先于 backend 释放：opaque 指向 backend 里的协商记录
    decoder: codec::decoder::Video,
    backend: DecodeBackend,
    parameters: codec::Parameters,
    scaler: Option<software::scaling::Context>,
    config: DecoderConfig,
    decoded_frames: u64,
}

// SwsContext 和解码上下文本身不是 Send，但每个解码器实例只会在解码线程中使用
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    /// 用解封装器给出的编解码参数打开解码器
    pub fn open(parameters: codec::Parameters, config: &DecoderConfig) -> Result<Self> {
        let (decoder, backend) = Self::build(&parameters, config)?;
        info!(
            "✅ 视频解码器: {} {}x{} ({})",
            decoder.id().name(),
            decoder.width(),
            decoder.height(),
            backend.name()
        );
        Ok(Self {
            decoder,
            backend,
            parameters,
            scaler: None,
            config: config.clone(),
            decoded_frames: 0,
        })
    }

    fn build(
        parameters: &codec::Parameters,
        config: &DecoderConfig,
    ) -> Result<(codec::decoder::Video, DecodeBackend)> {
        let mut context = codec::context::Context::from_parameters(parameters.clone())?;
        let backend = hw_accel::negotiate(&mut context, config);

        let decoder = context
            .decoder()
            .video()
            .map_err(|e| PlayerError::CodecOpen(e.to_string()))?;

        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(PlayerError::UnsupportedResolution {
                width: decoder.width() as i32,
                height: decoder.height() as i32,
            });
        }
        Ok((decoder, backend))
    }

    fn receive_frames(&mut self) -> Vec<VideoFrame> {
        let mut frames = Vec::new();
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => match self.present(decoded) {
                    Ok(frame) => {
                        self.decoded_frames += 1;
                        frames.push(frame);
                    }
                    Err(e) => warn!("⚠️ 帧处理失败（已跳过）: {}", e),
                },
                Err(ffmpeg::Error::Other { errno: EAGAIN }) => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
        frames
    }

    /// 解码帧 → 显示用帧；硬件帧先拷回内存
    fn present(&mut self, decoded: util::frame::Video) -> Result<VideoFrame> {
        let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
        let ratio = decoded.aspect_ratio();
        let aspect = (ratio.numerator(), ratio.denominator());

        let (cpu_frame, surface) = if self.backend.is_hw_frame(&decoded) {
            let cpu_frame = self.backend.transfer(&decoded)?;
            let surface = if self.config.allow_direct_hw_frames {
                Some(Box::new(HwFrameSurface::new(decoded)) as Box<dyn HardwareSurface>)
            } else {
                None
            };
            (cpu_frame, surface)
        } else {
            (decoded, None)
        };

        let data = self.convert(&cpu_frame)?;
        Ok(VideoFrame {
            pts,
            width: cpu_frame.width(),
            height: cpu_frame.height(),
            format: self.config.frame_format,
            data,
            aspect,
            surface,
        })
    }

    /// 转换到目标像素格式并紧密拷贝各平面
    fn convert(&mut self, frame: &util::frame::Video) -> Result<Arc<[u8]>> {
        let width = frame.width();
        let height = frame.height();
        let source_format = frame.format();
        let target = self.config.frame_format;

        let stale = self.scaler.as_ref().map_or(true, |scaler| {
            let input = scaler.input();
            input.format != source_format || input.width != width || input.height != height
        });
        if stale {
            debug!("重建像素转换: {:?} {}x{} -> {:?}", source_format, width, height, target);
            self.scaler = Some(software::scaling::Context::get(
                source_format,
                width,
                height,
                pixel_format(target),
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?);
        }

        let mut converted = util::frame::Video::empty();
        match self.scaler.as_mut() {
            Some(scaler) => scaler.run(frame, &mut converted)?,
            None => return Err(PlayerError::DecodeError("像素转换未初始化".to_string())),
        }

        let mut data = Vec::with_capacity(target.buffer_size(width, height));
        for plane in 0..target.plane_count() {
            let row_size = target.row_bytes(plane, width);
            let stride = converted.stride(plane);
            let plane_data = converted.data(plane);
            for y in 0..target.plane_rows(plane, height) {
                let offset = y * stride;
                data.extend_from_slice(&plane_data[offset..offset + row_size]);
            }
        }
        Ok(Arc::from(data))
    }
}

impl FrameDecoder for VideoDecoder {
    fn decode(&mut self, unit: &CompressedUnit) -> Result<Vec<VideoFrame>> {
        let mut packet = ffmpeg::Packet::copy(&unit.data);
        packet.set_stream(unit.stream_index);
        packet.set_pts(unit.pts);
        packet.set_dts(unit.dts);
        packet.set_duration(unit.duration);
        if unit.is_key {
            packet.set_flags(codec::packet::Flags::KEY);
        }

        match self.decoder.send_packet(&packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
                return Ok(Vec::new());
            }
            Err(e) => return Err(PlayerError::DecodeError(e.to_string())),
        }
        Ok(self.receive_frames())
    }

    fn drain(&mut self) -> Result<Vec<VideoFrame>> {
        self.decoder.send_eof()?;
        let frames = self.receive_frames();
        self.decoder.flush();
        debug!("解码器排空: {} 帧，累计 {} 帧", frames.len(), self.decoded_frames);
        Ok(frames)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn reset(&mut self) -> Result<()> {
        let (decoder, backend) = Self::build(&self.parameters, &self.config)?;
        // 先替换解码上下文，旧的 backend 随后释放
        self.decoder = decoder;
        self.backend = backend;
        self.scaler = None;
        info!("🔄 视频解码器已重建 ({})", self.backend.name());
        Ok(())
    }

    fn is_hardware_accelerated(&self) -> bool {
        self.backend.is_hardware()
    }

    fn description(&self) -> String {
        format!("{} ({})", self.decoder.id().name(), self.backend.name())
    }
}

fn pixel_format(format: FrameFormat) -> util::format::Pixel {
    match format {
        FrameFormat::Yuv420p => util::format::Pixel::YUV420P,
        FrameFormat::Yuyv422 => util::format::Pixel::YUYV422,
        FrameFormat::Rgb24 => util::format::Pixel::RGB24,
        FrameFormat::Bgr24 => util::format::Pixel::BGR24,
        FrameFormat::Rgba => util::format::Pixel::RGBA,
    }
}
