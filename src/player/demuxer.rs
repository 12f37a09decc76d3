use crate::core::{CompressedUnit, DecoderConfig, MediaSource, PlayerError, Result, StreamContext};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::source_io::{CustomIo, SourceIo};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, ffi, format, media};
use log::{debug, info, warn};
use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr;
use std::thread;
use std::time::Duration;

#[cfg(target_os = "linux")]
const CAMERA_INPUT: (&str, &str) = ("v4l2", "/dev/video0");
#[cfg(target_os = "windows")]
const CAMERA_INPUT: (&str, &str) = ("vfwcap", "0");
#[cfg(target_os = "macos")]
const CAMERA_INPUT: (&str, &str) = ("avfoundation", "0");
#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
const CAMERA_INPUT: (&str, &str) = ("v4l2", "/dev/video0");

#[cfg(target_os = "linux")]
const DESKTOP_INPUT: (&str, &str) = ("x11grab", ":0.0");
#[cfg(target_os = "windows")]
const DESKTOP_INPUT: (&str, &str) = ("gdigrab", "desktop");
#[cfg(target_os = "macos")]
const DESKTOP_INPUT: (&str, &str) = ("avfoundation", "1");
#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
const DESKTOP_INPUT: (&str, &str) = ("x11grab", ":0.0");

/// 解封装器：打开媒体源，选出视频流，按需产出压缩数据单元
pub struct Demuxer {
    // 字段顺序即释放顺序：格式上下文必须先于自定义 IO 释放
    input: format::context::Input,
    io: Option<CustomIo>,
    stream_context: StreamContext,
    parameters: codec::Parameters,
    source: MediaSource,
}

// 格式上下文只在解封装线程里使用
unsafe impl Send for Demuxer {}

impl Demuxer {
    /// 打开媒体源
    pub fn open(source: &MediaSource, config: &DecoderConfig) -> Result<Self> {
        info!("📂 正在打开: {}", source.description());
        config.validate()?;

        let (input, io) = match source {
            MediaSource::LocalFile(path) => {
                let mut io = CustomIo::new(SourceIo::open(path, config.io_buffer_size)?)?;
                let input = unsafe { open_input(None, ptr::null(), ffmpeg::Dictionary::new(), Some(&mut io))? };
                (input, Some(io))
            }
            MediaSource::NetworkStream(url) => {
                info!("🌐 网络流，超时 {} 微秒", config.network_timeout_us);
                let timeout = config.network_timeout_us.to_string();
                let mut options = ffmpeg::Dictionary::new();
                options.set("stimeout", &timeout);
                options.set("rw_timeout", &timeout);
                options.set("fflags", "+discardcorrupt+genpts");
                let input = unsafe { open_input(Some(url), ptr::null(), options, None)? };
                (input, None)
            }
            MediaSource::Camera => (open_device(CAMERA_INPUT)?, None),
            MediaSource::Desktop => (open_device(DESKTOP_INPUT)?, None),
        };

        // 编号最小的视频流
        let stream = input
            .streams()
            .find(|s| s.parameters().medium() == media::Type::Video)
            .ok_or(PlayerError::NoVideoStream)?;
        let stream_index = stream.index();
        let parameters = stream.parameters();

        let time_base = stream.time_base();
        let (width, height) = unsafe {
            let raw = parameters.as_ptr();
            ((*raw).width, (*raw).height)
        };
        let (start_time, duration) = stream_timing(
            stream.start_time(),
            stream.duration(),
            unsafe { (*input.as_ptr()).start_time },
            input.duration(),
            (time_base.numerator(), time_base.denominator()),
        );

        let stream_context = StreamContext {
            stream_index,
            time_base: (time_base.numerator(), time_base.denominator()),
            start_time,
            duration,
            width,
            height,
            codec_name: parameters.id().name().to_string(),
            is_file: source.is_file(),
        };

        // 拷贝一份参数，脱离对格式上下文的引用
        let parameters = parameters.clone();

        info!(
            "✅ 视频流 #{}: {} {}x{}, time_base {}/{}, 起始 {}, 时长 {}",
            stream_index,
            stream_context.codec_name,
            width,
            height,
            stream_context.time_base.0,
            stream_context.time_base.1,
            start_time,
            duration
        );

        Ok(Self {
            input,
            io,
            stream_context,
            parameters,
            source: source.clone(),
        })
    }

    /// 解码器创建用的编解码参数（独立副本）
    pub fn codec_parameters(&self) -> codec::Parameters {
        self.parameters.clone()
    }
}

impl DemuxerSource for Demuxer {
    fn read_unit(&mut self) -> Result<Option<CompressedUnit>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    return Ok(Some(CompressedUnit {
                        stream_index: packet.stream(),
                        pts: packet.pts(),
                        dts: packet.dts(),
                        duration: packet.duration(),
                        is_key: packet.is_key(),
                        data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                    }));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                    // 实时源暂时没有数据
                    thread::sleep(Duration::from_millis(5));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seek(&mut self, timestamp: i64) -> Result<()> {
        let ret = unsafe {
            ffi::av_seek_frame(
                self.input.as_mut_ptr(),
                self.stream_context.stream_index as c_int,
                timestamp,
                ffi::AVSEEK_FLAG_BACKWARD as c_int,
            )
        };
        if ret < 0 {
            warn!("⚠️ Seek 到 {} 失败: {}", timestamp, ffmpeg::Error::from(ret));
            return Err(ffmpeg::Error::from(ret).into());
        }
        debug!("Seek 到 {} 完成", timestamp);
        Ok(())
    }

    fn stream_context(&self) -> &StreamContext {
        &self.stream_context
    }

    fn description(&self) -> String {
        if self.io.is_some() {
            format!("FFmpeg Demuxer（自定义 IO）: {}", self.source.description())
        } else {
            format!("FFmpeg Demuxer: {}", self.source.description())
        }
    }
}

/// 计算起始时间和时长（流时间基单位）
///
/// 流自己的起始时间有效（> 0）时直接用，否则由容器的微秒起始时间换算；
/// 时长同理，流时长缺失时用容器时长换算。
pub fn stream_timing(
    stream_start: i64,
    stream_duration: i64,
    container_start_us: i64,
    container_duration_us: i64,
    time_base: (i32, i32),
) -> (i64, i64) {
    let (num, den) = time_base;
    let seconds_per_tick = if den != 0 { num as f64 / den as f64 } else { 0.0 };
    let us_to_ticks = |us: i64| -> i64 {
        if seconds_per_tick == 0.0 {
            0
        } else {
            (us as f64 / 1_000_000.0 / seconds_per_tick) as i64
        }
    };

    let start_time = if stream_start > 0 && stream_start != ffi::AV_NOPTS_VALUE {
        stream_start
    } else if container_start_us == ffi::AV_NOPTS_VALUE {
        0
    } else {
        us_to_ticks(container_start_us)
    };

    let duration = if stream_duration > 0 && stream_duration != ffi::AV_NOPTS_VALUE {
        stream_duration
    } else if container_duration_us <= 0 || container_duration_us == ffi::AV_NOPTS_VALUE {
        0
    } else {
        us_to_ticks(container_duration_us)
    };

    (start_time, duration)
}

fn open_device((format_name, device): (&str, &str)) -> Result<format::context::Input> {
    ffmpeg::device::register_all();
    let name = CString::new(format_name).map_err(|e| PlayerError::OpenError(e.to_string()))?;
    let format = unsafe { ffi::av_find_input_format(name.as_ptr()) };
    if format.is_null() {
        return Err(PlayerError::OpenError(format!("采集格式不可用: {}", format_name)));
    }
    info!("📷 采集设备: {} ({})", device, format_name);
    unsafe { open_input(Some(device), format, ffmpeg::Dictionary::new(), None) }
}

/// 打开格式上下文并读取流信息
///
/// # Safety
/// `format` 为空或指向有效的输入格式。
unsafe fn open_input(
    url: Option<&str>,
    format: *const ffi::AVInputFormat,
    options: ffmpeg::Dictionary,
    io: Option<&mut CustomIo>,
) -> Result<format::context::Input> {
    let url = url
        .map(CString::new)
        .transpose()
        .map_err(|e| PlayerError::OpenError(e.to_string()))?;

    let mut ctx = ffi::avformat_alloc_context();
    if ctx.is_null() {
        return Err(PlayerError::OpenError("avformat_alloc_context 失败".to_string()));
    }
    if let Some(io) = io {
        if let Err(e) = io.attach(ctx) {
            ffi::avformat_free_context(ctx);
            return Err(e);
        }
    }

    let mut opts = options.disown();
    let ret = ffi::avformat_open_input(
        &mut ctx,
        url.as_ref().map_or(ptr::null(), |u| u.as_ptr()),
        format,
        &mut opts,
    );
    // 未被消费的选项
    drop(ffmpeg::Dictionary::own(opts));

    if ret < 0 {
        // 失败时 FFmpeg 已释放 ctx
        return Err(PlayerError::OpenError(format!(
            "无法打开输入: {}",
            ffmpeg::Error::from(ret)
        )));
    }

    let mut input = format::context::Input::wrap(ctx);
    if ffi::avformat_find_stream_info(input.as_mut_ptr(), ptr::null_mut()) < 0 {
        return Err(PlayerError::NoStreamInfo);
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_values_win_when_valid() {
        assert_eq!(stream_timing(900, 90_000, 0, 0, (1, 90_000)), (900, 90_000));
    }

    #[test]
    fn container_values_converted_to_ticks() {
        // 容器起始 0.5 秒、时长 10 秒，time_base 1/1000
        assert_eq!(stream_timing(0, 0, 500_000, 10_000_000, (1, 1000)), (500, 10_000));
    }

    #[test]
    fn unknown_values_become_zero() {
        assert_eq!(
            stream_timing(ffi::AV_NOPTS_VALUE, ffi::AV_NOPTS_VALUE, ffi::AV_NOPTS_VALUE, ffi::AV_NOPTS_VALUE, (1, 1000)),
            (0, 0)
        );
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let source = MediaSource::LocalFile(dir.path().join("none.mp4"));
        assert!(matches!(
            Demuxer::open(&source, &DecoderConfig::default()),
            Err(PlayerError::OpenError(_))
        ));
    }

    #[test]
    fn garbage_file_fails_to_open() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        file.flush().unwrap();
        ffmpeg::init().unwrap();
        let source = MediaSource::LocalFile(file.path().to_path_buf());
        assert!(Demuxer::open(&source, &DecoderConfig::default()).is_err());
    }
}
