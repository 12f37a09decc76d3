use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// 媒体源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// 本地文件路径（唯一支持 Seek 的来源）
    LocalFile(PathBuf),

    /// 网络流 URL
    NetworkStream(String),

    /// 摄像头采集
    Camera,

    /// 桌面采集
    Desktop,
}

impl MediaSource {
    /// 从字符串解析媒体源：带协议头的按网络流处理，其余当作本地文件
    pub fn parse(input: &str) -> Self {
        const PROTOCOLS: [&str; 6] = ["rtsp://", "rtmp://", "http://", "https://", "udp://", "tcp://"];
        if PROTOCOLS.iter().any(|p| input.starts_with(p)) {
            MediaSource::NetworkStream(input.to_string())
        } else {
            MediaSource::LocalFile(PathBuf::from(input))
        }
    }

    /// 对应原始的 isFile 标志
    pub fn is_file(&self) -> bool {
        matches!(self, MediaSource::LocalFile(_))
    }

    pub fn description(&self) -> String {
        match self {
            MediaSource::LocalFile(path) => path.display().to_string(),
            MediaSource::NetworkStream(url) => url.clone(),
            MediaSource::Camera => "camera".to_string(),
            MediaSource::Desktop => "desktop".to_string(),
        }
    }
}

/// 硬件解码器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HWAccelType {
    DXVA2,          // Windows DirectX Video Acceleration 2
    D3D11VA,        // Windows Direct3D 11
    VAAPI,          // Linux Video Acceleration API
    VDPAU,          // Linux VDPAU
    VideoToolbox,   // macOS VideoToolbox
    CUDA,           // NVIDIA CUDA
    QSV,            // Intel Quick Sync Video
}

impl HWAccelType {
    pub fn name(&self) -> &'static str {
        match self {
            HWAccelType::DXVA2 => "DXVA2",
            HWAccelType::D3D11VA => "D3D11VA",
            HWAccelType::VAAPI => "VAAPI",
            HWAccelType::VDPAU => "VDPAU",
            HWAccelType::VideoToolbox => "VideoToolbox",
            HWAccelType::CUDA => "CUDA",
            HWAccelType::QSV => "QSV",
        }
    }

    /// 当前平台的候选硬件类型（按优先级排序）
    pub fn platform_candidates() -> Vec<HWAccelType> {
        let mut candidates = Vec::new();

        #[cfg(target_os = "windows")]
        {
            candidates.push(HWAccelType::DXVA2);
            candidates.push(HWAccelType::D3D11VA);
        }

        #[cfg(target_os = "macos")]
        candidates.push(HWAccelType::VideoToolbox);

        #[cfg(target_os = "linux")]
        {
            candidates.push(HWAccelType::VAAPI);
            candidates.push(HWAccelType::VDPAU);
        }

        candidates.push(HWAccelType::CUDA);
        candidates.push(HWAccelType::QSV);
        candidates
    }
}

/// 显示用像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    #[default]
    Yuv420p,
    Yuyv422,
    Rgb24,
    Bgr24,
    Rgba,
}

impl FrameFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            FrameFormat::Yuv420p => 3,
            _ => 1,
        }
    }

    /// 某个平面一行的有效字节数（不含对齐填充）
    pub fn row_bytes(&self, plane: usize, width: u32) -> usize {
        let width = width as usize;
        match (self, plane) {
            (FrameFormat::Yuv420p, 0) => width,
            (FrameFormat::Yuv420p, _) => (width + 1) / 2,
            (FrameFormat::Yuyv422, _) => width * 2,
            (FrameFormat::Rgb24, _) | (FrameFormat::Bgr24, _) => width * 3,
            (FrameFormat::Rgba, _) => width * 4,
        }
    }

    pub fn plane_rows(&self, plane: usize, height: u32) -> usize {
        let height = height as usize;
        match (self, plane) {
            (FrameFormat::Yuv420p, 0) => height,
            (FrameFormat::Yuv420p, _) => (height + 1) / 2,
            _ => height,
        }
    }

    /// 紧密排列时整帧的字节数
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        (0..self.plane_count())
            .map(|plane| self.row_bytes(plane, width) * self.plane_rows(plane, height))
            .sum()
    }
}

/// 选中视频流的参数（打开时确定，只读；完整重置时才重建）
#[derive(Debug, Clone, PartialEq)]
pub struct StreamContext {
    pub stream_index: usize,
    pub time_base: (i32, i32),
    pub start_time: i64,      // 流时间基单位
    pub duration: i64,        // 流时间基单位
    pub width: i32,
    pub height: i32,
    pub codec_name: String,
    pub is_file: bool,
}

impl StreamContext {
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }

    /// 流时间基 → 毫秒
    pub fn ticks_to_ms(&self, ticks: i64) -> i64 {
        let (num, den) = self.time_base;
        if den == 0 {
            return 0;
        }
        (ticks as i128 * num as i128 * 1000 / den as i128) as i64
    }

    /// 毫秒 → 流时间基
    pub fn ms_to_ticks(&self, ms: i64) -> i64 {
        let (num, den) = self.time_base;
        if num == 0 {
            return 0;
        }
        (ms as i128 * den as i128 / (num as i128 * 1000)) as i64
    }

    /// 按百分比换算出的绝对时间戳
    pub fn position_at(&self, percent: f64) -> i64 {
        self.start_time + (self.duration as f64 * percent) as i64
    }
}

/// 压缩数据单元（解封装产出，解码线程消费）
#[derive(Debug, Clone, Default)]
pub struct CompressedUnit {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub is_key: bool,
    pub data: Vec<u8>,
}

/// 平台持有的硬件帧内存，必须显式释放
pub trait HardwareSurface: Send {
    fn release(&mut self);
}

/// 解码并转换后的视频帧
pub struct VideoFrame {
    pub pts: i64,               // 流时间基单位
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Arc<[u8]>,        // 转换后的紧密排列数据
    pub aspect: (i32, i32),     // 采样宽高比
    pub surface: Option<Box<dyn HardwareSurface>>,
}

impl VideoFrame {
    pub fn is_hardware(&self) -> bool {
        self.surface.is_some()
    }

    /// 释放硬件帧引用；重复调用无副作用
    pub fn release_surface(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("pts", &self.pts)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .field("hardware", &self.is_hardware())
            .finish()
    }
}

/// 带代次标记、等待显示的帧
#[derive(Debug)]
pub struct PresentableFrame {
    pub frame: VideoFrame,
    pub generation: u32,
}

impl PresentableFrame {
    pub fn new(frame: VideoFrame, generation: u32) -> Self {
        Self { frame, generation }
    }

    /// 释放硬件帧引用（出队、清空、丢弃前调用）
    pub fn release_surface(&mut self) {
        self.frame.release_surface();
    }
}

/// 给显示层的帧快照
#[derive(Debug, Clone)]
pub struct FrameRenderingData {
    pub generation: u32,
    pub pts: i64,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Arc<[u8]>,
    pub aspect_num: i32,
    pub aspect_den: i32,
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Closed,
    Opening,
    Opened,
    Playing,
    Paused,
    Closing,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Closed => "Closed",
            PlaybackState::Opening => "Opening",
            PlaybackState::Opened => "Opened",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Closing => "Closing",
        }
    }
}

/// 缓冲状态信息（用于监控和调试）
#[derive(Debug, Clone, Default)]
pub struct BufferStatus {
    /// 视频数据包队列长度
    pub video_packets: usize,

    /// 视频帧队列长度
    pub video_frames: usize,
}
