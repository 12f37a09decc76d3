use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开媒体源: {0}")]
    OpenError(String),

    #[error("无法获取流信息")]
    NoStreamInfo,

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("不支持的分辨率: {width}x{height}")]
    UnsupportedResolution { width: i32, height: i32 },

    #[error("无法打开解码器: {0}")]
    CodecOpen(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("硬件帧传输失败: {0}")]
    HardwareTransfer(String),

    #[error("当前媒体源不支持 Seek")]
    NotSeekable,

    #[error("状态 {state} 下不能执行 {operation}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("没有可显示的帧")]
    NoFrameReady,

    #[error("视频正在重置")]
    Resetting,

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl From<serde_json::Error> for PlayerError {
    fn from(e: serde_json::Error) -> Self {
        PlayerError::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
