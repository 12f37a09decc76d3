use crate::core::{FrameFormat, HWAccelType, PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 解码核心配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 显示用像素格式
    pub frame_format: FrameFormat,
    /// 是否把硬件帧直接交给显示层（同时仍保留 CPU 拷贝）
    pub allow_direct_hw_frames: bool,
    /// 是否尝试硬件解码
    pub hw_accel: bool,
    /// 指定硬件类型；None 表示按平台优先级尝试
    pub hw_device: Option<HWAccelType>,
    /// 播放到结尾后是否从头循环
    pub loop_enabled: bool,
    /// 数据包队列容量
    pub packet_queue_capacity: usize,
    /// 帧队列容量
    pub frame_queue_capacity: usize,
    /// 自定义 IO 的缓冲块大小
    pub io_buffer_size: usize,
    /// 网络流超时（微秒）
    pub network_timeout_us: u64,
    /// 帧是否按显示时钟到期后才算就绪
    pub sync_to_clock: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_format: FrameFormat::Yuv420p,
            allow_direct_hw_frames: false,
            hw_accel: true,
            hw_device: None,
            loop_enabled: false,
            // 200 packets ≈ 8秒（25fps），足够缓冲且及时背压
            packet_queue_capacity: 200,
            frame_queue_capacity: 8,
            io_buffer_size: 64 * 1024,
            network_timeout_us: 5_000_000,
            sync_to_clock: true,
        }
    }
}

const MIN_IO_BUFFER_SIZE: usize = 4096;
// avio_alloc_context 的缓冲长度是 int
const MAX_IO_BUFFER_SIZE: usize = 64 * 1024 * 1024;

impl DecoderConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DecoderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_queue_capacity == 0 || self.frame_queue_capacity == 0 {
            return Err(PlayerError::ConfigError("队列容量必须大于 0".to_string()));
        }
        if !(MIN_IO_BUFFER_SIZE..=MAX_IO_BUFFER_SIZE).contains(&self.io_buffer_size) {
            return Err(PlayerError::ConfigError(format!(
                "IO 缓冲大小 {} 超出范围 [{}, {}]",
                self.io_buffer_size, MIN_IO_BUFFER_SIZE, MAX_IO_BUFFER_SIZE
            )));
        }
        Ok(())
    }
}
