use crate::core::{CompressedUnit, Result, VideoFrame};

/// 解码器抽象接口
///
/// 解码线程独占持有实现对象。单个数据包解码失败只影响这一个包，
/// 由调用方记录并跳过。
pub trait FrameDecoder: Send {
    /// 送入一个数据包，返回 0 个或多个已转换的帧
    fn decode(&mut self, unit: &CompressedUnit) -> Result<Vec<VideoFrame>>;

    /// 流结束：取出解码器内部缓冲的剩余帧
    fn drain(&mut self) -> Result<Vec<VideoFrame>>;

    /// 丢弃内部缓冲（Seek 后）
    fn flush(&mut self);

    /// 重建解码上下文，重新协商硬件加速
    fn reset(&mut self) -> Result<()>;

    fn is_hardware_accelerated(&self) -> bool;

    fn description(&self) -> String;
}
