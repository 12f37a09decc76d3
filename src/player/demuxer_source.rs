use crate::core::{CompressedUnit, Result, StreamContext};

/// Demuxer 数据源抽象接口
///
/// 解封装线程只通过这个 trait 访问媒体源，
/// 不同的实现（FFmpeg、测试用的脚本源）可以互换。
pub trait DemuxerSource: Send {
    /// 读取下一个压缩数据单元
    ///
    /// 返回：
    /// - Ok(Some(unit)): 成功读取（可能属于非视频流，由调用方过滤）
    /// - Ok(None): 到达流末尾
    /// - Err(e): 读取错误
    fn read_unit(&mut self) -> Result<Option<CompressedUnit>>;

    /// Seek 到指定时间戳（流时间基单位）
    fn seek(&mut self, timestamp: i64) -> Result<()>;

    /// 选中视频流的参数
    fn stream_context(&self) -> &StreamContext;

    /// 是否支持 seek（只有本地文件支持）
    fn is_seekable(&self) -> bool {
        self.stream_context().is_file
    }

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
