/// 解码器事件监听
///
/// 回调可能来自控制线程或工作线程，实现方不要在回调里做耗时操作，
/// 也不要在回调里调用 `PlaybackManager::close`。
pub trait DecoderListener: Send + Sync {
    /// 文件打开成功
    fn file_loaded(&self) {}

    /// 位置变化（流时间基单位）
    fn changed_frame_position(&self, _start: i64, _current: i64, _end: i64) {}

    /// 媒体源已释放
    fn file_released(&self) {}

    /// 解码器已关闭
    fn decoder_closed(&self) {}

    /// 播放结束
    fn playing_finished(&self) {}
}

/// 不关心事件时使用
pub struct NullListener;

impl DecoderListener for NullListener {}
