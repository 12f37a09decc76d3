use crate::core::{FrameRenderingData, PlayerError, Result};
use crate::player::control::SharedState;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// 显示层使用的句柄：查询、取帧、确认
///
/// 可以克隆并交给渲染线程，和控制线程上的 PlaybackManager 并发使用。
#[derive(Clone)]
pub struct FramePresenter {
    shared: Arc<SharedState>,
}

impl FramePresenter {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// 是否有一帧可以显示
    ///
    /// 需要当前代次的待显示请求、不在重置中；按时钟同步时还要求帧已到期。
    pub fn has_frame_ready(&self) -> bool {
        if !self.shared.playing.load(Ordering::Acquire)
            || self.shared.video_resetting.load(Ordering::Acquire)
        {
            return false;
        }
        let Some(pts) = self.shared.frames.requested_pts() else {
            return false;
        };
        if !self.shared.sync_to_clock.load(Ordering::Acquire) {
            return true;
        }
        match self.shared.stream() {
            Some(stream) => stream.ticks_to_ms(pts) <= self.shared.clock.now(),
            None => false,
        }
    }

    /// 待显示帧的快照；重置中或没有有效帧时失败
    pub fn current_frame(&self) -> Result<FrameRenderingData> {
        if self.shared.video_resetting.load(Ordering::Acquire) {
            return Err(PlayerError::Resetting);
        }
        if !self.shared.playing.load(Ordering::Acquire) {
            return Err(PlayerError::NoFrameReady);
        }
        let frame = self.shared.frames.requested_frame().ok_or(PlayerError::NoFrameReady)?;
        if frame.data.is_empty() || frame.width == 0 || frame.height == 0 {
            return Err(PlayerError::NoFrameReady);
        }
        Ok(frame)
    }

    /// 确认已渲染该代次的帧；代次已过期时返回 false
    pub fn acknowledge_frame(&self, generation: u32) -> bool {
        self.shared.frames.acknowledge(generation)
    }

    /// 展示时钟（毫秒）
    pub fn clock_ms(&self) -> i64 {
        self.shared.clock.now()
    }
}
