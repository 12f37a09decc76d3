use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 显示时钟 - 视频帧按它判断是否到期
///
/// 暂停期间时间不推进：恢复时以暂停位置为新的基准，
/// 所以任意次暂停/恢复之后，累计时间都不包含暂停时长。
#[derive(Clone)]
pub struct PresentationClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_ms: i64,               // 基准时间（毫秒）
    base_instant: Instant,      // 基准时刻
    paused: bool,
    paused_at: i64,             // 暂停时的位置
}

impl ClockInner {
    fn now(&self) -> i64 {
        if self.paused {
            self.paused_at
        } else {
            self.base_ms + self.base_instant.elapsed().as_millis() as i64
        }
    }
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_ms: 0,
                base_instant: Instant::now(),
                paused: true,
                paused_at: 0,
            })),
        }
    }

    /// 获取当前显示时间（毫秒）
    pub fn now(&self) -> i64 {
        self.inner.lock().now()
    }

    /// 重新锚定时钟（新代次的第一帧、Seek）
    pub fn set_time(&self, ms: i64) {
        let mut inner = self.inner.lock();
        inner.base_ms = ms;
        inner.base_instant = Instant::now();
        inner.paused_at = ms;
    }

    /// 开始/恢复走时
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base_ms = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
    }

    /// 暂停走时
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = inner.now();
            inner.paused = true;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}
