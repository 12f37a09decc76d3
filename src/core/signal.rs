use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// "没有待处理请求" 的内部哨兵值，不对外暴露
const NOTHING_PENDING: i64 = i64::MIN;

/// 单槽控制信号（Seek / 重置目标）
///
/// 控制线程用 `post` 写入，工作线程用 `take` 读取并清空。
/// 工作线程读取之前的多次写入会合并成最后一个值。
#[derive(Debug)]
pub struct PendingTarget {
    slot: AtomicI64,
}

impl PendingTarget {
    pub fn new() -> Self {
        Self {
            slot: AtomicI64::new(NOTHING_PENDING),
        }
    }

    /// 写入目标；返回 true 表示槽位此前为空（需要唤醒工作线程）
    pub fn post(&self, target: i64) -> bool {
        // i64::MIN 不是合法时间戳，避免和哨兵冲突
        let target = target.max(NOTHING_PENDING + 1);
        self.slot.swap(target, Ordering::AcqRel) == NOTHING_PENDING
    }

    /// 读取并清空
    pub fn take(&self) -> Option<i64> {
        match self.slot.swap(NOTHING_PENDING, Ordering::AcqRel) {
            NOTHING_PENDING => None,
            target => Some(target),
        }
    }

    pub fn peek(&self) -> Option<i64> {
        match self.slot.load(Ordering::Acquire) {
            NOTHING_PENDING => None,
            target => Some(target),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.peek().is_some()
    }

    /// 丢弃未处理的请求
    pub fn clear(&self) {
        self.slot.store(NOTHING_PENDING, Ordering::Release);
    }
}

impl Default for PendingTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// 代次计数器：每次不连续（Seek / 重置 / 重新打开 / 循环）加一
#[derive(Debug, Default)]
pub struct Generation {
    value: AtomicU32,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// 加一并返回新值
    pub fn bump(&self) -> u32 {
        self.value.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// 仅当当前值仍为 `expected` 时加一；期间已被别处推进则返回 None
    pub fn advance_from(&self, expected: u32) -> Option<u32> {
        let next = expected.wrapping_add(1);
        self.value
            .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| next)
    }

    pub fn is_current(&self, generation: u32) -> bool {
        self.current() == generation
    }
}
