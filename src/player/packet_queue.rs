use crate::core::CompressedUnit;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// 数据包队列中的元素
#[derive(Debug)]
pub enum PacketItem {
    /// 压缩数据
    Unit(CompressedUnit),
    /// 不连续点：之后的数据属于新代次
    Flush {
        generation: u32,
        /// 早于该时间戳的帧在解码端被丢弃
        target: i64,
        /// 需要重建解码器（视频重置）
        reset: bool,
    },
    /// 循环播放：解码端播完手上的帧后从起点开始新代次
    Restart { target: i64 },
    /// 流结束
    EndOfStream,
}

/// `push` 的结果
#[derive(Debug)]
pub enum PushOutcome {
    Pushed,
    /// 队列满等待期间收到 notify，元素原样退回
    Notified(PacketItem),
    Interrupted,
}

struct QueueState {
    items: VecDeque<PacketItem>,
    notified: bool,
    interrupted: bool,
}

/// 有界数据包队列（单生产者：解封装线程，单消费者：解码线程）
///
/// 队列满时 push 阻塞，形成对读源速度的背压；
/// `notify` 只唤醒阻塞中的 push，让解封装线程尽快处理 Seek。
pub struct PacketQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                notified: false,
                interrupted: false,
            }),
            capacity: capacity.max(1),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn push(&self, item: PacketItem) -> PushOutcome {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return PushOutcome::Interrupted;
            }
            if state.items.len() < self.capacity {
                break;
            }
            if state.notified {
                state.notified = false;
                return PushOutcome::Notified(item);
            }
            self.not_full.wait(&mut state);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        PushOutcome::Pushed
    }

    /// 阻塞直到有数据；被中断时返回 None
    pub fn pop(&self) -> Option<PacketItem> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// 清空队列，返回丢弃的元素个数
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.items.len();
        state.items.clear();
        state.notified = false;
        self.not_full.notify_all();
        count
    }

    /// 唤醒阻塞在 push 上的生产者
    pub fn notify(&self) {
        let mut state = self.state.lock();
        state.notified = true;
        self.not_full.notify_all();
    }

    /// 生产者空闲（流已读完）时等待 `notify`；被中断时返回 false
    pub fn wait_notified(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return false;
            }
            if state.notified {
                state.notified = false;
                return true;
            }
            self.not_full.wait(&mut state);
        }
    }

    /// 中断所有等待（关闭时使用）
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// 新会话开始前恢复初始状态
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.notified = false;
        state.interrupted = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
