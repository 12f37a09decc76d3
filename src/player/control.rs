use crate::core::{
    DecoderConfig, DecoderListener, Generation, NullListener, PendingTarget, PresentationClock,
    StreamContext,
};
use crate::player::frame_queue::FrameQueue;
use crate::player::packet_queue::PacketQueue;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// 三个工作线程、控制线程和显示层共享的状态
///
/// 跨线程共享的可变容器只有两个队列；其余都是原子量，
/// Seek / 重置目标用单槽交换语义传递。
pub struct SharedState {
    pub packets: PacketQueue,
    pub frames: FrameQueue,
    pub generation: Arc<Generation>,
    pub clock: PresentationClock,

    pub pending_seek: PendingTarget,
    pub pending_reset: PendingTarget,

    pub interrupted: AtomicBool,
    pub paused: AtomicBool,
    pub playing: AtomicBool,
    pub video_resetting: AtomicBool,
    pub seeking_while_paused: AtomicBool,
    pub finished_reported: AtomicBool,
    pub loop_enabled: AtomicBool,
    pub sync_to_clock: AtomicBool,
    pub hardware_accelerated: AtomicBool,

    /// 最近一次提交显示的帧 PTS（流时间基单位）
    pub current_time: AtomicI64,

    stream: RwLock<Option<StreamContext>>,
    listener: RwLock<Arc<dyn DecoderListener>>,

    pause_lock: Mutex<()>,
    pause_cv: Condvar,
}

impl SharedState {
    pub fn new(config: &DecoderConfig) -> Self {
        let generation = Arc::new(Generation::new());
        Self {
            packets: PacketQueue::new(config.packet_queue_capacity),
            frames: FrameQueue::new(config.frame_queue_capacity, generation.clone()),
            generation,
            clock: PresentationClock::new(),
            pending_seek: PendingTarget::new(),
            pending_reset: PendingTarget::new(),
            interrupted: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            video_resetting: AtomicBool::new(false),
            seeking_while_paused: AtomicBool::new(false),
            finished_reported: AtomicBool::new(false),
            loop_enabled: AtomicBool::new(config.loop_enabled),
            sync_to_clock: AtomicBool::new(config.sync_to_clock),
            hardware_accelerated: AtomicBool::new(false),
            current_time: AtomicI64::new(0),
            stream: RwLock::new(None),
            listener: RwLock::new(Arc::new(NullListener)),
            pause_lock: Mutex::new(()),
            pause_cv: Condvar::new(),
        }
    }

    pub fn listener(&self) -> Arc<dyn DecoderListener> {
        self.listener.read().clone()
    }

    pub fn set_listener(&self, listener: Arc<dyn DecoderListener>) {
        *self.listener.write() = listener;
    }

    pub fn stream(&self) -> Option<StreamContext> {
        self.stream.read().clone()
    }

    pub fn set_stream(&self, stream: Option<StreamContext>) {
        *self.stream.write() = stream;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// 暂停期间阻塞；被中断时返回 false
    ///
    /// 暂停中发生 Seek 时放行一次，让画面更新到新位置。
    pub fn wait_while_paused(&self) -> bool {
        let mut guard = self.pause_lock.lock();
        while self.paused.load(Ordering::Acquire)
            && !self.seeking_while_paused.load(Ordering::Acquire)
            && !self.is_interrupted()
        {
            self.pause_cv.wait(&mut guard);
        }
        !self.is_interrupted()
    }

    /// 唤醒暂停等待（恢复、暂停中 Seek、关闭）
    pub fn wake(&self) {
        let _guard = self.pause_lock.lock();
        self.pause_cv.notify_all();
    }

    /// 中断所有阻塞点：暂停等待、两个队列
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.wake();
        self.packets.interrupt();
        self.frames.interrupt();
    }

    /// 新会话开始前恢复初始状态
    pub fn reset_session(&self) {
        self.interrupted.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        self.playing.store(false, Ordering::Release);
        self.video_resetting.store(false, Ordering::Release);
        self.seeking_while_paused.store(false, Ordering::Release);
        self.finished_reported.store(false, Ordering::Release);
        self.pending_seek.clear();
        self.pending_reset.clear();
        self.packets.reset();
        self.frames.reset();
    }

    /// 代次加一并唤醒等待帧队列的线程
    pub fn bump_generation(&self) -> u32 {
        let generation = self.generation.bump();
        self.frames.generation_changed();
        generation
    }
}
