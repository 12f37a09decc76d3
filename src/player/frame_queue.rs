//! 已解码帧队列
//!
//! 单生产者（解码线程）/ 单消费者（显示线程 + 显示层确认）。
//! 队首帧只有在代次等于当前代次时才会交给显示层；
//! 过期帧由解码端在处理不连续点时统一丢弃。

use crate::core::{FrameRenderingData, Generation, PresentableFrame};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// `push` 的结果
#[derive(Debug, PartialEq, Eq)]
pub enum FramePush {
    Pushed,
    /// 帧在等待期间过期（Seek / 重置），已释放
    Stale,
    Interrupted,
}

/// 显示线程等待的结果
#[derive(Debug, PartialEq, Eq)]
pub enum DisplayWait {
    /// 队首帧已被标记为待显示
    Frame { generation: u32, pts: i64 },
    /// 该代次已到流末尾且所有帧都已确认
    Finished { generation: u32 },
    Interrupted,
}

struct FrameState {
    frames: VecDeque<PresentableFrame>,
    /// 当前待显示请求的代次
    display_requested: Option<u32>,
    /// 到达流末尾的代次
    end_of_stream: Option<u32>,
    interrupted: bool,
}

pub struct FrameQueue {
    state: Mutex<FrameState>,
    changed: Condvar,
    capacity: usize,
    generation: Arc<Generation>,
}

impl FrameQueue {
    pub fn new(capacity: usize, generation: Arc<Generation>) -> Self {
        Self {
            state: Mutex::new(FrameState {
                frames: VecDeque::with_capacity(capacity),
                display_requested: None,
                end_of_stream: None,
                interrupted: false,
            }),
            changed: Condvar::new(),
            capacity: capacity.max(1),
            generation,
        }
    }

    /// 推入一帧；队列满时阻塞，这是让解码速度跟上显示速度的主要背压点
    pub fn push(&self, mut frame: PresentableFrame) -> FramePush {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                frame.release_surface();
                return FramePush::Interrupted;
            }
            if !self.generation.is_current(frame.generation) {
                frame.release_surface();
                return FramePush::Stale;
            }
            if state.frames.len() < self.capacity {
                break;
            }
            self.changed.wait(&mut state);
        }
        state.frames.push_back(frame);
        self.changed.notify_all();
        FramePush::Pushed
    }

    /// 代次已变化，唤醒所有等待者重新检查
    pub fn generation_changed(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    /// 丢弃所有过期帧，返回丢弃数
    pub fn retain_current(&self) -> usize {
        let current = self.generation.current();
        let mut state = self.state.lock();
        let before = state.frames.len();
        state.frames.retain_mut(|frame| {
            if frame.generation == current {
                true
            } else {
                frame.release_surface();
                false
            }
        });
        if state.display_requested.is_some_and(|g| g != current) {
            state.display_requested = None;
        }
        state.end_of_stream = None;
        self.changed.notify_all();
        before - state.frames.len()
    }

    pub fn mark_end_of_stream(&self, generation: u32) {
        let mut state = self.state.lock();
        state.end_of_stream = Some(generation);
        self.changed.notify_all();
    }

    /// 等待 `generation` 代次的帧全部被确认
    ///
    /// 代次变化或被中断时提前返回 false。
    pub fn wait_drained(&self, generation: u32) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.interrupted || !self.generation.is_current(generation) {
                return false;
            }
            if state.frames.is_empty() {
                return true;
            }
            self.changed.wait(&mut state);
        }
    }

    /// 等待代次离开 `generation`（流结束后的 Seek / 重置）
    ///
    /// 被中断时返回 false。
    pub fn wait_generation_change(&self, generation: u32) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return false;
            }
            if !self.generation.is_current(generation) {
                return true;
            }
            self.changed.wait(&mut state);
        }
    }

    /// 显示线程：等待下一帧可以提交给显示层
    ///
    /// 上一个请求还没被确认时继续等待；代次变化会让旧请求失效。
    pub fn wait_displayable(&self) -> DisplayWait {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return DisplayWait::Interrupted;
            }
            let current = self.generation.current();
            match state.display_requested {
                Some(g) if g == current => {
                    self.changed.wait(&mut state);
                    continue;
                }
                Some(_) => state.display_requested = None,
                None => {}
            }

            let front = state.frames.front().map(|f| (f.generation, f.frame.pts));
            match front {
                Some((generation, pts)) if generation == current => {
                    state.display_requested = Some(current);
                    return DisplayWait::Frame { generation, pts };
                }
                None if state.end_of_stream == Some(current) => {
                    return DisplayWait::Finished {
                        generation: current,
                    }
                }
                // 队首过期或队列为空：等解码端处理
                _ => self.changed.wait(&mut state),
            }
        }
    }

    /// 显示层确认已渲染队首帧
    ///
    /// 只有代次仍然有效时才出队；否则该帧已被 Seek 作废，由解码端丢弃。
    pub fn acknowledge(&self, generation: u32) -> bool {
        let mut state = self.state.lock();
        let mut popped = false;
        if self.generation.is_current(generation)
            && state.frames.front().is_some_and(|f| f.generation == generation)
        {
            if let Some(mut frame) = state.frames.pop_front() {
                // 硬件帧必须先解除引用再出队
                frame.release_surface();
                popped = true;
            }
        }
        state.display_requested = None;
        self.changed.notify_all();
        popped
    }

    /// 当前有待显示请求的队首帧
    pub fn requested_frame(&self) -> Option<FrameRenderingData> {
        let current = self.generation.current();
        let state = self.state.lock();
        if state.display_requested != Some(current) {
            return None;
        }
        let front = state.frames.front().filter(|f| f.generation == current)?;
        let frame = &front.frame;
        let (aspect_num, aspect_den) = match frame.aspect {
            (num, den) if num != 0 && den != 0 => (num, den),
            _ => (1, 1),
        };
        Some(FrameRenderingData {
            generation: front.generation,
            pts: frame.pts,
            width: frame.width,
            height: frame.height,
            format: frame.format,
            data: frame.data.clone(),
            aspect_num,
            aspect_den,
        })
    }

    /// 待显示请求对应帧的 PTS
    pub fn requested_pts(&self) -> Option<i64> {
        let current = self.generation.current();
        let state = self.state.lock();
        if state.display_requested != Some(current) {
            return None;
        }
        state
            .frames
            .front()
            .filter(|f| f.generation == current)
            .map(|f| f.frame.pts)
    }

    /// 释放并清空所有帧
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.frames.len();
        for frame in state.frames.iter_mut() {
            frame.release_surface();
        }
        state.frames.clear();
        state.display_requested = None;
        state.end_of_stream = None;
        self.changed.notify_all();
        count
    }

    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.changed.notify_all();
    }

    pub fn reset(&self) {
        self.clear();
        self.state.lock().interrupted = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
