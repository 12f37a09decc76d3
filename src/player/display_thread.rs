use crate::core::StreamContext;
use crate::player::control::SharedState;
use crate::player::frame_queue::DisplayWait;
use crate::player::log_ctx;
use log::{debug, error, info};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 显示线程
///
/// 把帧队列队首标记为待显示，然后等显示层确认。每个代次的第一帧
/// 会把展示时钟重新对齐到该帧的时间戳；每次提交都上报播放位置。
/// 播放结束后不退出，等待 Seek / 重置开始的新代次。
pub struct DisplayThread {
    thread_handle: Option<JoinHandle<()>>,
}

impl DisplayThread {
    pub fn start(shared: Arc<SharedState>, stream: StreamContext) -> Self {
        let thread_handle = thread::Builder::new()
            .name("display".to_string())
            .spawn(move || display_loop(&shared, &stream));

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("{} ❌ 无法启动显示线程: {}", log_ctx(), e);
                None
            }
        };
        Self { thread_handle }
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ 显示线程异常退出", log_ctx());
            }
        }
    }
}

impl Drop for DisplayThread {
    fn drop(&mut self) {
        self.join();
    }
}

fn display_loop(shared: &SharedState, stream: &StreamContext) {
    info!("{} 🖼️ 显示线程启动", log_ctx());
    let mut anchored_generation: Option<u32> = None;
    let mut offered: u64 = 0;

    loop {
        if !shared.wait_while_paused() {
            break;
        }

        match shared.frames.wait_displayable() {
            DisplayWait::Frame { generation, pts } => {
                if anchored_generation != Some(generation) {
                    // 新代次的第一帧：时钟对齐到这一帧
                    let ms = stream.ticks_to_ms(pts);
                    shared.clock.set_time(ms);
                    anchored_generation = Some(generation);
                    shared.seeking_while_paused.store(false, Ordering::Release);
                    debug!("{} ⏱️ 时钟对齐到 {}ms（代次 {}）", log_ctx(), ms, generation);
                }
                offered += 1;
                shared.current_time.store(pts, Ordering::Release);
                shared
                    .listener()
                    .changed_frame_position(stream.start_time, pts, stream.end_time());
            }
            DisplayWait::Finished { generation } => {
                if !shared.finished_reported.swap(true, Ordering::AcqRel) {
                    info!("{} 🏁 播放结束（代次 {}）", log_ctx(), generation);
                    shared.listener().playing_finished();
                }
                // 结束后仍可 Seek / 重置，新的一轮结束时再上报一次
                if !shared.frames.wait_generation_change(generation) {
                    break;
                }
                shared.finished_reported.store(false, Ordering::Release);
            }
            DisplayWait::Interrupted => break,
        }
    }

    info!("{} 🛑 显示线程退出（提交 {} 帧）", log_ctx(), offered);
}
