use crate::core::{PresentableFrame, VideoFrame};
use crate::player::control::SharedState;
use crate::player::frame_decoder::FrameDecoder;
use crate::player::frame_queue::FramePush;
use crate::player::log_ctx;
use crate::player::packet_queue::PacketItem;
use log::{debug, error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 解码线程：数据包队列 → 解码器 → 帧队列
pub struct DecodeThread {
    thread_handle: Option<JoinHandle<()>>,
}

struct DecodeWorker {
    decoder: Box<dyn FrameDecoder>,
    shared: Arc<SharedState>,
    /// 最近一个 Flush 标记带来的代次，新帧都打这个标记
    active_generation: u32,
    /// Seek 后第一帧到达目标之前的帧都丢弃
    seek_target: Option<i64>,
    frames_pushed: u64,
    frames_dropped: u64,
}

impl DecodeThread {
    pub fn start(decoder: Box<dyn FrameDecoder>, shared: Arc<SharedState>) -> Self {
        let active_generation = shared.generation.current();
        let thread_handle = thread::Builder::new()
            .name("decode".to_string())
            .spawn(move || {
                DecodeWorker {
                    decoder,
                    shared,
                    active_generation,
                    seek_target: None,
                    frames_pushed: 0,
                    frames_dropped: 0,
                }
                .run();
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("{} ❌ 无法启动解码线程: {}", log_ctx(), e);
                None
            }
        };
        Self { thread_handle }
    }

    pub fn join(mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ 解码线程异常退出", log_ctx());
            }
        }
    }
}

impl DecodeWorker {
    fn run(mut self) {
        info!(
            "{} 🎞️ 解码线程启动: {} (代次 {})",
            log_ctx(),
            self.decoder.description(),
            self.active_generation
        );

        while let Some(item) = self.shared.packets.pop() {
            match item {
                PacketItem::Unit(unit) => match self.decoder.decode(&unit) {
                    Ok(frames) => {
                        if !self.deliver(frames) {
                            break;
                        }
                    }
                    Err(e) => warn!("{} ⚠️ 解码失败（丢弃该数据包）: {}", log_ctx(), e),
                },
                PacketItem::Flush {
                    generation,
                    target,
                    reset,
                } => self.flush(generation, target, reset),
                PacketItem::Restart { target } => {
                    if !self.restart(target) {
                        break;
                    }
                }
                PacketItem::EndOfStream => {
                    match self.decoder.drain() {
                        Ok(frames) => {
                            if !self.deliver(frames) {
                                break;
                            }
                        }
                        Err(e) => warn!("{} ⚠️ 排空解码器失败: {}", log_ctx(), e),
                    }
                    self.shared.frames.mark_end_of_stream(self.active_generation);
                    // 不退出：之后的 Flush 会从新位置继续解码
                    info!("{} 📄 解码到达流末尾（代次 {}）", log_ctx(), self.active_generation);
                }
            }
        }

        info!(
            "{} 🛑 解码线程退出（推送 {} 帧，丢弃 {} 帧）",
            log_ctx(),
            self.frames_pushed,
            self.frames_dropped
        );
    }

    fn flush(&mut self, generation: u32, target: i64, reset: bool) {
        self.decoder.flush();
        if reset {
            if let Err(e) = self.decoder.reset() {
                error!("{} ❌ 重建解码器失败，沿用原解码器: {}", log_ctx(), e);
            }
            self.shared
                .hardware_accelerated
                .store(self.decoder.is_hardware_accelerated(), Ordering::Release);
            self.shared.video_resetting.store(false, Ordering::Release);
        }
        self.active_generation = generation;
        self.seek_target = Some(target);
        let dropped = self.shared.frames.retain_current();
        self.frames_dropped += dropped as u64;
        debug!(
            "{} 🧹 解码端切换到代次 {}，丢弃 {} 个旧帧",
            log_ctx(),
            generation,
            dropped
        );
    }

    /// 循环播放：先播完当前代次，再从起点开始新代次；返回 false 表示被中断
    ///
    /// 等待期间如果 Seek 已经推进了代次，这次重启作废，后面的 Flush 会接管。
    fn restart(&mut self, target: i64) -> bool {
        match self.decoder.drain() {
            Ok(frames) => {
                if !self.deliver(frames) {
                    return false;
                }
            }
            Err(e) => warn!("{} ⚠️ 排空解码器失败: {}", log_ctx(), e),
        }

        let observed = self.active_generation;
        if !self.shared.frames.wait_drained(observed) {
            return !self.shared.is_interrupted();
        }
        match self.shared.generation.advance_from(observed) {
            Some(generation) => {
                self.shared.frames.generation_changed();
                self.decoder.flush();
                self.active_generation = generation;
                self.seek_target = Some(target);
                info!("{} 🔁 从起点重新开始，代次 {}", log_ctx(), generation);
            }
            None => debug!("{} 循环重启被 Seek 取代", log_ctx()),
        }
        true
    }

    /// 推送一批帧；返回 false 表示被中断
    fn deliver(&mut self, frames: Vec<VideoFrame>) -> bool {
        let mut frames = frames.into_iter();
        while let Some(mut frame) = frames.next() {
            if let Some(target) = self.seek_target {
                if frame.pts < target {
                    frame.release_surface();
                    self.frames_dropped += 1;
                    continue;
                }
                self.seek_target = None;
            }

            match self
                .shared
                .frames
                .push(PresentableFrame::new(frame, self.active_generation))
            {
                FramePush::Pushed => self.frames_pushed += 1,
                FramePush::Stale => self.frames_dropped += 1,
                FramePush::Interrupted => {
                    for mut rest in frames {
                        rest.release_surface();
                    }
                    return false;
                }
            }
        }
        true
    }
}
