use crate::core::{CompressedUnit, StreamContext};
use crate::player::control::SharedState;
use crate::player::decode_thread::DecodeThread;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::frame_decoder::FrameDecoder;
use crate::player::log_ctx;
use crate::player::packet_queue::{PacketItem, PushOutcome};
use log::{debug, error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 解封装（parse）线程
///
/// 持有数据源，按需读包喂给数据包队列；Seek / 重置在这里推进代次并
/// 转换成队列里的 Flush 标记，循环播放转换成 Restart 标记。
/// 流读完后线程不退出，直到关闭前都可以被 Seek / 重置唤醒。
/// 解码线程由它启动，也由它在退出前回收。
pub struct DemuxerThread {
    thread_handle: Option<JoinHandle<()>>,
}

struct ParseWorker {
    source: Box<dyn DemuxerSource>,
    shared: Arc<SharedState>,
    stream: StreamContext,
    unit_count: usize,
}

/// 处理不连续点后的去向
enum Control {
    Continue,
    Discontinuity,
}

impl DemuxerThread {
    pub fn start(
        source: Box<dyn DemuxerSource>,
        decoder: Box<dyn FrameDecoder>,
        shared: Arc<SharedState>,
    ) -> Self {
        let stream = source.stream_context().clone();
        let thread_handle = thread::Builder::new()
            .name("parse".to_string())
            .spawn(move || {
                let decode = DecodeThread::start(decoder, shared.clone());
                let mut worker = ParseWorker {
                    source,
                    shared,
                    stream,
                    unit_count: 0,
                };
                worker.run();
                // 解码线程退出后数据源才随 worker 释放
                decode.join();
                drop(worker);
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("{} ❌ 无法启动解封装线程: {}", log_ctx(), e);
                None
            }
        };
        Self { thread_handle }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 等待线程退出（调用前必须先中断共享状态）
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ 解封装线程异常退出", log_ctx());
            }
        }
    }
}

impl Drop for DemuxerThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ DemuxerThread 被 drop 但未 join，正在等待退出", log_ctx());
            self.join();
        }
    }
}

impl ParseWorker {
    fn run(&mut self) {
        info!("{} 🎬 解封装线程启动: {}", log_ctx(), self.source.description());

        loop {
            if self.shared.is_interrupted() {
                break;
            }
            self.handle_control();

            match self.source.read_unit() {
                Ok(Some(unit)) => {
                    if unit.stream_index != self.stream.stream_index {
                        continue;
                    }
                    if !self.push_unit(unit) {
                        break;
                    }
                }
                Ok(None) => {
                    if !self.handle_end_of_stream() {
                        break;
                    }
                }
                Err(e) => {
                    error!("{} ❌ 读取包失败（按流结束处理）: {}", log_ctx(), e);
                    if !self.handle_end_of_stream() {
                        break;
                    }
                }
            }
        }

        info!("{} 🛑 解封装线程退出（共推送 {} 个视频包）", log_ctx(), self.unit_count);
    }

    /// 取出挂起的 Seek / 重置请求并执行
    ///
    /// 两者同时挂起时只做一次不连续处理：目标取 Seek 的，重置标记保留。
    fn handle_control(&mut self) -> Control {
        let reset = self.shared.pending_reset.take();
        let seek = self.shared.pending_seek.take();

        let (target, is_reset) = match (seek, reset) {
            (Some(target), reset) => (target, reset.is_some()),
            (None, Some(target)) => (target, true),
            (None, None) => return Control::Continue,
        };
        self.discontinuity(target, is_reset);
        Control::Discontinuity
    }

    fn discontinuity(&mut self, target: i64, reset: bool) {
        if reset {
            self.shared.video_resetting.store(true, Ordering::Release);
        }
        if self.source.is_seekable() {
            if let Err(e) = self.source.seek(target) {
                error!("{} ❌ Seek 到 {} 失败: {}", log_ctx(), target, e);
            }
        }

        let dropped = self.shared.packets.clear();
        let generation = self.shared.bump_generation();
        if self.shared.paused.load(Ordering::Acquire) {
            // 暂停中也要把新位置的第一帧显示出来
            self.shared.seeking_while_paused.store(true, Ordering::Release);
            self.shared.wake();
        }
        info!(
            "{} ⏩ 不连续点: 目标 {}，代次 {}，丢弃 {} 个旧包{}",
            log_ctx(),
            target,
            generation,
            dropped,
            if reset { "（重置解码器）" } else { "" }
        );

        let flush = PacketItem::Flush {
            generation,
            target,
            reset,
        };
        if let PushOutcome::Interrupted = self.shared.packets.push(flush) {
            debug!("{} Flush 标记入队时被中断", log_ctx());
        }
    }

    /// 推入一个视频包；返回 false 表示线程应退出
    fn push_unit(&mut self, unit: CompressedUnit) -> bool {
        let mut item = PacketItem::Unit(unit);
        loop {
            match self.shared.packets.push(item) {
                PushOutcome::Pushed => {
                    self.unit_count += 1;
                    if self.unit_count <= 5 || self.unit_count % 500 == 0 {
                        debug!("{} 📦 视频包 #{}", log_ctx(), self.unit_count);
                    }
                    return true;
                }
                PushOutcome::Interrupted => return false,
                PushOutcome::Notified(back) => {
                    // 等待期间来了 Seek / 重置：手上的包属于旧位置，直接丢弃
                    if let Control::Discontinuity = self.handle_control() {
                        return true;
                    }
                    item = back;
                }
            }
        }
    }

    /// 流结束：循环播放时回到起点继续读；否则通知解码端排空，
    /// 然后等待 Seek / 重置再继续读。返回 false 表示线程应退出
    fn handle_end_of_stream(&mut self) -> bool {
        let looping =
            self.shared.loop_enabled.load(Ordering::Acquire) && self.source.is_seekable();

        let mut item = if looping {
            let start = self.stream.start_time;
            info!("{} 🔁 循环播放，回到起点 {}", log_ctx(), start);
            if let Err(e) = self.source.seek(start) {
                error!("{} ❌ 回到起点失败: {}", log_ctx(), e);
                return false;
            }
            PacketItem::Restart { target: start }
        } else {
            info!("{} 📄 到达流末尾", log_ctx());
            PacketItem::EndOfStream
        };

        loop {
            match self.shared.packets.push(item) {
                PushOutcome::Pushed => break,
                PushOutcome::Interrupted => return false,
                PushOutcome::Notified(back) => {
                    // 末尾处收到 Seek：处理后继续读包
                    if let Control::Discontinuity = self.handle_control() {
                        return true;
                    }
                    item = back;
                }
            }
        }

        looping || self.wait_for_control()
    }

    /// 流已读完：空闲到下一个 Seek / 重置；被中断时返回 false
    fn wait_for_control(&mut self) -> bool {
        debug!("{} 💤 流已读完，等待 Seek / 重置", log_ctx());
        loop {
            if let Control::Discontinuity = self.handle_control() {
                return true;
            }
            if !self.shared.packets.wait_notified() {
                return false;
            }
        }
    }
}
