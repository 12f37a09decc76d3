use crate::core::{
    BufferStatus, DecoderConfig, DecoderListener, FrameFormat, FrameRenderingData, PlaybackState,
    PlayerError, Result, StreamContext,
};
#[cfg(feature = "ffmpeg")]
use crate::core::MediaSource;
use crate::player::control::SharedState;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::demuxer_thread::DemuxerThread;
use crate::player::display_thread::DisplayThread;
use crate::player::frame_decoder::FrameDecoder;
use crate::player::log_ctx;
use crate::player::presenter::FramePresenter;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// 已打开但尚未开始播放的资源
struct Session {
    // 释放顺序：解码器先于数据源
    decoder: Option<Box<dyn FrameDecoder>>,
    source: Option<Box<dyn DemuxerSource>>,
    stream: StreamContext,
    description: String,
}

/// 播放管理器 - 整体控制播放流程
///
/// 生命周期：Closed → Opening → Opened → Playing ⇄ Paused → Closing → Closed。
/// 控制方法在控制线程上调用；显示层通过 [`FramePresenter`] 并发访问帧。
pub struct PlaybackManager {
    config: DecoderConfig,
    shared: Arc<SharedState>,
    state: Mutex<PlaybackState>,
    session: Option<Session>,
    demuxer_thread: Option<DemuxerThread>,
    display_thread: Option<DisplayThread>,
}

impl PlaybackManager {
    pub fn new(config: DecoderConfig) -> Self {
        info!("{} 🎮 创建播放管理器...", log_ctx());
        Self {
            shared: Arc::new(SharedState::new(&config)),
            config,
            state: Mutex::new(PlaybackState::Closed),
            session: None,
            demuxer_thread: None,
            display_thread: None,
        }
    }

    pub fn set_listener(&self, listener: Arc<dyn DecoderListener>) {
        self.shared.set_listener(listener);
    }

    /// 设置显示像素格式；下次打开时生效
    pub fn set_frame_format(&mut self, format: FrameFormat, allow_direct_hw_frames: bool) {
        self.config.frame_format = format;
        self.config.allow_direct_hw_frames = allow_direct_hw_frames;
    }

    /// 循环播放开关，播放中也立即生效
    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.config.loop_enabled = enabled;
        self.shared.loop_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.shared.loop_enabled.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    // ==================== 打开 ====================

    #[cfg(feature = "ffmpeg")]
    pub fn open_file(&mut self, path: impl Into<std::path::PathBuf>) -> Result<StreamContext> {
        self.open(MediaSource::LocalFile(path.into()))
    }

    #[cfg(feature = "ffmpeg")]
    pub fn open_url(&mut self, url: &str) -> Result<StreamContext> {
        self.open(MediaSource::NetworkStream(url.to_string()))
    }

    #[cfg(feature = "ffmpeg")]
    pub fn open_camera(&mut self) -> Result<StreamContext> {
        self.open(MediaSource::Camera)
    }

    #[cfg(feature = "ffmpeg")]
    pub fn open_desktop(&mut self) -> Result<StreamContext> {
        self.open(MediaSource::Desktop)
    }

    /// 用 FFmpeg 打开媒体源
    #[cfg(feature = "ffmpeg")]
    pub fn open(&mut self, source: MediaSource) -> Result<StreamContext> {
        use crate::player::{Demuxer, VideoDecoder};

        self.begin_open()?;
        let config = self.config.clone();
        let opened = Demuxer::open(&source, &config).and_then(|demuxer| {
            let decoder = VideoDecoder::open(demuxer.codec_parameters(), &config)?;
            Ok((demuxer, decoder))
        });

        match opened {
            Ok((demuxer, decoder)) => self.install(Box::new(demuxer), Box::new(decoder)),
            Err(e) => {
                error!("{} ❌ 打开失败: {}", log_ctx(), e);
                *self.state.lock() = PlaybackState::Closed;
                Err(e)
            }
        }
    }

    /// 挂接已经打开的数据源和解码器
    pub fn attach(
        &mut self,
        source: Box<dyn DemuxerSource>,
        decoder: Box<dyn FrameDecoder>,
    ) -> Result<StreamContext> {
        self.begin_open()?;
        self.install(source, decoder)
    }

    fn begin_open(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != PlaybackState::Closed {
            return Err(PlayerError::InvalidState {
                operation: "open",
                state: state.as_str(),
            });
        }
        *state = PlaybackState::Opening;
        Ok(())
    }

    fn install(
        &mut self,
        source: Box<dyn DemuxerSource>,
        decoder: Box<dyn FrameDecoder>,
    ) -> Result<StreamContext> {
        let stream = source.stream_context().clone();
        if stream.width <= 0 || stream.height <= 0 {
            *self.state.lock() = PlaybackState::Closed;
            drop(decoder);
            drop(source);
            return Err(PlayerError::UnsupportedResolution {
                width: stream.width,
                height: stream.height,
            });
        }

        self.shared.reset_session();
        self.shared.bump_generation();
        self.shared.set_stream(Some(stream.clone()));
        self.shared.clock.pause();
        self.shared.clock.set_time(stream.ticks_to_ms(stream.start_time));
        self.shared.current_time.store(stream.start_time, Ordering::Release);

        self.shared
            .hardware_accelerated
            .store(decoder.is_hardware_accelerated(), Ordering::Release);
        let description = source.description();
        info!(
            "{} ✅ 已打开: {} ({}, {}x{}, {})",
            log_ctx(),
            description,
            stream.codec_name,
            stream.width,
            stream.height,
            decoder.description()
        );

        self.session = Some(Session {
            decoder: Some(decoder),
            source: Some(source),
            stream: stream.clone(),
            description,
        });
        *self.state.lock() = PlaybackState::Opened;

        let listener = self.shared.listener();
        listener.file_loaded();
        listener.changed_frame_position(stream.start_time, stream.start_time, stream.end_time());
        Ok(stream)
    }

    // ==================== 播放控制 ====================

    /// 启动工作线程；`paused` 为 true 时停在第一帧
    pub fn play(&mut self, paused: bool) -> Result<()> {
        let current = *self.state.lock();
        match current {
            PlaybackState::Opened => {}
            PlaybackState::Playing | PlaybackState::Paused => {
                if paused {
                    self.pause();
                } else {
                    self.resume();
                }
                return Ok(());
            }
            other => {
                return Err(PlayerError::InvalidState {
                    operation: "play",
                    state: other.as_str(),
                })
            }
        }

        let session = self.session.as_mut().ok_or(PlayerError::InvalidState {
            operation: "play",
            state: current.as_str(),
        })?;
        let (Some(source), Some(decoder)) = (session.source.take(), session.decoder.take()) else {
            return Err(PlayerError::InvalidState {
                operation: "play",
                state: current.as_str(),
            });
        };
        let stream = session.stream.clone();

        self.shared.paused.store(paused, Ordering::Release);
        // 暂停启动时仍放行第一帧
        self.shared.seeking_while_paused.store(paused, Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);
        if !paused {
            self.shared.clock.resume();
        }

        self.demuxer_thread = Some(DemuxerThread::start(source, decoder, self.shared.clone()));
        self.display_thread = Some(DisplayThread::start(self.shared.clone(), stream));

        *self.state.lock() = if paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        info!("{} 🎬 播放{}", log_ctx(), if paused { "（暂停在首帧）" } else { "" });
        Ok(())
    }

    /// 暂停播放
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if *state != PlaybackState::Playing {
            debug!("{} 当前状态 {} 无需暂停", log_ctx(), state.as_str());
            return;
        }
        info!("{} ⏸️ 暂停", log_ctx());
        self.shared.paused.store(true, Ordering::Release);
        self.shared.clock.pause();
        *state = PlaybackState::Paused;
    }

    /// 恢复播放（暂停时长不计入时钟）
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if *state != PlaybackState::Paused {
            debug!("{} 当前状态 {} 无需恢复", log_ctx(), state.as_str());
            return;
        }
        info!("{} ▶️ 恢复", log_ctx());
        self.shared.seeking_while_paused.store(false, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        self.shared.clock.resume();
        self.shared.wake();
        *state = PlaybackState::Playing;
    }

    /// Seek 到指定时间戳（流时间基单位）
    ///
    /// 只有本地文件可以 Seek。请求只写入单槽，连续请求会合并成最后一个；
    /// 开始播放前发出的请求在解封装线程启动时处理。
    pub fn seek_by_time(&self, timestamp: i64) -> Result<()> {
        let stream = self.require_stream("seek")?;
        if !stream.is_file {
            warn!("{} ⚠️ 非文件源不支持 Seek", log_ctx());
            return Err(PlayerError::NotSeekable);
        }
        self.require_parse_worker("seek")?;

        let target = if stream.duration > 0 {
            timestamp.clamp(stream.start_time, stream.end_time())
        } else {
            timestamp.max(stream.start_time)
        };

        let was_empty = self.shared.pending_seek.post(target);
        if was_empty && self.demuxer_thread.is_some() {
            self.shared.packets.notify();
        }
        info!("{} 🎯 Seek 请求: {}{}", log_ctx(), target, if was_empty { "" } else { "（合并）" });
        Ok(())
    }

    /// 按百分比 Seek（0.0 ~ 1.0）
    pub fn seek_by_percent(&self, percent: f64) -> Result<()> {
        let stream = self.require_stream("seek")?;
        self.seek_by_time(stream.position_at(percent.clamp(0.0, 1.0)))
    }

    /// 视频重置：在当前位置重建解码器，重新协商硬件加速
    pub fn reset(&self) -> Result<()> {
        self.require_stream("reset")?;
        self.require_parse_worker("reset")?;
        let position = self.shared.current_time.load(Ordering::Acquire);
        self.shared.video_resetting.store(true, Ordering::Release);
        if self.shared.pending_reset.post(position) && self.demuxer_thread.is_some() {
            self.shared.packets.notify();
        }
        info!("{} 🔄 视频重置请求: {}", log_ctx(), position);
        Ok(())
    }

    /// 关闭：中断所有线程并释放资源
    pub fn close(&mut self) {
        {
            let mut state = self.state.lock();
            if *state == PlaybackState::Closed {
                return;
            }
            *state = PlaybackState::Closing;
        }
        info!("{} ⏹️ 关闭", log_ctx());

        let started = self.demuxer_thread.is_some();
        self.shared.interrupt();

        // 解封装线程负责回收解码线程
        if let Some(mut demuxer_thread) = self.demuxer_thread.take() {
            demuxer_thread.join();
            info!("{} ✅ 解封装/解码线程已结束", log_ctx());
        }
        if let Some(mut display_thread) = self.display_thread.take() {
            display_thread.join();
            info!("{} ✅ 显示线程已结束", log_ctx());
        }

        let packets = self.shared.packets.clear();
        let frames = self.shared.frames.clear();
        if packets > 0 || frames > 0 {
            info!("{} 🗑️ 清空队列: {} 个包, {} 帧", log_ctx(), packets, frames);
        }

        let had_source = self.session.take().is_some();
        self.shared.playing.store(false, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        self.shared.video_resetting.store(false, Ordering::Release);
        self.shared.seeking_while_paused.store(false, Ordering::Release);
        self.shared.pending_seek.clear();
        self.shared.pending_reset.clear();
        self.shared.set_stream(None);
        self.shared.clock.pause();
        *self.state.lock() = PlaybackState::Closed;

        let listener = self.shared.listener();
        if had_source {
            listener.file_released();
        }
        listener.decoder_closed();
        if started && !self.shared.finished_reported.swap(true, Ordering::AcqRel) {
            listener.playing_finished();
        }
        info!("{} ✅ 关闭完成", log_ctx());
    }

    // ==================== 显示层接口 ====================

    pub fn presenter(&self) -> FramePresenter {
        FramePresenter::new(self.shared.clone())
    }

    pub fn has_frame_ready(&self) -> bool {
        self.presenter().has_frame_ready()
    }

    pub fn current_frame(&self) -> Result<FrameRenderingData> {
        self.presenter().current_frame()
    }

    pub fn acknowledge_frame(&self, generation: u32) -> bool {
        self.shared.frames.acknowledge(generation)
    }

    // ==================== 状态查询 ====================

    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn generation(&self) -> u32 {
        self.shared.generation.current()
    }

    /// 最近提交显示的帧位置（流时间基单位）
    pub fn position(&self) -> i64 {
        self.shared.current_time.load(Ordering::Acquire)
    }

    pub fn clock_ms(&self) -> i64 {
        self.shared.clock.now()
    }

    pub fn is_seeking(&self) -> bool {
        self.shared.pending_seek.is_pending()
    }

    pub fn is_resetting(&self) -> bool {
        self.shared.video_resetting.load(Ordering::Acquire)
    }

    pub fn is_hardware_accelerated(&self) -> bool {
        self.session.is_some() && self.shared.hardware_accelerated.load(Ordering::Acquire)
    }

    pub fn stream_context(&self) -> Option<StreamContext> {
        self.shared.stream()
    }

    pub fn source_description(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.description.clone())
    }

    pub fn buffer_status(&self) -> BufferStatus {
        BufferStatus {
            video_packets: self.shared.packets.len(),
            video_frames: self.shared.frames.len(),
        }
    }

    /// 解封装线程已退出时请求不会被处理，直接拒绝；尚未开始播放时请求留到启动后处理
    fn require_parse_worker(&self, operation: &'static str) -> Result<()> {
        if self.demuxer_thread.as_ref().is_some_and(|t| !t.is_running()) {
            warn!("{} ⚠️ 解封装线程已停止，拒绝 {}", log_ctx(), operation);
            return Err(PlayerError::InvalidState {
                operation,
                state: "Stopped",
            });
        }
        Ok(())
    }

    fn require_stream(&self, operation: &'static str) -> Result<StreamContext> {
        self.session
            .as_ref()
            .map(|s| s.stream.clone())
            .ok_or_else(|| PlayerError::InvalidState {
                operation,
                state: self.state().as_str(),
            })
    }
}

impl Default for PlaybackManager {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.close();
    }
}
