#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use myy_decoder::core::{
    CompressedUnit, FrameFormat, HardwareSurface, PlayerError, Result, StreamContext, VideoFrame,
};
use myy_decoder::{DecoderConfig, DecoderListener, DemuxerSource, FrameDecoder, PlaybackManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const FRAME_STEP: i64 = 40;

/// 监听器事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Loaded,
    Position(i64, i64, i64),
    Released,
    Closed,
    Finished,
}

pub struct ChannelListener(pub Sender<Event>);

impl DecoderListener for ChannelListener {
    fn file_loaded(&self) {
        let _ = self.0.send(Event::Loaded);
    }
    fn changed_frame_position(&self, start: i64, current: i64, end: i64) {
        let _ = self.0.send(Event::Position(start, current, end));
    }
    fn file_released(&self) {
        let _ = self.0.send(Event::Released);
    }
    fn decoder_closed(&self) {
        let _ = self.0.send(Event::Closed);
    }
    fn playing_finished(&self) {
        let _ = self.0.send(Event::Finished);
    }
}

pub fn listen(manager: &PlaybackManager) -> Receiver<Event> {
    let (tx, rx) = unbounded();
    manager.set_listener(Arc::new(ChannelListener(tx)));
    rx
}

pub fn events(rx: &Receiver<Event>) -> Vec<Event> {
    rx.try_iter().collect()
}

pub fn count_finished(events: &[Event]) -> usize {
    events.iter().filter(|e| **e == Event::Finished).count()
}

/// 脚本化数据源：视频包 pts = 0, 40, 80 ...，中间穿插一个音频包
pub struct ScriptedSource {
    units: Vec<CompressedUnit>,
    cursor: usize,
    context: StreamContext,
    pub seeks: Arc<Mutex<Vec<i64>>>,
    read_delay: Duration,
}

impl ScriptedSource {
    pub fn new(video_units: usize) -> Self {
        let mut units = Vec::new();
        for i in 0..video_units {
            let pts = i as i64 * FRAME_STEP;
            units.push(CompressedUnit {
                stream_index: 0,
                pts: Some(pts),
                dts: Some(pts),
                duration: FRAME_STEP,
                is_key: i % 10 == 0,
                data: vec![(i % 250) as u8 + 1; 4],
            });
            if i % 3 == 0 {
                units.push(CompressedUnit {
                    stream_index: 1,
                    pts: Some(pts),
                    data: vec![0xAA; 2],
                    ..CompressedUnit::default()
                });
            }
        }
        Self {
            units,
            cursor: 0,
            context: StreamContext {
                stream_index: 0,
                time_base: (1, 1000),
                start_time: 0,
                duration: video_units as i64 * FRAME_STEP,
                width: 4,
                height: 2,
                codec_name: "scripted".to_string(),
                is_file: true,
            },
            seeks: Arc::new(Mutex::new(Vec::new())),
            read_delay: Duration::ZERO,
        }
    }

    pub fn live(mut self) -> Self {
        self.context.is_file = false;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.context.duration = duration;
        self
    }

    pub fn with_size(mut self, width: i32, height: i32) -> Self {
        self.context.width = width;
        self.context.height = height;
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// 把第 n 个视频包替换成无法解码的数据
    pub fn corrupt(mut self, video_index: usize) -> Self {
        let mut seen = 0;
        for unit in self.units.iter_mut().filter(|u| u.stream_index == 0) {
            if seen == video_index {
                unit.data = b"bad".to_vec();
            }
            seen += 1;
        }
        self
    }
}

impl DemuxerSource for ScriptedSource {
    fn read_unit(&mut self) -> Result<Option<CompressedUnit>> {
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }
        let unit = self.units.get(self.cursor).cloned();
        if unit.is_some() {
            self.cursor += 1;
        }
        Ok(unit)
    }

    fn seek(&mut self, timestamp: i64) -> Result<()> {
        self.seeks.lock().push(timestamp);
        self.cursor = self
            .units
            .iter()
            .position(|u| u.stream_index == 0 && u.pts.unwrap_or(0) >= timestamp)
            .unwrap_or(self.units.len());
        Ok(())
    }

    fn stream_context(&self) -> &StreamContext {
        &self.context
    }

    fn description(&self) -> String {
        "scripted".to_string()
    }
}

/// 记录释放次数的硬件帧
pub struct CountingSurface(Arc<AtomicUsize>);

impl HardwareSurface for CountingSurface {
    fn release(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default, Clone)]
pub struct DecoderStats {
    pub resets: Arc<AtomicUsize>,
    pub flushes: Arc<AtomicUsize>,
    pub surfaces_created: Arc<AtomicUsize>,
    pub surfaces_released: Arc<AtomicUsize>,
}

/// 每个数据包解出一帧；数据为 "bad" 时报错
pub struct ScriptedDecoder {
    hardware: bool,
    surfaces: bool,
    pub stats: DecoderStats,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self {
            hardware: false,
            surfaces: false,
            stats: DecoderStats::default(),
        }
    }

    pub fn hardware(mut self) -> Self {
        self.hardware = true;
        self
    }

    pub fn with_surfaces(mut self) -> Self {
        self.surfaces = true;
        self
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&mut self, unit: &CompressedUnit) -> Result<Vec<VideoFrame>> {
        if unit.data == b"bad" {
            return Err(PlayerError::DecodeError("corrupt unit".to_string()));
        }
        let surface = if self.surfaces {
            self.stats.surfaces_created.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(CountingSurface(self.stats.surfaces_released.clone()))
                as Box<dyn HardwareSurface>)
        } else {
            None
        };
        Ok(vec![VideoFrame {
            pts: unit.pts.unwrap_or(0),
            width: 4,
            height: 2,
            format: FrameFormat::Rgba,
            data: Arc::from(vec![unit.data[0]; 32]),
            aspect: (0, 0),
            surface,
        }])
    }

    fn drain(&mut self) -> Result<Vec<VideoFrame>> {
        Ok(Vec::new())
    }

    fn flush(&mut self) {
        self.stats.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&mut self) -> Result<()> {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_hardware_accelerated(&self) -> bool {
        self.hardware
    }

    fn description(&self) -> String {
        "scripted decoder".to_string()
    }
}

/// 不按时钟同步，帧一就绪就可以取
pub fn unsynced_config() -> DecoderConfig {
    DecoderConfig {
        sync_to_clock: false,
        ..DecoderConfig::default()
    }
}

pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// 取下一帧并确认；超时返回 None
pub fn next_frame(manager: &PlaybackManager) -> Option<(u32, i64)> {
    let mut taken = None;
    wait_for(Duration::from_secs(5), || {
        if !manager.has_frame_ready() {
            return false;
        }
        // 两次调用之间代次可能已变化，取不到就继续等
        match manager.current_frame() {
            Ok(frame) => {
                manager.acknowledge_frame(frame.generation);
                taken = Some((frame.generation, frame.pts));
                true
            }
            Err(_) => false,
        }
    });
    taken
}
