use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};
use myy_decoder::{DecoderConfig, DecoderListener, MediaSource, PlaybackManager};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 监听器事件，转发到主线程
#[derive(Debug)]
enum Event {
    Loaded,
    Position(i64, i64, i64),
    Released,
    Closed,
    Finished,
}

struct ChannelListener(Sender<Event>);

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

struct Args {
    input: String,
    frames: Option<usize>,
    config: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut frames = None;
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args.next().context("--frames 需要一个数值")?;
                frames = Some(value.parse().context("--frames 不是有效数字")?);
            }
            "--config" => config = Some(args.next().context("--config 需要一个路径")?),
            _ if input.is_none() => input = Some(arg),
            other => bail!("无法识别的参数: {}", other),
        }
    }
    let Some(input) = input else {
        bail!("用法: myy_decoder <文件|URL|camera|desktop> [--frames N] [--config 配置.json]");
    };
    Ok(Args { input, frames, config })
}

fn drain_events(events: &Receiver<Event>) -> bool {
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Position(start, current, end) => {
                log::debug!("位置 {} / [{}, {}]", current, start, end)
            }
            Event::Finished => {
                info!("🏁 收到播放结束事件");
                finished = true;
            }
            other => info!("📣 {:?}", other),
        }
    }
    finished
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = parse_args()?;

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let config = match &args.config {
        Some(path) => DecoderConfig::load(path).context("加载配置失败")?,
        None => DecoderConfig::default(),
    };

    let source = match args.input.as_str() {
        "camera" => MediaSource::Camera,
        "desktop" => MediaSource::Desktop,
        other => MediaSource::parse(other),
    };

    let (tx, events) = unbounded();
    let mut manager = PlaybackManager::new(config);
    manager.set_listener(Arc::new(ChannelListener(tx)));

    let stream = manager.open(source)?;
    info!(
        "🎬 {} | {}x{} {}，时长 {}ms，硬件加速: {}，循环: {}",
        manager.source_description().unwrap_or_default(),
        stream.width,
        stream.height,
        stream.codec_name,
        stream.ticks_to_ms(stream.duration),
        manager.is_hardware_accelerated(),
        manager.is_loop_enabled()
    );

    manager.play(false)?;
    let presenter = manager.presenter();
    let started = Instant::now();
    let mut presented = 0usize;

    loop {
        if drain_events(&events) {
            break;
        }
        if args.frames.is_some_and(|limit| presented >= limit) {
            break;
        }
        if presenter.has_frame_ready() {
            match presenter.current_frame() {
                Ok(frame) => {
                    presented += 1;
                    if presented <= 3 || presented % 100 == 0 {
                        info!(
                            "🖼️ 帧 #{} pts {} {}x{} {:?} {} 字节",
                            presented,
                            frame.pts,
                            frame.width,
                            frame.height,
                            frame.format,
                            frame.data.len()
                        );
                    }
                    presenter.acknowledge_frame(frame.generation);
                }
                Err(e) => warn!("⚠️ 取帧失败: {}", e),
            }
        } else {
            thread::sleep(Duration::from_millis(2));
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        "📊 显示 {} 帧，用时 {:.2}s（{:.1} fps）",
        presented,
        elapsed,
        presented as f64 / elapsed.max(0.001)
    );

    manager.close();
    drain_events(&events);
    Ok(())
}
