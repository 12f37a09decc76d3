mod common;

use common::*;
use crossbeam_channel::Receiver;
use myy_decoder::{DecoderConfig, PlaybackManager, PlaybackState, PlayerError};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

fn open(source: ScriptedSource, decoder: ScriptedDecoder, config: DecoderConfig) -> (PlaybackManager, Receiver<Event>) {
    let mut manager = PlaybackManager::new(config);
    let rx = listen(&manager);
    manager
        .attach(Box::new(source), Box::new(decoder))
        .expect("attach");
    (manager, rx)
}

/// 一直取帧直到收到播放结束事件
fn collect_until_finished(manager: &PlaybackManager, rx: &Receiver<Event>) -> (Vec<i64>, Vec<Event>) {
    let mut pts = Vec::new();
    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        seen.extend(events(rx));
        if count_finished(&seen) > 0 {
            break;
        }
        if manager.has_frame_ready() {
            if let Ok(frame) = manager.current_frame() {
                pts.push(frame.pts);
                manager.acknowledge_frame(frame.generation);
            }
        } else {
            thread::sleep(Duration::from_millis(1));
        }
    }
    (pts, seen)
}

#[test]
fn open_reports_loaded_and_initial_position() {
    let (manager, rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    assert_eq!(manager.state(), PlaybackState::Opened);
    assert_eq!(events(&rx), vec![Event::Loaded, Event::Position(0, 0, 10_000)]);

    let stream = manager.stream_context().unwrap();
    assert_eq!(stream.end_time(), 10_000);
    assert_eq!(manager.position(), 0);
    assert!(!manager.has_frame_ready());
}

#[test]
fn open_rejected_unless_closed() {
    let (mut manager, _rx) = open(ScriptedSource::new(10), ScriptedDecoder::new(), unsynced_config());
    let second = manager.attach(Box::new(ScriptedSource::new(10)), Box::new(ScriptedDecoder::new()));
    assert!(matches!(second, Err(PlayerError::InvalidState { operation: "open", .. })));

    manager.close();
    assert_eq!(manager.state(), PlaybackState::Closed);
    assert!(manager
        .attach(Box::new(ScriptedSource::new(10)), Box::new(ScriptedDecoder::new()))
        .is_ok());
}

#[test]
fn zero_resolution_fails_without_events() {
    let mut manager = PlaybackManager::new(unsynced_config());
    let rx = listen(&manager);
    let result = manager.attach(
        Box::new(ScriptedSource::new(10).with_size(0, 480)),
        Box::new(ScriptedDecoder::new()),
    );
    assert!(matches!(result, Err(PlayerError::UnsupportedResolution { width: 0, height: 480 })));
    assert_eq!(manager.state(), PlaybackState::Closed);
    assert!(events(&rx).is_empty());
    assert!(manager.play(false).is_err());
}

#[test]
fn frames_arrive_in_order_and_skip_other_streams() {
    let (mut manager, rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();
    assert_eq!(manager.state(), PlaybackState::Playing);

    let mut frames = Vec::new();
    for _ in 0..20 {
        frames.push(next_frame(&manager).expect("frame"));
    }
    let generation = frames[0].0;
    assert!(frames.iter().all(|(g, _)| *g == generation));
    let pts: Vec<i64> = frames.iter().map(|(_, pts)| *pts).collect();
    assert_eq!(pts, (0..20).map(|i| i * FRAME_STEP).collect::<Vec<_>>());

    let positions = events(&rx)
        .into_iter()
        .filter(|e| matches!(e, Event::Position(..)))
        .count();
    assert!(positions >= 20);
}

#[test]
fn snapshot_has_buffer_and_default_aspect() {
    let (mut manager, _rx) = open(ScriptedSource::new(50), ScriptedDecoder::new(), unsynced_config());
    assert!(matches!(manager.current_frame(), Err(PlayerError::NoFrameReady)));
    manager.play(false).unwrap();

    assert!(wait_for(Duration::from_secs(5), || manager.has_frame_ready()));
    let frame = manager.current_frame().unwrap();
    assert_eq!((frame.width, frame.height), (4, 2));
    assert_eq!(frame.data.len(), 32);
    assert_eq!((frame.aspect_num, frame.aspect_den), (1, 1));
    assert!(manager.acknowledge_frame(frame.generation));
}

#[test]
fn seek_by_percent_moves_to_target_in_new_generation() {
    let source = ScriptedSource::new(250);
    let seeks = source.seeks.clone();
    let (mut manager, _rx) = open(source, ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();

    let (before, _) = next_frame(&manager).unwrap();
    manager.seek_by_percent(0.5).unwrap();

    let mut after = None;
    for _ in 0..300 {
        let (generation, pts) = next_frame(&manager).expect("frame");
        if generation > before {
            after = Some(pts);
            break;
        }
    }
    let pts = after.expect("new generation frame");
    assert!(pts >= 5_000, "first frame after seek at {}", pts);
    assert_eq!(*seeks.lock(), vec![5_000]);
    assert!(manager.generation() > before);
}

#[test]
fn seeks_before_play_coalesce_into_one() {
    let source = ScriptedSource::new(250);
    let seeks = source.seeks.clone();
    let (mut manager, _rx) = open(source, ScriptedDecoder::new(), unsynced_config());

    manager.seek_by_time(1_000).unwrap();
    manager.seek_by_time(2_000).unwrap();
    assert!(manager.is_seeking());
    manager.play(false).unwrap();

    let (_, pts) = next_frame(&manager).unwrap();
    assert_eq!(pts, 2_000);
    assert_eq!(*seeks.lock(), vec![2_000]);
    assert!(!manager.is_seeking());
}

#[test]
fn seek_is_clamped_to_stream_range() {
    let source = ScriptedSource::new(250);
    let seeks = source.seeks.clone();
    let (mut manager, _rx) = open(source, ScriptedDecoder::new(), unsynced_config());
    manager.seek_by_time(-500).unwrap();
    manager.play(false).unwrap();
    next_frame(&manager).unwrap();
    assert_eq!(*seeks.lock(), vec![0]);
}

#[test]
fn live_source_is_not_seekable() {
    let source = ScriptedSource::new(50).live();
    let seeks = source.seeks.clone();
    let (mut manager, _rx) = open(source, ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();

    assert!(matches!(manager.seek_by_time(100), Err(PlayerError::NotSeekable)));
    assert!(matches!(manager.seek_by_percent(0.5), Err(PlayerError::NotSeekable)));
    next_frame(&manager).unwrap();
    assert!(seeks.lock().is_empty());
}

#[test]
fn end_of_stream_reports_finished_once() {
    let (mut manager, rx) = open(ScriptedSource::new(10), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();

    let (pts, mut seen) = collect_until_finished(&manager, &rx);
    assert_eq!(pts.len(), 10);
    assert_eq!(count_finished(&seen), 1);
    assert!(!manager.has_frame_ready());

    manager.close();
    seen.extend(events(&rx));
    assert_eq!(count_finished(&seen), 1);
    assert!(seen.contains(&Event::Released));
    assert!(seen.contains(&Event::Closed));
}

#[test]
fn loop_restarts_at_start_without_finishing() {
    let mut config = unsynced_config();
    config.loop_enabled = true;
    let (mut manager, rx) = open(ScriptedSource::new(10), ScriptedDecoder::new(), config);
    manager.play(false).unwrap();

    let (first_generation, first_pts) = next_frame(&manager).unwrap();
    let mut first_pass = vec![first_pts];
    let mut restarted = false;
    for _ in 0..100 {
        let (generation, pts) = next_frame(&manager).expect("frame");
        if generation > first_generation {
            assert_eq!(pts, 0);
            restarted = true;
            break;
        }
        first_pass.push(pts);
    }
    // 第一轮的帧全部播完才回到起点
    let expected: Vec<i64> = (0..10).map(|i| i * FRAME_STEP).collect();
    assert_eq!(first_pass, expected);
    assert!(restarted);
    assert_eq!(count_finished(&events(&rx)), 0);
    assert_eq!(manager.state(), PlaybackState::Playing);
}

#[test]
fn corrupt_unit_is_dropped_and_playback_continues() {
    let source = ScriptedSource::new(10).corrupt(3);
    let (mut manager, rx) = open(source, ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();

    let (pts, seen) = collect_until_finished(&manager, &rx);
    assert_eq!(count_finished(&seen), 1);
    assert_eq!(pts.len(), 9);
    assert!(!pts.contains(&(3 * FRAME_STEP)));
}

#[test]
fn software_decoder_still_delivers_frames() {
    let (mut manager, _rx) = open(ScriptedSource::new(20), ScriptedDecoder::new(), unsynced_config());
    assert!(!manager.is_hardware_accelerated());
    manager.play(false).unwrap();
    assert!(next_frame(&manager).is_some());

    let (hw_manager, _rx) = open(ScriptedSource::new(20), ScriptedDecoder::new().hardware(), unsynced_config());
    assert!(hw_manager.is_hardware_accelerated());
}

#[test]
fn close_with_full_queues_returns_and_releases_surfaces() {
    let config = DecoderConfig {
        packet_queue_capacity: 2,
        frame_queue_capacity: 2,
        ..unsynced_config()
    };
    let decoder = ScriptedDecoder::new().with_surfaces();
    let stats = decoder.stats.clone();
    let (mut manager, rx) = open(ScriptedSource::new(200), decoder, config);
    manager.play(false).unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        let status = manager.buffer_status();
        status.video_frames == 2 && status.video_packets == 2
    }));

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let closer = thread::spawn(move || {
        manager.close();
        let _ = done_tx.send(manager.buffer_status());
    });
    let status = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("close did not return");
    closer.join().unwrap();

    assert_eq!(status.video_frames, 0);
    assert_eq!(status.video_packets, 0);
    let created = stats.surfaces_created.load(Ordering::SeqCst);
    assert!(created > 0);
    assert_eq!(created, stats.surfaces_released.load(Ordering::SeqCst));

    let seen = events(&rx);
    assert_eq!(count_finished(&seen), 1);
    assert!(seen.contains(&Event::Released));
    assert!(seen.contains(&Event::Closed));
}

#[test]
fn close_before_play_releases_without_finishing() {
    let (mut manager, rx) = open(ScriptedSource::new(10), ScriptedDecoder::new(), unsynced_config());
    events(&rx);
    manager.close();
    assert_eq!(events(&rx), vec![Event::Released, Event::Closed]);

    // 重复关闭无副作用
    manager.close();
    assert!(events(&rx).is_empty());
}

#[test]
fn reset_rebuilds_decoder_in_new_generation() {
    let decoder = ScriptedDecoder::new();
    let stats = decoder.stats.clone();
    let (mut manager, _rx) = open(ScriptedSource::new(250), decoder, unsynced_config());
    manager.play(false).unwrap();

    let (before, _) = next_frame(&manager).unwrap();
    manager.reset().unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        stats.resets.load(Ordering::SeqCst) == 1 && !manager.is_resetting()
    }));
    let mut after = None;
    for _ in 0..300 {
        let (generation, _) = next_frame(&manager).expect("frame");
        if generation > before {
            after = Some(generation);
            break;
        }
    }
    assert!(after.is_some());
}

#[test]
fn current_frame_refused_while_resetting() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    // 播放前发出的重置在解封装线程启动后才会处理
    manager.reset().unwrap();
    assert!(manager.is_resetting());
    assert!(matches!(manager.current_frame(), Err(PlayerError::Resetting)));
    assert!(!manager.has_frame_ready());

    manager.play(false).unwrap();
    assert!(next_frame(&manager).is_some());
    assert!(!manager.is_resetting());
}

#[test]
fn stale_acknowledge_is_ignored() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();

    assert!(wait_for(Duration::from_secs(5), || manager.has_frame_ready()));
    let frame = manager.current_frame().unwrap();
    manager.seek_by_time(6_000).unwrap();
    assert!(wait_for(Duration::from_secs(5), || manager.generation() > frame.generation));
    assert!(!manager.acknowledge_frame(frame.generation));
}

#[test]
fn pause_freezes_clock_and_resume_continues() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();
    next_frame(&manager).unwrap();

    manager.pause();
    assert_eq!(manager.state(), PlaybackState::Paused);
    let frozen = manager.clock_ms();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(manager.clock_ms(), frozen);

    manager.resume();
    assert_eq!(manager.state(), PlaybackState::Playing);
    assert!(wait_for(Duration::from_secs(2), || manager.clock_ms() > frozen));
    assert!(next_frame(&manager).is_some());
}

#[test]
fn paused_start_shows_first_frame_then_holds() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    manager.play(true).unwrap();
    assert_eq!(manager.state(), PlaybackState::Paused);

    let (_, pts) = next_frame(&manager).expect("first frame");
    assert_eq!(pts, 0);
    thread::sleep(Duration::from_millis(100));
    assert!(!manager.has_frame_ready());
}

#[test]
fn seek_while_paused_updates_picture() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    manager.play(true).unwrap();
    let (before, _) = next_frame(&manager).unwrap();

    manager.seek_by_time(2_000).unwrap();
    let (generation, pts) = next_frame(&manager).expect("frame at new position");
    assert!(generation > before);
    assert_eq!(pts, 2_000);
    assert_eq!(manager.clock_ms(), 2_000);
    assert_eq!(manager.state(), PlaybackState::Paused);
}

#[test]
fn clock_paces_frames_when_synced() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), DecoderConfig::default());
    manager.play(false).unwrap();

    let started = Instant::now();
    for _ in 0..5 {
        next_frame(&manager).expect("frame");
    }
    // 第一帧立即到期，之后每帧间隔 40ms
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[test]
fn presenter_works_from_another_thread() {
    let (mut manager, _rx) = open(ScriptedSource::new(250), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();
    let presenter = manager.presenter();

    let renderer = thread::spawn(move || {
        let mut shown = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while shown < 10 && Instant::now() < deadline {
            if presenter.has_frame_ready() {
                if let Ok(frame) = presenter.current_frame() {
                    presenter.acknowledge_frame(frame.generation);
                    shown += 1;
                }
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        shown
    });
    assert_eq!(renderer.join().unwrap(), 10);
    manager.close();
}

#[test]
fn seek_after_stream_fully_read_starts_new_pass() {
    let (mut manager, rx) = open(ScriptedSource::new(20), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();
    let (before, _) = next_frame(&manager).unwrap();
    // 20 个包远少于队列容量，解封装线程很快读到流末尾
    thread::sleep(Duration::from_millis(200));

    manager.seek_by_time(0).unwrap();
    let mut restarted = None;
    for _ in 0..40 {
        let (generation, pts) = next_frame(&manager).expect("frame");
        if generation > before {
            restarted = Some(pts);
            break;
        }
    }
    assert_eq!(restarted, Some(0));
    assert!(!manager.is_seeking());
    assert_eq!(count_finished(&events(&rx)), 0);

    let (pts, seen) = collect_until_finished(&manager, &rx);
    let expected: Vec<i64> = (1..20).map(|i| i * FRAME_STEP).collect();
    assert_eq!(pts, expected);
    assert_eq!(count_finished(&seen), 1);
}

#[test]
fn reset_after_stream_fully_read_recovers() {
    let decoder = ScriptedDecoder::new();
    let stats = decoder.stats.clone();
    let (mut manager, rx) = open(ScriptedSource::new(20), decoder, unsynced_config());
    manager.play(false).unwrap();
    let (before, _) = next_frame(&manager).unwrap();
    thread::sleep(Duration::from_millis(200));

    manager.reset().unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        stats.resets.load(Ordering::SeqCst) == 1 && !manager.is_resetting()
    }));
    let (generation, _) = next_frame(&manager).expect("frame after reset");
    assert!(generation > before);

    let (_, seen) = collect_until_finished(&manager, &rx);
    assert_eq!(count_finished(&seen), 1);
    assert!(!manager.is_resetting());
}

#[test]
fn seek_after_finished_plays_to_end_again() {
    let (mut manager, rx) = open(ScriptedSource::new(10), ScriptedDecoder::new(), unsynced_config());
    manager.play(false).unwrap();
    let (_, first) = collect_until_finished(&manager, &rx);
    assert_eq!(count_finished(&first), 1);
    let finished_generation = manager.generation();

    manager.seek_by_time(5 * FRAME_STEP).unwrap();
    let (generation, pts) = next_frame(&manager).expect("frame after seek");
    assert!(generation > finished_generation);
    assert_eq!(pts, 5 * FRAME_STEP);

    let (rest, second) = collect_until_finished(&manager, &rx);
    let expected: Vec<i64> = (6..10).map(|i| i * FRAME_STEP).collect();
    assert_eq!(rest, expected);
    assert_eq!(count_finished(&second), 1);
    assert_eq!(manager.state(), PlaybackState::Playing);

    // 这一轮已经上报过，关闭时不再重复
    manager.close();
    assert_eq!(count_finished(&events(&rx)), 0);
}
