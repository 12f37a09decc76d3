// 播放器核心模块

pub mod control;
pub mod decode_thread;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod demuxer_thread; // 解封装线程
pub mod display_thread;
pub mod frame_decoder; // 解码器抽象接口
pub mod frame_queue;
pub mod manager;
pub mod packet_queue;
pub mod presenter;
pub mod source_io;

#[cfg(feature = "ffmpeg")]
pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod demuxer;
#[cfg(feature = "ffmpeg")]
pub mod hw_accel;

pub use demuxer_source::DemuxerSource;
pub use frame_decoder::FrameDecoder;
pub use manager::PlaybackManager;
pub use presenter::FramePresenter;

#[cfg(feature = "ffmpeg")]
pub use decoder::VideoDecoder;
#[cfg(feature = "ffmpeg")]
pub use demuxer::Demuxer;

use std::process;
use std::thread;

pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}
