//! 播放器解码核心
//!
//! 三级流水线：解封装线程 → 数据包队列 → 解码线程 → 帧队列 → 显示线程，
//! 由 [`PlaybackManager`] 控制生命周期，显示层通过 [`FramePresenter`] 取帧和确认。

pub mod core;
pub mod player;

pub use crate::core::{
    DecoderConfig, DecoderListener, FrameFormat, FrameRenderingData, MediaSource, PlaybackState,
    PlayerError, Result, StreamContext,
};
pub use crate::player::{DemuxerSource, FrameDecoder, FramePresenter, PlaybackManager};
