//! 硬件加速协商
//!
//! 打开解码器前调用 [`negotiate`]：先设置软解基线参数，
//! 再按平台候选顺序尝试创建硬件设备。成功时在解码上下文上挂一条
//! 协商记录并安装 get_format 回调；失败时丢弃记录，改用多线程快速软解。
//! 解码中途硬件失败不会重试。

use crate::core::{DecoderConfig, HWAccelType, HardwareSurface, PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, ffi, frame};
use log::{debug, info, warn};
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

/// 软解回退时的解码线程数
const SOFTWARE_THREADS: c_int = 2;

/// 挂在 AVCodecContext::opaque 上的协商记录，get_format 回调读取它
struct HwNegotiation {
    hw_format: ffi::AVPixelFormat,
}

/// 硬件设备上下文（AVBufferRef 的 RAII 包装）
struct HwDeviceCtx {
    ptr: *mut ffi::AVBufferRef,
}

impl HwDeviceCtx {
    fn create(device_type: ffi::AVHWDeviceType) -> Option<Self> {
        let mut ptr: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(&mut ptr, device_type, ptr::null(), ptr::null_mut(), 0)
        };
        if ret < 0 || ptr.is_null() {
            debug!("硬件设备 {:?} 创建失败: {}", device_type, ffmpeg::Error::from(ret));
            None
        } else {
            Some(Self { ptr })
        }
    }
}

impl Drop for HwDeviceCtx {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ffi::av_buffer_unref(&mut self.ptr) };
        }
    }
}

/// 硬件加速会话：设备引用 + 协商记录
///
/// 必须比持有它的解码上下文活得更久（opaque 指向其中的记录）。
pub struct HwAccel {
    hw_type: HWAccelType,
    _device: HwDeviceCtx,
    negotiation: Box<HwNegotiation>,
}

/// 协商结果
pub enum DecodeBackend {
    Software,
    HardwareAccelerated(HwAccel),
}

// 设备引用只在解码线程里使用
unsafe impl Send for DecodeBackend {}

impl DecodeBackend {
    pub fn is_hardware(&self) -> bool {
        matches!(self, DecodeBackend::HardwareAccelerated(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecodeBackend::Software => "CPU软解",
            DecodeBackend::HardwareAccelerated(hw) => hw.hw_type.name(),
        }
    }

    /// 帧数据是否在显存里
    pub fn is_hw_frame(&self, frame: &frame::Video) -> bool {
        match self {
            DecodeBackend::Software => false,
            DecodeBackend::HardwareAccelerated(hw) => unsafe {
                (*frame.as_ptr()).format == hw.negotiation.hw_format as c_int
            },
        }
    }

    /// 把硬件帧拷回内存
    pub fn transfer(&self, frame: &frame::Video) -> Result<frame::Video> {
        let mut sw_frame = frame::Video::empty();
        let ret = unsafe { ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), frame.as_ptr(), 0) };
        if ret < 0 {
            return Err(PlayerError::HardwareTransfer(ffmpeg::Error::from(ret).to_string()));
        }
        unsafe {
            (*sw_frame.as_mut_ptr()).pts = (*frame.as_ptr()).pts;
            (*sw_frame.as_mut_ptr()).best_effort_timestamp = (*frame.as_ptr()).best_effort_timestamp;
            (*sw_frame.as_mut_ptr()).sample_aspect_ratio = (*frame.as_ptr()).sample_aspect_ratio;
        }
        Ok(sw_frame)
    }
}

/// 直接交给显示层的硬件帧
pub struct HwFrameSurface {
    frame: Option<frame::Video>,
}

// AVFrame 的引用计数是线程安全的
unsafe impl Send for HwFrameSurface {}

impl HwFrameSurface {
    pub fn new(frame: frame::Video) -> Self {
        Self { frame: Some(frame) }
    }
}

impl HardwareSurface for HwFrameSurface {
    fn release(&mut self) {
        if let Some(mut frame) = self.frame.take() {
            unsafe { ffi::av_frame_unref(frame.as_mut_ptr()) };
        }
    }
}

impl Drop for HwFrameSurface {
    fn drop(&mut self) {
        self.release();
    }
}

/// 协商解码后端；必须在打开解码器之前调用
pub fn negotiate(context: &mut codec::context::Context, config: &DecoderConfig) -> DecodeBackend {
    let raw = unsafe { context.as_mut_ptr() };

    // 基线：按编码尺寸分配，单线程
    unsafe {
        (*raw).coded_width = (*raw).width;
        (*raw).coded_height = (*raw).height;
        (*raw).thread_count = 1;
    }

    if !cfg!(feature = "hwaccel") || !config.hw_accel {
        debug!("硬件加速已关闭");
        return software_fallback(raw);
    }

    let Some(codec) = ffmpeg::decoder::find(context.id()) else {
        return software_fallback(raw);
    };

    let candidates = match config.hw_device {
        Some(hw_type) => vec![hw_type],
        None => HWAccelType::platform_candidates(),
    };

    for hw_type in candidates {
        let device_type = device_type(hw_type);
        let Some(hw_format) = (unsafe { find_hw_format(codec.as_ptr(), device_type) }) else {
            debug!("{} 不支持 {}", codec.name(), hw_type.name());
            continue;
        };

        let mut negotiation = Box::new(HwNegotiation { hw_format });
        unsafe {
            (*raw).opaque = &mut *negotiation as *mut HwNegotiation as *mut c_void;
        }

        let Some(device) = HwDeviceCtx::create(device_type) else {
            unsafe { (*raw).opaque = ptr::null_mut() };
            continue;
        };

        unsafe {
            (*raw).hw_device_ctx = ffi::av_buffer_ref(device.ptr);
            (*raw).get_format = Some(negotiate_pixel_format);
        }

        info!("🚀 硬件加速: {} ({:?})", hw_type.name(), hw_format);
        return DecodeBackend::HardwareAccelerated(HwAccel {
            hw_type,
            _device: device,
            negotiation,
        });
    }

    warn!("⚠️ 硬件加速不可用，使用 CPU 软解");
    software_fallback(raw)
}

fn software_fallback(raw: *mut ffi::AVCodecContext) -> DecodeBackend {
    unsafe {
        (*raw).opaque = ptr::null_mut();
        (*raw).thread_count = SOFTWARE_THREADS;
        (*raw).flags2 |= ffi::AV_CODEC_FLAG2_FAST as c_int;
    }
    DecodeBackend::Software
}

fn device_type(hw_type: HWAccelType) -> ffi::AVHWDeviceType {
    use ffi::AVHWDeviceType::*;
    match hw_type {
        HWAccelType::DXVA2 => AV_HWDEVICE_TYPE_DXVA2,
        HWAccelType::D3D11VA => AV_HWDEVICE_TYPE_D3D11VA,
        HWAccelType::VAAPI => AV_HWDEVICE_TYPE_VAAPI,
        HWAccelType::VDPAU => AV_HWDEVICE_TYPE_VDPAU,
        HWAccelType::VideoToolbox => AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
        HWAccelType::CUDA => AV_HWDEVICE_TYPE_CUDA,
        HWAccelType::QSV => AV_HWDEVICE_TYPE_QSV,
    }
}

/// 解码器支持的、通过设备上下文工作的硬件像素格式
unsafe fn find_hw_format(
    codec: *const ffi::AVCodec,
    device_type: ffi::AVHWDeviceType,
) -> Option<ffi::AVPixelFormat> {
    let mut index = 0;
    loop {
        let config = ffi::avcodec_get_hw_config(codec, index);
        if config.is_null() {
            return None;
        }
        let methods = (*config).methods;
        if methods & ffi::AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as c_int != 0
            && (*config).device_type == device_type
        {
            return Some((*config).pix_fmt);
        }
        index += 1;
    }
}

/// 在候选格式里选协商好的硬件格式
pub fn select_hw_format<F: PartialEq + Copy>(candidates: &[F], preferred: F) -> Option<F> {
    candidates.iter().copied().find(|f| *f == preferred)
}

unsafe extern "C" fn negotiate_pixel_format(
    ctx: *mut ffi::AVCodecContext,
    formats: *const ffi::AVPixelFormat,
) -> ffi::AVPixelFormat {
    let negotiation = (*ctx).opaque as *const HwNegotiation;
    if !negotiation.is_null() && !formats.is_null() {
        let mut candidates = Vec::new();
        let mut cursor = formats;
        while *cursor != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
            candidates.push(*cursor);
            cursor = cursor.add(1);
        }
        if let Some(format) = select_hw_format(&candidates, (*negotiation).hw_format) {
            return format;
        }
        warn!("⚠️ 解码器未提供协商的硬件格式，退回默认格式");
    }
    ffi::avcodec_default_get_format(ctx, formats)
}
