use crate::core::{PlayerError, Result};
use log::{debug, error};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// 解封装库回调里的 whence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
    /// 只返回总大小，不移动读位置
    Size,
}

impl Whence {
    const SEEK_SET: i32 = 0;
    const SEEK_CUR: i32 = 1;
    const SEEK_END: i32 = 2;
    const AVSEEK_SIZE: i32 = 0x10000;
    const AVSEEK_FORCE: i32 = 0x20000;

    /// 解析 C 回调传入的 whence（忽略 AVSEEK_FORCE 位）
    pub fn from_raw(whence: i32) -> Option<Self> {
        let whence = whence & !Self::AVSEEK_FORCE;
        if whence & Self::AVSEEK_SIZE != 0 {
            return Some(Whence::Size);
        }
        match whence {
            Self::SEEK_SET => Some(Whence::Start),
            Self::SEEK_CUR => Some(Whence::Current),
            Self::SEEK_END => Some(Whence::End),
            _ => None,
        }
    }
}

/// 随机访问字节源 → 拉取式 read/seek 接口
pub struct SourceIo<R> {
    reader: R,
    buffer_size: usize,
}

impl SourceIo<File> {
    /// 打开本地文件；打开失败直接视为打开失败，不重试
    pub fn open(path: &Path, buffer_size: usize) -> Result<Self> {
        if !path.is_file() {
            return Err(PlayerError::OpenError(format!(
                "不是普通文件: {}",
                path.display()
            )));
        }
        let file = File::open(path).map_err(|e| {
            error!("❌ 无法打开文件 {}: {}", path.display(), e);
            PlayerError::OpenError(format!("无法打开文件: {}", e))
        })?;
        Ok(Self::new(file, buffer_size))
    }
}

impl<R: Read + Seek> SourceIo<R> {
    pub fn new(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// 读取数据；返回 0 表示 EOF
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.reader.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        match whence {
            Whence::Start => {
                let offset = u64::try_from(offset)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "负的绝对偏移"))?;
                self.reader.seek(SeekFrom::Start(offset))
            }
            Whence::Current => self.reader.seek(SeekFrom::Current(offset)),
            Whence::End => self.reader.seek(SeekFrom::End(offset)),
            Whence::Size => {
                let current = self.reader.stream_position()?;
                let size = self.reader.seek(SeekFrom::End(0))?;
                self.reader.seek(SeekFrom::Start(current))?;
                Ok(size)
            }
        }
    }

    /// 读一个缓冲块用于格式探测，然后回到文件开头
    pub fn probe(&mut self) -> io::Result<Vec<u8>> {
        let mut block = vec![0u8; self.buffer_size];
        let mut filled = 0;
        while filled < block.len() {
            let n = self.read(&mut block[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        block.truncate(filled);
        self.reader.seek(SeekFrom::Start(0))?;
        debug!("格式探测读取 {} 字节", filled);
        Ok(block)
    }
}

#[cfg(feature = "ffmpeg")]
pub use avio::CustomIo;

#[cfg(feature = "ffmpeg")]
mod avio {
    use super::{SourceIo, Whence};
    use crate::core::{PlayerError, Result};
    use ffmpeg_next::ffi;
    use log::{debug, warn};
    use std::ffi::c_void;
    use std::fs::File;
    use std::os::raw::{c_char, c_int};

    /// 自定义 IO：AVIOContext 读写都转发给 SourceIo
    ///
    /// 必须比使用它的格式上下文活得更久。
    pub struct CustomIo {
        ctx: *mut ffi::AVIOContext,
        source: Box<SourceIo<File>>,
    }

    // AVIOContext 只在持有它的解封装线程里使用
    unsafe impl Send for CustomIo {}

    impl CustomIo {
        pub fn new(source: SourceIo<File>) -> Result<Self> {
            let mut source = Box::new(source);
            let size = source.buffer_size();
            let buffer_len = c_int::try_from(size)
                .map_err(|_| PlayerError::OpenError(format!("IO 缓冲过大: {}", size)))?;
            let opaque = &mut *source as *mut SourceIo<File> as *mut c_void;

            let ctx = unsafe {
                let buffer = ffi::av_malloc(size) as *mut u8;
                if buffer.is_null() {
                    return Err(PlayerError::OpenError("av_malloc 失败".to_string()));
                }
                let ctx = ffi::avio_alloc_context(
                    buffer,
                    buffer_len,
                    0, // 只读
                    opaque,
                    Some(read_trampoline),
                    None,
                    Some(seek_trampoline),
                );
                if ctx.is_null() {
                    ffi::av_free(buffer as *mut c_void);
                    return Err(PlayerError::OpenError("avio_alloc_context 失败".to_string()));
                }
                ctx
            };

            Ok(Self { ctx, source })
        }

        /// 探测容器格式并把 IO 挂到格式上下文上
        ///
        /// # Safety
        /// `format_ctx` 必须是 avformat_alloc_context 分配、尚未打开的上下文。
        pub unsafe fn attach(&mut self, format_ctx: *mut ffi::AVFormatContext) -> Result<()> {
            let mut probe = self.source.probe()?;

            (*format_ctx).pb = self.ctx;
            (*format_ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;

            if probe.is_empty() {
                warn!("⚠️ 文件为空，交给 FFmpeg 自行探测");
                return Ok(());
            }

            let len = probe.len();
            probe.resize(len + ffi::AVPROBE_PADDING_SIZE as usize, 0);
            let mut probe_data: ffi::AVProbeData = std::mem::zeroed();
            probe_data.buf = probe.as_mut_ptr();
            probe_data.buf_size = len as c_int;
            probe_data.filename = b"\0".as_ptr() as *const c_char;

            let format = ffi::av_probe_input_format(&probe_data, 1);
            if !format.is_null() {
                let name = std::ffi::CStr::from_ptr((*format).name).to_string_lossy();
                debug!("探测到容器格式: {}", name);
                (*format_ctx).iformat = format;
            }
            Ok(())
        }
    }

    impl Drop for CustomIo {
        fn drop(&mut self) {
            unsafe {
                if !self.ctx.is_null() {
                    // FFmpeg 可能替换过内部缓冲，先释放 ctx->buffer 再释放上下文
                    ffi::av_freep(&mut (*self.ctx).buffer as *mut *mut u8 as *mut c_void);
                    ffi::avio_context_free(&mut self.ctx);
                }
            }
        }
    }

    unsafe extern "C" fn read_trampoline(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
        let source = &mut *(opaque as *mut SourceIo<File>);
        if buf_size <= 0 {
            return 0;
        }
        let out = std::slice::from_raw_parts_mut(buf, buf_size as usize);
        match source.read(out) {
            Ok(0) => ffi::AVERROR_EOF,
            Ok(n) => n as c_int,
            Err(e) => {
                warn!("自定义 IO 读取失败: {}", e);
                ffi::AVERROR_EXTERNAL
            }
        }
    }

    unsafe extern "C" fn seek_trampoline(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
        let source = &mut *(opaque as *mut SourceIo<File>);
        let Some(whence) = Whence::from_raw(whence) else {
            return -1;
        };
        match source.seek(offset, whence) {
            Ok(position) => position as i64,
            Err(e) => {
                debug!("自定义 IO seek 失败: {}", e);
                -1
            }
        }
    }
}
