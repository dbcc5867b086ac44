//! 测试与示例共用的输出桩。
//!
//! - [`MemoryWriter`]：可克隆的内存写入器，克隆体共享同一块缓冲，便于在把写入器交给
//!   [`SummarySink`](crate::SummarySink) 之后继续读取输出；
//! - [`FailingWriter`]：所有写入均返回错误，用于验证输出失败不会影响请求路径；
//! - [`zero_time`]：公元 1 年 1 月 1 日零点，对应“未设置”的起始时间。

use std::{
    io::{self, Write},
    sync::Arc,
};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

/// 克隆体共享同一块内存的写入器。
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    /// 创建空写入器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以字符串形式读取全部已写入内容。
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    /// 已写入的字节数。
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// 是否尚未写入任何字节。
    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 每次写入与刷新都返回 `BrokenPipe`。
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }
}

/// `0001-01-01T00:00:00Z`，即“未设置”的起始时间。
pub fn zero_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
