use std::{
    borrow::Cow,
    io::{self, Write},
};

use bytes::{BufMut, BytesMut};
use parking_lot::RwLock;

/// 每条日志条目的标签前缀。
pub const LOG_LABEL: &str = "log:";
/// 字段分隔符，摘要行内所有字段均以制表符分隔。
pub const VALUE_SEPARATOR: u8 = b'\t';
/// 行终止符。
pub const LINE_SEPARATOR: u8 = b'\n';

/// `EntryBuffer` 累积单个请求生命周期内的全部日志片段。
///
/// # 教案式说明
/// - **意图（Why）**：请求结束后才统一输出，因此请求期间的 `append` 只负责写入内存，
///   不触碰共享输出流。
/// - **结构（How）**：`parking_lot::RwLock<BytesMut>` 保护字节序列；`append`/`reset`
///   取写锁，`is_empty`/`drain_to` 取读锁，允许多个读者并行。
/// - **契约（What）**：
///   - 片段之间以 `\t` 分隔，每个片段以 `log:` 开头；
///   - 写入的文本中的 `\n` 会被替换为空格，保证一条摘要恰好对应输出中的一行；
///   - `reset` 后序列为空，但底层容量保留，供池化复用。
#[derive(Debug, Default)]
pub struct EntryBuffer {
    buf: RwLock<BytesMut>,
}

impl EntryBuffer {
    /// 创建空缓冲。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条日志片段。
    ///
    /// 换行替换在加锁前完成，锁内只做字节拷贝。
    pub fn append(&self, text: &str) {
        let text = sanitize(text);

        let mut buf = self.buf.write();
        if !buf.is_empty() {
            buf.put_u8(VALUE_SEPARATOR);
        }
        buf.put_slice(LOG_LABEL.as_bytes());
        buf.put_slice(text.as_bytes());
    }

    /// 是否尚未写入任何片段。
    pub fn is_empty(&self) -> bool {
        self.buf.read().is_empty()
    }

    /// 当前累积的字节数。
    pub fn len(&self) -> usize {
        self.buf.read().len()
    }

    /// 底层存储已保留的容量，池据此判断是否超出回收上限。
    pub fn capacity(&self) -> usize {
        self.buf.read().capacity()
    }

    /// 清空内容并保留容量。
    pub fn reset(&self) {
        self.buf.write().clear();
    }

    /// 将累积内容写入 `sink`：前导 `\t`、全部片段、行终止符。
    ///
    /// # 契约（What）
    /// - 本方法不检查是否为空；跳过空请求的责任在调用方
    ///   （见 [`SummarySink::write_summary`](crate::SummarySink::write_summary)）。
    /// - 写入错误原样返回，由调用方决定吞掉还是上报。
    pub fn drain_to<W: Write + ?Sized>(&self, sink: &mut W) -> io::Result<()> {
        let buf = self.buf.read();
        sink.write_all(&[VALUE_SEPARATOR])?;
        sink.write_all(&buf)?;
        sink.write_all(&[LINE_SEPARATOR])
    }

    /// 复制当前内容，便于测试与诊断。
    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.read().to_vec()
    }
}

fn sanitize(text: &str) -> Cow<'_, str> {
    if text.contains('\n') {
        Cow::Owned(text.replace('\n', " "))
    } else {
        Cow::Borrowed(text)
    }
}
