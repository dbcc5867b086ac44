use std::{
    fmt::Write as _,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    buffer::EntryBuffer,
    config::{DEFAULT_TIME_FORMAT, HttprintConfig, OutputTarget},
    error::ConfigError,
    meta::RequestMeta,
};

/// 摘要行的渲染参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryFormat {
    /// `chrono` strftime 格式，作用于 UTC 起始时间。
    pub time_format: String,
    /// 是否在摘要中附带全部请求头。
    pub print_header: bool,
}

impl Default for SummaryFormat {
    fn default() -> Self {
        Self {
            time_format: DEFAULT_TIME_FORMAT.to_owned(),
            print_header: false,
        }
    }
}

impl From<&HttprintConfig> for SummaryFormat {
    fn from(config: &HttprintConfig) -> Self {
        Self {
            time_format: config.time_format.clone(),
            print_header: config.print_header,
        }
    }
}

/// `SummarySink` 是进程内唯一的输出守卫：所有请求的摘要行都经由同一把互斥锁写出。
///
/// # 教案式说明
/// - **意图（Why）**：并发完成的请求共享同一个输出流，若不加锁，两条摘要的字节会交错，
///   破坏“一请求一行”的格式。
/// - **结构（How）**：`parking_lot::Mutex<Box<dyn Write + Send>>` 包裹写入器。头部字段
///   （时间、地址、方法、路径、耗时、可选请求头）在锁外渲染为字符串，锁内依次写出头部、
///   缓冲内容与行终止符，并立即 `flush`。
/// - **契约（What）**：
///   - 缓冲为空时不写任何字节；
///   - 一行摘要的全部字节在同一次持锁期间写出，任意两行之间不交错；
///   - 写入失败不向调用方传播，只通过 `tracing::warn!` 报告。
/// - **风险提示（Trade-offs）**：锁持有时间等于一次写入延迟；若底层写入阻塞，
///   所有其它请求的摘要都会在锁上排队。
pub struct SummarySink {
    writer: Mutex<Box<dyn Write + Send>>,
    format: SummaryFormat,
}

impl std::fmt::Debug for SummarySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarySink")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl SummarySink {
    /// 包装任意写入器。
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            writer: Mutex::new(Box::new(writer)),
            format: SummaryFormat::default(),
        }
    }

    /// 标准错误输出，未显式配置时的默认目标。
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// 标准输出。
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// 以追加模式打开（必要时创建）文件。
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ConfigError::OpenOutput {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_writer(file))
    }

    /// 按配置中的输出目标构造。
    pub fn from_target(target: &OutputTarget) -> Result<Self, ConfigError> {
        match target {
            OutputTarget::Stderr => Ok(Self::stderr()),
            OutputTarget::Stdout => Ok(Self::stdout()),
            OutputTarget::File(path) => Self::open(path),
        }
    }

    /// 替换渲染参数。
    pub fn with_format(mut self, format: SummaryFormat) -> Self {
        self.format = format;
        self
    }

    /// 当前渲染参数。
    pub fn format(&self) -> &SummaryFormat {
        &self.format
    }

    /// 写出一条请求摘要。
    ///
    /// # 参数
    /// - `buffer`：请求期间累积的日志；为空时直接返回；
    /// - `meta`：绑定缓冲之前拍下的请求元数据；
    /// - `start`：请求开始的墙钟时间，仅用于渲染 `time:` 字段；
    /// - `elapsed`：单调时钟测得的处理耗时，按整毫秒渲染为 `reqtime:`。
    pub fn write_summary(
        &self,
        buffer: &EntryBuffer,
        meta: &RequestMeta,
        start: DateTime<Utc>,
        elapsed: Duration,
    ) {
        if buffer.is_empty() {
            return;
        }

        let header = self.render_header(meta, start, elapsed);

        let result = write_line(&mut **self.writer.lock(), &header, buffer);

        if let Err(err) = result {
            tracing::warn!(
                target: "httprint::sink",
                error = %err,
                method = %meta.method(),
                path = %meta.uri(),
                "failed to write request summary"
            );
        }
    }

    fn render_header(
        &self,
        meta: &RequestMeta,
        start: DateTime<Utc>,
        elapsed: Duration,
    ) -> String {
        let mut header = String::with_capacity(128);
        header.push_str("time:");
        render_time(&mut header, start, &self.format.time_format);
        header.push_str("\thost:");
        if let Some(addr) = meta.remote_addr() {
            let _ = write!(header, "{addr}");
        }
        let _ = write!(
            header,
            "\tmethod:{}\tpath:{}\treqtime:{}ms",
            meta.method(),
            meta.uri(),
            elapsed.as_millis()
        );

        if let Some(headers) = meta.headers().filter(|_| self.format.print_header) {
            for name in headers.keys() {
                header.push('\t');
                header.push_str(name.as_str());
                header.push(':');
                for (index, value) in headers.get_all(name).iter().enumerate() {
                    if index > 0 {
                        header.push(',');
                    }
                    header.push_str(&String::from_utf8_lossy(value.as_bytes()));
                }
            }
        }

        header
    }
}

fn write_line<W: Write + ?Sized>(
    writer: &mut W,
    header: &str,
    buffer: &EntryBuffer,
) -> io::Result<()> {
    writer.write_all(header.as_bytes())?;
    buffer.drain_to(&mut *writer)?;
    writer.flush()
}

/// 非法格式在 `chrono` 中表现为 `fmt::Error`；启动期校验之外的兜底是回退到 RFC 3339。
fn render_time(out: &mut String, start: DateTime<Utc>, time_format: &str) {
    let mark = out.len();
    if write!(out, "{}", start.format(time_format)).is_err() {
        out.truncate(mark);
        out.push_str(&start.to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use chrono::TimeZone;
    use http::{Method, Request};

    use super::*;
    use crate::{
        meta::RemoteAddr,
        test_stubs::{FailingWriter, MemoryWriter, zero_time},
    };

    const TEST_PRINT: &str = "this is test print";

    fn meta_for(request: &Request<()>, with_headers: bool) -> RequestMeta {
        RequestMeta::capture(request, with_headers)
    }

    #[test]
    fn empty_buffer_writes_nothing() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone());
        let request = Request::new(());

        sink.write_summary(
            &EntryBuffer::new(),
            &meta_for(&request, false),
            Utc::now(),
            Duration::ZERO,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn zero_start_time_renders_prefix_and_suffix() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone());
        let request = Request::new(());
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);

        sink.write_summary(&buffer, &meta_for(&request, false), zero_time(), Duration::ZERO);

        let line = out.contents();
        assert!(line.starts_with("time:0001-01-01T00:00:00\thost:"), "{line}");
        assert!(line.ends_with(&format!("\tlog:{TEST_PRINT}\n")), "{line}");
    }

    #[test]
    fn renders_all_request_fields() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone());
        let addr: SocketAddr = "198.51.100.3:50000".parse().expect("合法地址");
        let mut request = Request::builder()
            .method(Method::DELETE)
            .uri("/users/42?soft=true")
            .body(())
            .expect("构造请求");
        request.extensions_mut().insert(RemoteAddr(addr));
        let buffer = EntryBuffer::new();
        buffer.append("gone");

        sink.write_summary(&buffer, &meta_for(&request, false), Utc::now(), Duration::ZERO);

        let line = out.contents();
        let fields: Vec<_> = line.trim_end_matches('\n').split('\t').collect();
        assert_eq!(fields[1], "host:198.51.100.3:50000");
        assert_eq!(fields[2], "method:DELETE");
        assert_eq!(fields[3], "path:/users/42?soft=true");
        assert!(fields[4].starts_with("reqtime:") && fields[4].ends_with("ms"));
        assert_eq!(fields[5], "log:gone");
        assert_eq!(fields.len(), 6);
    }

    #[test]
    fn header_values_are_comma_joined() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone()).with_format(SummaryFormat {
            print_header: true,
            ..SummaryFormat::default()
        });
        let request = Request::builder()
            .header("accept", "text/html")
            .header("accept", "application/json")
            .body(())
            .expect("构造请求");
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);

        sink.write_summary(&buffer, &meta_for(&request, true), Utc::now(), Duration::ZERO);

        let line = out.contents();
        assert!(
            line.contains("\taccept:text/html,application/json\tlog:"),
            "{line}"
        );
    }

    #[test]
    fn headers_omitted_when_disabled() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone());
        let request = Request::builder()
            .header("x-secret", "1")
            .body(())
            .expect("构造请求");
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);

        sink.write_summary(&buffer, &meta_for(&request, true), Utc::now(), Duration::ZERO);
        assert!(!out.contents().contains("x-secret"));
    }

    #[test]
    fn custom_time_format_is_applied() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone()).with_format(SummaryFormat {
            time_format: "%Y/%m/%d".to_owned(),
            print_header: false,
        });
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);

        sink.write_summary(
            &buffer,
            &meta_for(&Request::new(()), false),
            zero_time(),
            Duration::ZERO,
        );
        assert!(out.contents().starts_with("time:0001/01/01\thost:"));
    }

    #[test]
    fn start_time_renders_in_utc() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone());
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);
        let start = Utc
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .single()
            .expect("合法时间");

        sink.write_summary(
            &buffer,
            &meta_for(&Request::new(()), false),
            start,
            Duration::ZERO,
        );
        assert!(out.contents().starts_with("time:2024-05-06T07:08:09\thost:"));
    }

    #[test]
    fn reqtime_comes_from_measured_duration() {
        let out = MemoryWriter::new();
        let sink = SummarySink::from_writer(out.clone());
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);

        // 起始时间远在过去，耗时仍只取传入的单调测量值。
        sink.write_summary(
            &buffer,
            &meta_for(&Request::new(()), false),
            zero_time(),
            Duration::from_micros(1_500_900),
        );
        let line = out.contents();
        assert!(line.contains("\treqtime:1500ms\t"), "{line}");
    }

    #[test]
    fn invalid_time_format_falls_back_to_rfc3339() {
        let mut out = String::from("time:");
        render_time(&mut out, zero_time(), "%Q");
        assert_eq!(out, format!("time:{}", zero_time().to_rfc3339()));
    }

    #[test]
    fn write_failure_is_swallowed() {
        let sink = SummarySink::from_writer(FailingWriter);
        let buffer = EntryBuffer::new();
        buffer.append(TEST_PRINT);

        sink.write_summary(
            &buffer,
            &meta_for(&Request::new(()), false),
            Utc::now(),
            Duration::ZERO,
        );
        assert!(!buffer.is_empty(), "输出失败不应改变缓冲内容");
    }
}
