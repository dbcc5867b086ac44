//! httprint：请求级日志累积器。
//!
//! # 教案式概览
//! - **意图（Why）**：处理请求期间业务代码可以随时追加日志，但输出被推迟到请求结束，
//!   届时把请求元数据与全部日志合并为**一行**写到共享输出流，避免并发请求的日志互相穿插。
//! - **结构（How）**：
//!   - [`buffer`]：单请求日志缓冲 [`EntryBuffer`]，读写锁保护，可重置；
//!   - [`pool`]：缓冲复用 [`BufferPool`]，超过回收上限的缓冲不入池；
//!   - [`context`]：通过 `http::Extensions` 把缓冲绑定到请求，[`log`]/[`logf!`] 只需请求对象；
//!   - [`sink`]：进程内唯一的输出守卫 [`SummarySink`]，串行化所有摘要行；
//!   - [`middleware`]：[`Httprint`] 运行时，提供函数装饰器与 `tower` Layer；
//!   - [`config`] 与 [`error`]：启动期配置及其错误。
//! - **契约（What）**：请求路径上没有可传播错误，绑定缺失或输出失败都只会丢失日志，
//!   不会影响业务响应。
//!
//! # 输出格式
//! ```text
//! time:<start>\thost:<remote>\tmethod:<verb>\tpath:<uri>\treqtime:<ms>ms[\t<header>:<v1>,<v2>]*\tlog:<e1>\tlog:<e2>
//! ```
//!
//! # 宏命名
//! [`log!`] 与 `log` crate 的 `log::log!` 同名。两者同时被 glob 导入时名称冲突，
//! 因此本 crate 的宏请始终按路径调用：`httprint::log!(..)`、`httprint::logf!(..)`。
//!
//! # 示例
//! ```
//! use http::Request;
//! use httprint::{Httprint, HttprintConfig, SummarySink, test_stubs::MemoryWriter};
//!
//! let out = MemoryWriter::new();
//! let runtime = Httprint::with_sink(
//!     HttprintConfig::default().with_enabled(true),
//!     SummarySink::from_writer(out.clone()),
//! )?;
//!
//! let hello = runtime.wrap(|request: Request<()>| {
//!     httprint::log(&request, "hello");
//!     httprint::logf!(&request, "answer={}", 42);
//!     "ok"
//! });
//!
//! assert_eq!(hello(Request::new(())), "ok");
//! assert!(out.contents().ends_with("\tlog:hello\tlog:answer=42\n"));
//! # Ok::<(), httprint::ConfigError>(())
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod meta;
pub mod middleware;
pub mod pool;
pub mod sink;
pub mod test_stubs;

pub use buffer::EntryBuffer;
pub use config::{DEFAULT_TIME_FORMAT, HttprintConfig, OutputTarget};
pub use context::{RequestLog, bind, is_bound, log, log_args, lookup};
pub use error::ConfigError;
pub use meta::{RemoteAddr, RequestMeta};
pub use middleware::{Httprint, HttprintLayer, HttprintService, RequestScope};
pub use pool::{BufferLease, BufferPool, PoolStats, RECYCLE_LIMIT};
pub use sink::{SummaryFormat, SummarySink};

/// 以格式化参数向请求追加一条日志；请求未绑定时静默丢弃。
///
/// ```
/// # let request = http::Request::new(());
/// httprint::logf!(&request, "user={} items={}", "alice", 3);
/// ```
#[macro_export]
macro_rules! logf {
    ($request:expr, $($arg:tt)+) => {
        $crate::log_args($request, ::core::format_args!($($arg)+))
    };
}

/// 把若干值拼接为一条日志，各值按 `Display` 渲染。
///
/// 相邻两个值都不是字符串时在中间插入一个空格，其余情况直接相连：
/// `log!(&req, 1, 2, 3)` 记为 `1 2 3`，`log!(&req, "status=", 200)` 记为 `status=200`。
/// 字符串指 `str`、`String` 与 `Cow<str>` 及其引用。
///
/// 请求未绑定时不会渲染任何值。
///
/// ```
/// # let request = http::Request::new(());
/// httprint::log!(&request, "status=", 200, " bytes=", 512);
/// ```
#[macro_export]
macro_rules! log {
    ($request:expr, $($value:expr),+ $(,)?) => {
        if let ::core::option::Option::Some(handle) = $crate::lookup($request) {
            #[allow(unused_imports)]
            use $crate::__macro_support::{OtherOperand as _, StrOperand as _};
            let mut line = ::std::string::String::new();
            let mut prev_is_str: ::core::option::Option<bool> = ::core::option::Option::None;
            $(
                let operand = &$value;
                let is_str = (&&$crate::__macro_support::Operand(operand)).is_str();
                if prev_is_str.is_some_and(|prev| !prev && !is_str) {
                    line.push(' ');
                }
                let _ = ::core::fmt::Write::write_fmt(
                    &mut line,
                    ::core::format_args!("{}", operand),
                );
                prev_is_str = ::core::option::Option::Some(is_str);
            )+
            let _ = prev_is_str;
            handle.buffer().append(&line);
        }
    };
}

/// [`log!`] 的展开辅助：在展开处按静态类型区分字符串操作数。
#[doc(hidden)]
pub mod __macro_support {
    use std::borrow::Cow;

    pub struct Operand<'a, T: ?Sized>(pub &'a T);

    /// 字符串类操作数，实现在 `&Operand` 上，方法解析时优先命中。
    pub trait StrOperand {
        fn is_str(&self) -> bool {
            true
        }
    }

    impl StrOperand for &Operand<'_, str> {}
    impl StrOperand for &Operand<'_, &str> {}
    impl StrOperand for &Operand<'_, String> {}
    impl StrOperand for &Operand<'_, &String> {}
    impl StrOperand for &Operand<'_, Cow<'_, str>> {}
    impl StrOperand for &Operand<'_, &Cow<'_, str>> {}

    pub trait OtherOperand {
        fn is_str(&self) -> bool {
            false
        }
    }

    impl<T: ?Sized> OtherOperand for Operand<'_, T> {}
}
