//! 请求关联：把 [`EntryBuffer`] 以类型化扩展的形式挂到 `http::Request` 上。
//!
//! # 教案式概览
//! - **意图（Why）**：业务代码、库函数、辅助函数往往只拿得到请求对象；借助请求级扩展，
//!   它们无需显式传递缓冲参数即可写日志。
//! - **结构（How）**：`http::Extensions` 以类型为键，[`RequestLog`] 即唯一的关联键；
//!   [`bind`] 按值接收请求并返回携带绑定的请求，[`lookup`] 只读取、从不修改。
//! - **契约（What）**：
//!   - 每个请求至多绑定一个缓冲，已有绑定时 [`bind`] 不会替换；
//!   - 未绑定时所有日志入口静默丢弃，不 panic、不写输出。

use std::{fmt, sync::Arc};

use http::{Extensions, Request, request::Parts};

use crate::{buffer::EntryBuffer, pool::BufferLease};

/// 绑定在请求上的日志句柄。
///
/// 克隆只增加引用计数；克隆体可以交给请求内派生的线程或任务并发写入。
/// 请求结束后仍存活的克隆会使该缓冲在归还时被丢弃而不是入池。
#[derive(Clone)]
pub struct RequestLog {
    buffer: Arc<EntryBuffer>,
}

impl fmt::Debug for RequestLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLog")
            .field("len", &self.buffer.len())
            .finish()
    }
}

impl RequestLog {
    pub(crate) fn from_lease(lease: &BufferLease) -> Self {
        Self {
            buffer: lease.share(),
        }
    }

    /// 从请求中取出句柄的克隆。
    pub fn from_request<B>(request: &Request<B>) -> Option<Self> {
        lookup(request).cloned()
    }

    /// 从 `into_parts` 拆出的头部取出句柄的克隆。
    pub fn from_parts(parts: &Parts) -> Option<Self> {
        Self::from_extensions(&parts.extensions)
    }

    /// 从扩展表取出句柄的克隆，适用于框架提取器。
    pub fn from_extensions(extensions: &Extensions) -> Option<Self> {
        extensions.get::<RequestLog>().cloned()
    }

    /// 记录一个值的 `Display` 渲染结果。
    pub fn print(&self, value: impl fmt::Display) {
        self.printf(format_args!("{value}"));
    }

    /// 记录一条格式化日志。
    pub fn printf(&self, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(text) => self.buffer.append(text),
            None => self.buffer.append(&args.to_string()),
        }
    }

    /// 句柄背后的缓冲。
    pub fn buffer(&self) -> &EntryBuffer {
        &self.buffer
    }
}

/// 为请求绑定租约中的缓冲，返回携带绑定的请求。
///
/// 请求已有绑定时原样返回，保证绑定在请求生命周期内不被替换。
pub fn bind<B>(mut request: Request<B>, lease: &BufferLease) -> Request<B> {
    if is_bound(&request) {
        tracing::debug!(
            target: "httprint::context",
            "request already carries an entry buffer, keeping the existing binding"
        );
        return request;
    }
    request
        .extensions_mut()
        .insert(RequestLog::from_lease(lease));
    request
}

/// 读取请求上的绑定；未绑定时返回 `None`。
pub fn lookup<B>(request: &Request<B>) -> Option<&RequestLog> {
    request.extensions().get::<RequestLog>()
}

/// 请求是否已绑定缓冲。
pub fn is_bound<B>(request: &Request<B>) -> bool {
    lookup(request).is_some()
}

/// 向请求绑定的缓冲追加一条日志；未绑定时静默丢弃。
pub fn log<B>(request: &Request<B>, value: impl fmt::Display) {
    if let Some(log) = lookup(request) {
        log.print(value);
    }
}

/// [`log`] 的格式化版本，通常经由 [`logf!`](crate::logf) 调用。
pub fn log_args<B>(request: &Request<B>, args: fmt::Arguments<'_>) {
    if let Some(log) = lookup(request) {
        log.printf(args);
    }
}
