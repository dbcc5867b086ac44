use std::net::SocketAddr;

use http::{HeaderMap, Method, Request, Uri, request::Parts};

/// 请求对端地址，由宿主服务器在分发请求前写入 `http::Extensions`。
///
/// `http::Request` 本身不携带连接信息；未写入时摘要行中的 `host:` 字段为空。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RemoteAddr(pub SocketAddr);

/// 请求元数据快照，摘要行的 `host`/`method`/`path`/header 字段均取自此处。
///
/// # 教案式说明
/// - **意图（Why）**：处理器按值消费请求，请求结束后原对象已不可用；因此在绑定缓冲之前
///   拍下快照，保证摘要使用的是未经绑定的原始请求信息。
/// - **契约（What）**：仅当 `with_headers` 为真时复制 `HeaderMap`，避免关闭头部输出时的额外分配。
#[derive(Clone, Debug)]
pub struct RequestMeta {
    method: Method,
    uri: Uri,
    remote_addr: Option<SocketAddr>,
    headers: Option<HeaderMap>,
}

impl RequestMeta {
    /// 从请求引用捕获元数据。
    pub fn capture<B>(request: &Request<B>, with_headers: bool) -> Self {
        Self::build(
            request.method(),
            request.uri(),
            request.extensions().get::<RemoteAddr>(),
            request.headers(),
            with_headers,
        )
    }

    /// 从 `Parts` 捕获元数据。
    pub fn from_parts(parts: &Parts, with_headers: bool) -> Self {
        Self::build(
            &parts.method,
            &parts.uri,
            parts.extensions.get::<RemoteAddr>(),
            &parts.headers,
            with_headers,
        )
    }

    fn build(
        method: &Method,
        uri: &Uri,
        remote: Option<&RemoteAddr>,
        headers: &HeaderMap,
        with_headers: bool,
    ) -> Self {
        Self {
            method: method.clone(),
            uri: uri.clone(),
            remote_addr: remote.map(|addr| addr.0),
            headers: with_headers.then(|| headers.clone()),
        }
    }

    /// 请求方法。
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 请求 URI（路径与查询串）。
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// 对端地址，宿主未写入 [`RemoteAddr`] 时为 `None`。
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// 捕获时未要求头部则返回 `None`。
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }
}
