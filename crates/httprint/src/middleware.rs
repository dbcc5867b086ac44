use std::{
    fmt,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};

use crate::{
    config::HttprintConfig,
    context::{self, RequestLog},
    error::ConfigError,
    meta::RequestMeta,
    pool::{BufferLease, BufferPool, PoolStats},
    sink::{SummaryFormat, SummarySink},
};

/// `Httprint` 是中间件运行时：持有缓冲池、输出守卫与只读配置。
///
/// # 教案式说明
/// - **意图（Why）**：把“借缓冲 → 绑定请求 → 调用处理器 → 输出摘要 → 归还缓冲”的完整流程
///   收敛到一个可克隆的值中，宿主在启动阶段构造一次，随后注入到路由层。
/// - **结构（How）**：
///   - [`Httprint::wrap`] 装饰同步处理函数 `Fn(Request<B>) -> R`；
///   - [`Httprint::layer`] 产出 `tower::Layer`，适配任意 `Service<Request<B>>`；
///   - 两者共享 [`Httprint::begin`]，由返回的 [`RequestScope`] 在 `Drop` 中完成输出与归还。
/// - **契约（What）**：
///   - 配置关闭时，包装结果在构造时即被固定为直通分支，不借缓冲、不写输出；
///   - 处理器正常返回、panic、或（异步场景）响应 future 被提前丢弃时，摘要都会输出且缓冲都会归还；
///   - 请求已被外层包装绑定时，内层包装直通，保证每个请求只产生一行摘要。
#[derive(Clone)]
pub struct Httprint {
    inner: Arc<HttprintInner>,
}

struct HttprintInner {
    enabled: bool,
    print_header: bool,
    pool: BufferPool,
    sink: SummarySink,
}

impl fmt::Debug for Httprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Httprint")
            .field("enabled", &self.inner.enabled)
            .field("print_header", &self.inner.print_header)
            .field("pool", &self.inner.pool)
            .field("sink", &self.inner.sink)
            .finish()
    }
}

impl Httprint {
    /// 按配置构造运行时，输出目标取自 `config.output`。
    pub fn new(config: HttprintConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = SummarySink::from_target(&config.output)?;
        Self::with_sink(config, sink)
    }

    /// 使用外部提供的输出守卫构造运行时，`config.output` 被忽略。
    pub fn with_sink(config: HttprintConfig, sink: SummarySink) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = sink.with_format(SummaryFormat::from(&config));
        tracing::debug!(
            target: "httprint",
            enabled = config.enabled,
            print_header = config.print_header,
            time_format = %config.time_format,
            recycle_limit = config.recycle_limit,
            "httprint runtime configured"
        );
        Ok(Self {
            inner: Arc::new(HttprintInner {
                enabled: config.enabled,
                print_header: config.print_header,
                pool: BufferPool::with_limits(config.recycle_limit, config.max_idle),
                sink,
            }),
        })
    }

    /// 是否启用；关闭时 [`wrap`](Self::wrap) 与 [`layer`](Self::layer) 均为直通。
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// 运行时持有的缓冲池。
    pub fn pool(&self) -> &BufferPool {
        &self.inner.pool
    }

    /// 缓冲池统计快照，等价于 `self.pool().stats()`。
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// 进程内唯一的输出守卫。
    pub fn sink(&self) -> &SummarySink {
        &self.inner.sink
    }

    /// 开始一个请求作用域：借出缓冲、拍下元数据、绑定请求并记录起始时间。
    ///
    /// 返回 `None` 表示无需输出：运行时被关闭，或请求已被外层绑定。
    pub fn begin<B>(&self, request: Request<B>) -> (Request<B>, Option<RequestScope>) {
        if !self.inner.enabled || context::is_bound(&request) {
            return (request, None);
        }

        let lease = self.inner.pool.acquire();
        let meta = RequestMeta::capture(&request, self.inner.print_header);
        let request = context::bind(request, &lease);
        let scope = RequestScope {
            lease: Some(lease),
            meta,
            start: Utc::now(),
            started: Instant::now(),
            runtime: Arc::clone(&self.inner),
        };
        (request, Some(scope))
    }

    /// 装饰同步处理函数，返回形状相同的处理函数。
    pub fn wrap<F, B, R>(
        &self,
        handler: F,
    ) -> impl Fn(Request<B>) -> R + Clone + Send + Sync + use<F, B, R>
    where
        F: Fn(Request<B>) -> R + Clone + Send + Sync,
    {
        let runtime = self.enabled_runtime();
        move |request| match &runtime {
            None => handler(request),
            Some(runtime) => {
                let (request, _scope) = runtime.begin(request);
                handler(request)
            }
        }
    }

    /// 产出 `tower::Layer`。
    pub fn layer(&self) -> HttprintLayer {
        HttprintLayer {
            runtime: self.enabled_runtime(),
        }
    }

    /// 直接包装一个 `tower::Service`，等价于 `self.layer().layer(service)`。
    pub fn wrap_service<S>(&self, service: S) -> HttprintService<S> {
        self.layer().layer(service)
    }

    fn enabled_runtime(&self) -> Option<Httprint> {
        self.inner.enabled.then(|| self.clone())
    }
}

/// 单个请求的作用域守卫。
///
/// 生命周期对应 `BufferAcquired → HandlerRunning → Flushed → Released`：
/// 构造即已借出并绑定缓冲；`Drop` 时先经输出守卫写出摘要（缓冲为空则跳过），再归还缓冲。
/// 处理器 panic 时 `Drop` 在栈展开中执行，同样完成输出与归还。
pub struct RequestScope {
    lease: Option<BufferLease>,
    meta: RequestMeta,
    start: DateTime<Utc>,
    started: Instant,
    runtime: Arc<HttprintInner>,
}

impl RequestScope {
    /// 请求的起始时间（墙钟，仅用于渲染）。
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// 自作用域开始以来经过的时间，取自单调时钟。
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 绑定前拍下的请求元数据。
    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// 作用域所绑定缓冲的句柄，供拿不到请求对象的代码使用。
    pub fn log(&self) -> Option<RequestLog> {
        self.lease.as_ref().map(RequestLog::from_lease)
    }

    /// 显式结束作用域，等价于 `drop(scope)`。
    pub fn finish(self) {}
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("meta", &self.meta)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        if std::thread::panicking() {
            tracing::debug!(
                target: "httprint",
                method = %self.meta.method(),
                path = %self.meta.uri(),
                "handler panicked, flushing request log during unwind"
            );
        }
        let elapsed = self.started.elapsed();
        self.runtime
            .sink
            .write_summary(&lease, &self.meta, self.start, elapsed);
        drop(lease);
    }
}

/// [`Httprint`] 的 `tower::Layer` 形态。
#[derive(Clone, Debug)]
pub struct HttprintLayer {
    runtime: Option<Httprint>,
}

impl<S> Layer<S> for HttprintLayer {
    type Service = HttprintService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttprintService {
            inner,
            runtime: self.runtime.clone(),
        }
    }
}

/// 包装后的 `tower::Service`。
///
/// [`RequestScope`] 被移入响应 future，随 future 完成或被丢弃而结束，
/// 因此取消（客户端断开导致 future 被丢弃）同样会输出摘要并归还缓冲。
#[derive(Clone, Debug)]
pub struct HttprintService<S> {
    inner: S,
    runtime: Option<Httprint>,
}

impl<S> HttprintService<S> {
    /// 被包装的内层服务。
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// 拆出内层服务。
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B> Service<Request<B>> for HttprintService<S>
where
    S: Service<Request<B>>,
    S::Future: Send + 'static,
    S::Response: 'static,
    S::Error: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let (request, scope) = match &self.runtime {
            Some(runtime) => runtime.begin(request),
            None => (request, None),
        };
        let future = self.inner.call(request);
        Box::pin(async move {
            let _scope = scope;
            future.await
        })
    }
}
