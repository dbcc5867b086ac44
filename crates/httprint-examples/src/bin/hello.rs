//! 演示：在 axum 服务中为每个请求累积日志，请求结束时输出一行汇总。
//!
//! ```text
//! cargo run -p httprint-examples --bin hello [config.toml]
//! curl http://127.0.0.1:8080/
//! ```
//!
//! 未提供配置文件时启用全部输出并写到标准输出。

use std::{env, error::Error, net::SocketAddr};

use axum::{
    Router,
    extract::{ConnectInfo, Request},
    middleware,
    routing::get,
};
use httprint::{Httprint, HttprintConfig, OutputTarget, RemoteAddr};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

const ADDR: &str = "0.0.0.0:8080";

async fn hello(request: Request) -> &'static str {
    httprint::log(&request, "こんにちは");
    httprint::log(&request, "さようなら");
    "hello"
}

/// 把连接地址写入请求扩展，摘要行的 `host:` 字段依赖它。
async fn attach_remote_addr(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
) -> Request {
    request.extensions_mut().insert(RemoteAddr(addr));
    request
}

fn load_config() -> Result<HttprintConfig, httprint::ConfigError> {
    match env::args_os().nth(1) {
        Some(path) => HttprintConfig::load(path),
        None => Ok(HttprintConfig::default()
            .with_enabled(true)
            .with_print_header(true)
            .with_output(OutputTarget::Stdout)),
    }
}

fn install_tracing() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    install_tracing()?;

    let httprint = Httprint::new(load_config()?)?;
    let app = Router::new()
        .route("/", get(hello))
        .layer(httprint.layer())
        .layer(middleware::map_request(attach_remote_addr));

    let listener = tokio::net::TcpListener::bind(ADDR).await?;
    tracing::info!(addr = ADDR, enabled = httprint.is_enabled(), "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
