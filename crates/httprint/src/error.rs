//! # error 模块说明
//!
//! 本 crate 在请求路径上不产生任何可传播错误：绑定缺失与输出失败都降级为“丢失一条日志”。
//! 唯一对外暴露的错误发生在启动阶段，即配置解析与输出目标打开，集中定义为 [`ConfigError`]。

use std::{io, path::PathBuf};

use thiserror::Error;

/// 配置装配阶段的错误。
///
/// # 契约（What）
/// - 仅由 [`HttprintConfig`](crate::HttprintConfig) 的解析/校验与
///   [`Httprint::new`](crate::Httprint::new) 产生；
/// - 所有变体均满足 `Send + Sync + 'static`。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `time_format` 含有 `chrono` 无法识别的格式说明符。
    #[error("invalid time format `{format}`")]
    InvalidTimeFormat { format: String },

    /// TOML 文本无法解析为配置。
    #[error("failed to parse httprint configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// 读取配置文件失败。
    #[error("failed to read configuration file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 打开文件输出目标失败。
    #[error("failed to open output file `{path}`: {source}")]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
