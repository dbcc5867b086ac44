use std::{fs, path::Path, path::PathBuf};

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

use crate::{error::ConfigError, pool::RECYCLE_LIMIT};

/// 默认时间格式，渲染结果形如 `2006-01-02T15:04:05`。
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 进程级配置，启动时构造一次，随后以只读方式注入 [`Httprint`](crate::Httprint)。
///
/// # 教案式说明
/// - **意图（Why）**：开关、时间格式、头部输出、输出目标全部显式化为一个值，
///   不存在运行期可变的全局变量，也就不存在重新配置时的竞态。
/// - **结构（How）**：支持 TOML 反序列化（缺省字段取默认值），也支持 `with_*` 链式构造。
/// - **契约（What）**：
///   - `enabled = false` 时中间件完全透明；
///   - `time_format` 为 `chrono` strftime 语法，构造 [`Httprint`](crate::Httprint) 前必须通过 [`validate`](Self::validate)；
///   - `recycle_limit` 默认 1 MiB；`max_idle` 缺省表示不限制空闲缓冲数量。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttprintConfig {
    /// 总开关，关闭时中间件直通。
    pub enabled: bool,
    /// 起始时间的 strftime 格式。
    pub time_format: String,
    /// 是否在摘要中附带请求头。
    pub print_header: bool,
    /// 摘要行输出目标。
    pub output: OutputTarget,
    /// 归还时容量超过该值的缓冲不入池。
    pub recycle_limit: usize,
    /// 空闲缓冲数量上限。
    pub max_idle: Option<usize>,
}

impl Default for HttprintConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time_format: DEFAULT_TIME_FORMAT.to_owned(),
            print_header: false,
            output: OutputTarget::Stderr,
            recycle_limit: RECYCLE_LIMIT,
            max_idle: None,
        }
    }
}

impl HttprintConfig {
    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取并解析 TOML 配置文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 校验时间格式。`chrono` 在渲染非法格式时会返回 `fmt::Error`，因此必须在启动期拦截。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if StrftimeItems::new(&self.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimeFormat {
                format: self.time_format.clone(),
            });
        }
        Ok(())
    }

    /// 设置总开关。
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 设置起始时间的 strftime 格式。
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = format.into();
        self
    }

    /// 设置是否输出请求头。
    pub fn with_print_header(mut self, print_header: bool) -> Self {
        self.print_header = print_header;
        self
    }

    /// 设置输出目标。
    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    /// 设置缓冲回收上限（字节）。
    pub fn with_recycle_limit(mut self, recycle_limit: usize) -> Self {
        self.recycle_limit = recycle_limit;
        self
    }

    /// 设置空闲缓冲数量上限，`None` 表示不限制。
    pub fn with_max_idle(mut self, max_idle: Option<usize>) -> Self {
        self.max_idle = max_idle;
        self
    }
}

/// 摘要行输出目标。
///
/// TOML 中写作 `output = "stderr"`、`output = "stdout"` 或 `output = { file = "/path" }`。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    /// 标准错误输出。
    #[default]
    Stderr,
    /// 标准输出。
    Stdout,
    /// 以追加模式打开的文件。
    File(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HttprintConfig::default();
        assert!(!config.enabled);
        assert!(!config.print_header);
        assert_eq!(config.time_format, DEFAULT_TIME_FORMAT);
        assert_eq!(config.output, OutputTarget::Stderr);
        assert_eq!(config.recycle_limit, 1024 * 1024);
        assert_eq!(config.max_idle, None);
        config.validate().expect("默认配置必须合法");
    }

    #[test]
    fn parses_partial_toml() {
        let config = HttprintConfig::from_toml_str(
            r#"
            enabled = true
            print_header = true
            output = "stdout"
            "#,
        )
        .expect("解析配置");
        assert!(config.enabled);
        assert!(config.print_header);
        assert_eq!(config.output, OutputTarget::Stdout);
        assert_eq!(config.time_format, DEFAULT_TIME_FORMAT);
    }

    #[test]
    fn parses_file_output_and_limits() {
        let config = HttprintConfig::from_toml_str(
            r#"
            output = { file = "/var/log/httprint.log" }
            recycle_limit = 4096
            max_idle = 16
            "#,
        )
        .expect("解析配置");
        assert_eq!(
            config.output,
            OutputTarget::File(PathBuf::from("/var/log/httprint.log"))
        );
        assert_eq!(config.recycle_limit, 4096);
        assert_eq!(config.max_idle, Some(16));
    }

    #[test]
    fn rejects_invalid_time_format() {
        let err = HttprintConfig::from_toml_str(r#"time_format = "%Q""#)
            .expect_err("非法格式应被拒绝");
        assert!(matches!(err, ConfigError::InvalidTimeFormat { .. }));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = HttprintConfig::from_toml_str("verbose = true").expect_err("未知字段应被拒绝");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = HttprintConfig::load("/nonexistent/httprint.toml").expect_err("文件不存在");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
