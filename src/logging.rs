//! 日志系统模块
//!
//! 提供结构化日志配置和管理功能。格式化层按配置的级别过滤，
//! 进度指示器层不过滤，观察每一条日志记录。

use crate::console::{SharedWriter, StreamWriter};
use crate::error::ConfigError;
use crate::spinner::SpinnerLayer;
use log::LevelFilter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};
use std::fmt::Debug;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer, Registry};

/// 未指定日志级别时使用的级别
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// 日志输出目标
#[derive(Clone, Default)]
pub enum LogTarget {
    /// 标准错误
    #[default]
    Stderr,
    /// 追加写入文件
    File(PathBuf),
    /// 调用方提供的已打开输出流
    Stream(SharedWriter),
}

impl Debug for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTarget::Stderr => f.write_str("Stderr"),
            LogTarget::File(path) => f.debug_tuple("File").field(path).finish(),
            LogTarget::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl PartialEq for LogTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LogTarget::Stderr, LogTarget::Stderr) => true,
            (LogTarget::File(a), LogTarget::File(b)) => a == b,
            (LogTarget::Stream(a), LogTarget::Stream(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for LogTarget {}

impl LogTarget {
    /// 日志文件路径，非文件目标时为 `None`
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            LogTarget::File(path) => Some(path),
            LogTarget::Stderr | LogTarget::Stream(_) => None,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 完整文本格式
    #[default]
    Full,
    /// 紧凑文本格式
    Compact,
    /// JSON格式
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "full" | "default" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidLogFormat {
                value: value.to_string(),
            }),
        }
    }
}

/// 解析日志级别，支持名称或数值
///
/// 名称：`CRIT|CRITICAL|FATAL|ERROR|WARN|WARNING|INFO|DEBUG|TRACE|OFF`（不区分大小写）。
/// 数值：`>=40` 为 error，`>=30` 为 warn，`>=20` 为 info，`>=10` 为 debug，其余为 trace。
pub fn parse_level(value: &str) -> Result<LevelFilter, ConfigError> {
    let trimmed = value.trim();
    if let Ok(number) = trimmed.parse::<u32>() {
        return Ok(match number {
            n if n >= 40 => LevelFilter::Error,
            n if n >= 30 => LevelFilter::Warn,
            n if n >= 20 => LevelFilter::Info,
            n if n >= 10 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        });
    }

    match trimmed.to_uppercase().as_str() {
        "CRIT" | "CRITICAL" | "FATAL" | "ERROR" => Ok(LevelFilter::Error),
        "WARN" | "WARNING" => Ok(LevelFilter::Warn),
        "INFO" => Ok(LevelFilter::Info),
        "DEBUG" => Ok(LevelFilter::Debug),
        "TRACE" => Ok(LevelFilter::Trace),
        "OFF" => Ok(LevelFilter::Off),
        _ => Err(ConfigError::InvalidLogLevel {
            value: value.to_string(),
        }),
    }
}

/// 级别是否比 warn 更详细
pub fn is_verbose(level: LevelFilter) -> bool {
    level > LevelFilter::Warn
}

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 输出目标
    pub target: LogTarget,
    /// 输出格式
    pub format: LogFormat,
    /// 是否输出ANSI颜色
    pub ansi: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            target: LogTarget::Stderr,
            format: LogFormat::Full,
            ansi: true,
            module_levels: HashMap::new(),
        }
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    /// 配置
    config: LogConfig,
    /// 本次初始化是否挂载了进度指示器层
    spinner_attached: bool,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只会真正初始化一次，之后的调用返回一个未挂载任何层的实例。
    pub fn setup_logging(
        config: LogConfig,
        spinner: Option<SpinnerLayer>,
    ) -> anyhow::Result<Self> {
        let state_mutex =
            GLOBAL_LOGGING_STATE.get_or_init(|| Mutex::new(GlobalLoggingState::default()));

        {
            let state = state_mutex.lock().unwrap_or_else(|p| p.into_inner());
            if state.initialized {
                tracing::debug!("日志系统已经初始化过了");
                return Ok(Self {
                    config,
                    spinner_attached: false,
                });
            }
        }

        let spinner_attached = Self::perform_initialization(&config, spinner)?;

        {
            let mut state = state_mutex.lock().unwrap_or_else(|p| p.into_inner());
            state.initialized = true;
            state.current_config = Some(config.clone());
        }

        Ok(Self {
            config,
            spinner_attached,
        })
    }

    /// 执行实际的日志系统初始化
    fn perform_initialization(
        config: &LogConfig,
        spinner: Option<SpinnerLayer>,
    ) -> anyhow::Result<bool> {
        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(config, spinner)
    }

    /// 初始化 LogTracer（log crate 到 tracing 的桥接）
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 初始化 tracing subscriber，返回是否挂载了进度指示器层
    fn init_tracing_subscriber(
        config: &LogConfig,
        spinner: Option<SpinnerLayer>,
    ) -> anyhow::Result<bool> {
        let spinner_attached = spinner.is_some();
        let result = Self::build_subscriber(config, spinner)?.try_init();

        match result {
            Ok(()) => {
                tracing::debug!("日志配置: {:?}", config);
                Ok(spinner_attached)
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains(
                    "attempted to set a logger after the logging system was already initialized",
                ) {
                    // subscriber 已设置，只是 log 桥接早已存在
                    tracing::debug!("日志配置: {:?}", config);
                    Ok(spinner_attached)
                } else if error_msg.contains("a global default trace dispatcher has already been set")
                {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(
                        "tracing subscriber初始化失败: {}",
                        error_msg
                    ))
                }
            }
        }
    }

    /// 组装 subscriber：带级别过滤的格式化层，加上不过滤的进度指示器层
    pub fn build_subscriber(
        config: &LogConfig,
        spinner: Option<SpinnerLayer>,
    ) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
        let filter = Self::build_filter(config);

        let fmt_layer = match &config.target {
            LogTarget::Stderr => Self::build_fmt_layer(config, std::io::stderr, config.ansi),
            LogTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| anyhow::anyhow!("创建日志目录失败: {}", e))?;
                }
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))?;
                Self::build_fmt_layer(config, Arc::new(file), false)
            }
            LogTarget::Stream(stream) => {
                Self::build_fmt_layer(config, StreamWriter::new(stream.clone()), config.ansi)
            }
        };

        Ok(registry()
            .with(fmt_layer.with_filter(filter))
            .with(spinner))
    }

    /// 构建级别过滤器
    fn build_filter(config: &LogConfig) -> EnvFilter {
        let mut env_filter = EnvFilter::from_default_env()
            .add_directive(Self::convert_level_to_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, Self::level_to_string(*level)).parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => tracing::warn!("忽略无效的模块日志级别 {}: {}", module, e),
            }
        }
        env_filter
    }

    /// 构建格式化层
    fn build_fmt_layer<W>(
        config: &LogConfig,
        writer: W,
        ansi: bool,
    ) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        match config.format {
            LogFormat::Full => fmt::layer()
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(ansi)
                .with_thread_names(true)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(ansi)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        }
    }

    /// 将 log::LevelFilter 转换为 tracing 的指令
    fn convert_level_to_directive(level: LevelFilter) -> tracing_subscriber::filter::Directive {
        use tracing_subscriber::filter::{Directive, LevelFilter as TracingLevel};
        match level {
            LevelFilter::Off => Directive::from(TracingLevel::OFF),
            LevelFilter::Error => Directive::from(tracing::Level::ERROR),
            LevelFilter::Warn => Directive::from(tracing::Level::WARN),
            LevelFilter::Info => Directive::from(tracing::Level::INFO),
            LevelFilter::Debug => Directive::from(tracing::Level::DEBUG),
            LevelFilter::Trace => Directive::from(tracing::Level::TRACE),
        }
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    /// 当前实例的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 本次初始化是否挂载了进度指示器层
    pub fn spinner_attached(&self) -> bool {
        self.spinner_attached
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE
            .get()
            .map(|state| state.lock().unwrap_or_else(|p| p.into_inner()).initialized)
            .unwrap_or(false)
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE.get().and_then(|state| {
            state
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .current_config
                .clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryWriter;
    use crate::spinner::{NoopSpinner, SpinnerSlot};

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("warning").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("CRIT").unwrap(), LevelFilter::Error);
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert!(matches!(
            parse_level("loud"),
            Err(ConfigError::InvalidLogLevel { .. })
        ));
    }

    #[test]
    fn test_parse_level_numbers() {
        assert_eq!(parse_level("50").unwrap(), LevelFilter::Error);
        assert_eq!(parse_level("30").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("20").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level("10").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("5").unwrap(), LevelFilter::Trace);
    }

    #[test]
    fn test_is_verbose() {
        assert!(is_verbose(LevelFilter::Info));
        assert!(is_verbose(LevelFilter::Debug));
        assert!(!is_verbose(LevelFilter::Warn));
        assert!(!is_verbose(LevelFilter::Error));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Full);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    fn stream_config(level: LevelFilter) -> (LogConfig, MemoryWriter) {
        let out = MemoryWriter::new();
        let stream: SharedWriter = Arc::new(Mutex::new(Box::new(out.clone())));
        let config = LogConfig {
            level,
            target: LogTarget::Stream(stream),
            format: LogFormat::Compact,
            ansi: false,
            module_levels: HashMap::new(),
        };
        (config, out)
    }

    #[test]
    fn test_log_target_path() {
        assert!(LogTarget::Stderr.path().is_none());
        let target = LogTarget::File(PathBuf::from("worker.log"));
        assert_eq!(target.path(), Some(&PathBuf::from("worker.log")));

        let (config, _) = stream_config(LevelFilter::Warn);
        assert!(config.target.path().is_none());
        assert_eq!(config.target, config.target.clone());
        assert_ne!(config.target, LogTarget::Stderr);
    }

    #[test]
    fn test_stream_target_receives_records() {
        let (config, out) = stream_config(LevelFilter::Info);
        let subscriber = LoggingSystem::build_subscriber(&config, None).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("written to stream");
            tracing::debug!("below threshold");
        });

        let contents = out.contents();
        assert!(contents.contains("written to stream"));
        assert!(!contents.contains("below threshold"));
    }

    #[test]
    fn test_spinner_sees_every_record_while_output_is_filtered() {
        let (config, out) = stream_config(LevelFilter::Warn);
        let slot = Arc::new(SpinnerSlot::active(Arc::new(NoopSpinner)));
        let subscriber =
            LoggingSystem::build_subscriber(&config, Some(SpinnerLayer::new(slot.clone())))
                .unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("record-debug");
            tracing::info!("record-info");
            tracing::warn!("record-warn");
        });

        assert_eq!(slot.ticks(), 3);
        let contents = out.contents();
        assert!(contents.contains("record-warn"));
        assert!(!contents.contains("record-info"));
        assert!(!contents.contains("record-debug"));
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    #[serial_test::serial(global_logging)]
    fn test_setup_logging_is_idempotent() {
        let first = LoggingSystem::setup_logging(LogConfig::default(), None);
        assert!(first.is_ok());
        assert!(LoggingSystem::is_initialized());

        let second = LoggingSystem::setup_logging(LogConfig::default(), None).unwrap();
        assert!(!second.spinner_attached());
        assert!(LoggingSystem::current_config().is_some());
    }
}
