//! 配置数据结构定义
//!
//! 定义 Worker 的配置结构体和验证逻辑

use crate::error::ConfigError;
use crate::logging::{parse_level, LogConfig, LogFormat, LogTarget, DEFAULT_LEVEL};
use crate::watchdog::DEFAULT_BLOCKING_TIMEOUT;
use crate::web::{self, WebsiteFactory};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Worker 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSettings {
    /// 应用标识
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// 调试模式，启用后在启动完成时开启阻塞检测
    #[serde(default)]
    pub debug: bool,
    /// 安静模式，不向标准输出打印任何内容
    #[serde(default)]
    pub quiet: bool,
    /// 日志级别，名称或数值
    pub loglevel: Option<String>,
    /// 日志文件，未设置时输出到标准错误
    pub logfile: Option<PathBuf>,
    /// 日志格式
    #[serde(default = "default_logformat")]
    pub logformat: String,
    /// 阻塞检测阈值（秒）
    #[serde(default = "default_blocking_timeout")]
    pub blocking_timeout: f64,
    /// 工作目录，启动时切换到此目录
    pub workdir: Option<PathBuf>,
    /// 网站实现名称
    #[serde(default = "default_website")]
    pub website: String,
    /// 网站绑定地址
    #[serde(default = "default_web_bind")]
    pub web_bind: String,
    /// 网站端口
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    /// 横幅中显示的网站地址，未设置时由网站自己给出
    pub web_transport: Option<String>,
    /// 模块级别日志控制
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

// 默认值函数
fn default_app_id() -> String {
    crate::APP_NAME.to_string()
}
fn default_logformat() -> String {
    "full".to_string()
}
fn default_blocking_timeout() -> f64 {
    DEFAULT_BLOCKING_TIMEOUT.as_secs_f64()
}
fn default_website() -> String {
    web::DEFAULT_WEBSITE.to_string()
}
fn default_web_bind() -> String {
    web::DEFAULT_WEB_BIND.to_string()
}
fn default_web_port() -> u16 {
    web::DEFAULT_WEB_PORT
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            debug: false,
            quiet: false,
            loglevel: None,
            logfile: None,
            logformat: default_logformat(),
            blocking_timeout: default_blocking_timeout(),
            workdir: None,
            website: default_website(),
            web_bind: default_web_bind(),
            web_port: default_web_port(),
            web_transport: None,
            module_levels: HashMap::new(),
        }
    }
}

impl WorkerSettings {
    /// 生效的日志级别，未设置时为 warn
    pub fn level(&self) -> Result<LevelFilter, ConfigError> {
        match &self.loglevel {
            Some(level) => parse_level(level),
            None => Ok(DEFAULT_LEVEL),
        }
    }

    /// 日志格式
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.logformat.parse()
    }

    /// 日志输出目标
    pub fn log_target(&self) -> LogTarget {
        match &self.logfile {
            Some(path) => LogTarget::File(path.clone()),
            None => LogTarget::Stderr,
        }
    }

    /// 阻塞检测阈值
    pub fn blocking_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.blocking_timeout).unwrap_or(DEFAULT_BLOCKING_TIMEOUT)
    }

    /// 构造日志配置
    pub fn log_config(&self) -> Result<LogConfig, ConfigError> {
        let mut module_levels = HashMap::new();
        for (module, level) in &self.module_levels {
            module_levels.insert(module.clone(), parse_level(level)?);
        }
        Ok(LogConfig {
            level: self.level()?,
            target: self.log_target(),
            format: self.log_format()?,
            ansi: self.logfile.is_none(),
            module_levels,
        })
    }

    /// 解析网站工厂
    pub fn website_factory(&self) -> Result<Arc<dyn WebsiteFactory>, ConfigError> {
        web::resolve_factory(&self.website)
    }
}

/// 配置验证函数
///
/// # 参数
/// * `settings` - 要验证的配置
///
/// # 返回
/// * `Result<(), ConfigError>` - 验证结果
pub fn validate_settings(settings: &WorkerSettings) -> Result<(), ConfigError> {
    if settings.app_id.trim().is_empty() {
        return Err(ConfigError::ValidationError("应用标识不能为空".to_string()));
    }

    settings.level()?;
    settings.log_format()?;
    for level in settings.module_levels.values() {
        parse_level(level)?;
    }

    if !settings.blocking_timeout.is_finite() || settings.blocking_timeout <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "阻塞检测阈值必须为正数: {}",
            settings.blocking_timeout
        )));
    }

    if settings.web_bind.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "网站绑定地址不能为空".to_string(),
        ));
    }

    if let Some(workdir) = &settings.workdir {
        if workdir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidWorkdir {
                path: String::new(),
            });
        }
    }

    settings.website_factory()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = WorkerSettings::default();
        assert!(validate_settings(&settings).is_ok());
        assert_eq!(settings.level().unwrap(), LevelFilter::Warn);
        assert_eq!(settings.web_port, 6066);
        assert_eq!(settings.web_bind, "0.0.0.0");
        assert_eq!(settings.log_target(), LogTarget::Stderr);
        assert_eq!(settings.blocking_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let settings = WorkerSettings {
            loglevel: Some("chatty".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(ConfigError::InvalidLogLevel { .. })
        ));
    }

    #[test]
    fn test_unknown_website_rejected() {
        let settings = WorkerSettings {
            website: "nginx".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(ConfigError::UnknownWebsite { .. })
        ));
    }

    #[test]
    fn test_non_positive_blocking_timeout_rejected() {
        let settings = WorkerSettings {
            blocking_timeout: 0.0,
            ..Default::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_log_config_from_settings() {
        let settings = WorkerSettings {
            loglevel: Some("20".to_string()),
            logfile: Some(PathBuf::from("worker.log")),
            logformat: "json".to_string(),
            ..Default::default()
        };
        let config = settings.log_config().unwrap();
        assert_eq!(config.level, LevelFilter::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.target, LogTarget::File(PathBuf::from("worker.log")));
        assert!(!config.ansi);
    }
}
