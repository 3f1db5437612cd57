//! 错误处理模块
//!
//! 定义启动器的统一错误类型

use std::path::PathBuf;
use thiserror::Error;

/// Worker 启动器的主要错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    /// 配置相关错误，在任何依赖启动之前抛出
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 依赖服务启动失败
    #[error("依赖服务 {service} 启动失败: {source}")]
    DependencyStart {
        service: String,
        #[source]
        source: Box<WorkerError>,
    },

    /// 工作目录切换失败
    #[error("切换工作目录失败: {path}: {source}")]
    EnvironmentPrep {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 事件循环尚未就绪
    #[error("尚未就绪: {0}")]
    NotReady(String),

    /// 监控树错误
    #[error("监控树错误: {0}")]
    Beacon(#[from] BeaconError),

    /// 启动完成通知订阅错误
    #[error("订阅错误: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Worker 只能启动一次
    #[error("Worker 已经启动过")]
    AlreadyStarted,

    /// 服务自身报告的错误
    #[error("服务错误: {0}")]
    Service(String),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl WorkerError {
    /// 包装为依赖启动失败
    pub fn dependency(service: impl Into<String>, source: WorkerError) -> Self {
        WorkerError::DependencyStart {
            service: service.into(),
            source: Box::new(source),
        }
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 无法解析的网站实现
    #[error("未知的网站实现: {name}")]
    UnknownWebsite { name: String },

    /// 无法解析为绝对路径的工作目录
    #[error("无效的工作目录: {path}")]
    InvalidWorkdir { path: String },

    /// 无效的日志级别
    #[error("无效的日志级别: {value}")]
    InvalidLogLevel { value: String },

    /// 无效的日志格式
    #[error("无效的日志格式: {value}")]
    InvalidLogFormat { value: String },
}

/// 监控树错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeaconError {
    /// 节点已经重新挂载过
    #[error("节点 {node} 已经重新挂载过")]
    AlreadyAttached { node: String },

    /// 挂载会形成环
    #[error("挂载 {node} 到 {parent} 会形成环")]
    Cycle { node: String, parent: String },

    /// 节点不能挂载到自身
    #[error("节点 {node} 不能挂载到自身")]
    SelfParent { node: String },

    /// 节点属于不同的注册表
    #[error("节点属于不同的监控树注册表")]
    ForeignRegistry,
}

/// 启动完成通知订阅错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// 已存在订阅者
    #[error("启动完成通知已有订阅者")]
    AlreadySubscribed,

    /// 通知已经发出过
    #[error("启动完成通知已经发出")]
    AlreadyFired,
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_error_names_service() {
        let err = WorkerError::dependency("s1", WorkerError::Service("boom".to_string()));
        let message = err.to_string();
        assert!(message.contains("s1"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: WorkerError = ConfigError::UnknownWebsite {
            name: "nope".to_string(),
        }
        .into();
        assert!(matches!(err, WorkerError::Config(ConfigError::UnknownWebsite { .. })));
    }
}
