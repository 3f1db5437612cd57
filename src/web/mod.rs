//! 内嵌网站模块
//!
//! 网站接口、工厂和按名称解析工厂的入口

use crate::beacon::Beacon;
use crate::core::app::Application;
use crate::core::service::Service;
use crate::error::{ConfigError, Result};
use std::sync::Arc;
use tokio::runtime::Handle;

pub mod server;

pub use server::{AxumWebsite, AxumWebsiteFactory};

/// 默认网站实现名称
pub const DEFAULT_WEBSITE: &str = "axum";

/// 默认绑定地址
pub const DEFAULT_WEB_BIND: &str = "0.0.0.0";

/// 默认端口
pub const DEFAULT_WEB_PORT: u16 = 6066;

/// 网站对外信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebInfo {
    /// 访问地址
    pub url: String,
    /// 驱动版本
    pub driver_version: String,
}

/// 内嵌网站
pub trait Website: Service {
    /// 访问地址与驱动版本
    fn web(&self) -> WebInfo;
}

/// 构造网站所需的参数
#[derive(Clone)]
pub struct WebsiteArgs {
    /// 主应用
    pub app: Arc<dyn Application>,
    /// 绑定地址
    pub bind: String,
    /// 端口
    pub port: u16,
    /// 运行时句柄
    pub handle: Handle,
    /// 上级监控树节点（Worker 的节点）
    pub beacon: Beacon,
}

/// 网站工厂
pub trait WebsiteFactory: Send + Sync {
    /// 构造网站实例
    fn build(&self, args: WebsiteArgs) -> Result<Arc<dyn Website>>;
}

impl<F> WebsiteFactory for F
where
    F: Fn(WebsiteArgs) -> Result<Arc<dyn Website>> + Send + Sync,
{
    fn build(&self, args: WebsiteArgs) -> Result<Arc<dyn Website>> {
        self(args)
    }
}

/// 按名称解析网站工厂
pub fn resolve_factory(name: &str) -> std::result::Result<Arc<dyn WebsiteFactory>, ConfigError> {
    match name.trim().to_lowercase().as_str() {
        "" | "default" | DEFAULT_WEBSITE => Ok(Arc::new(AxumWebsiteFactory)),
        _ => Err(ConfigError::UnknownWebsite {
            name: name.to_string(),
        }),
    }
}
