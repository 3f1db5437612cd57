//! Service Worker - 多服务进程启动器
//!
//! 把内嵌网站、辅助服务和主应用组装成一个受监管的整体：
//! - 固定的启动顺序 `[网站, 辅助服务..., 应用]`，失败时逆序停止
//! - 启动前切换工作目录，之后才初始化日志
//! - 启动横幅、进程标题和终端进度指示器
//! - 启动完成通知，调试模式下开启事件循环阻塞检测

pub mod banner;
pub mod beacon;
pub mod cli;
pub mod config;
pub mod console;
pub mod core;
pub mod error;
pub mod logging;
pub mod process;
pub mod spinner;
pub mod watchdog;
pub mod web;

// 重新导出主要类型
pub use crate::core::{Application, Service, Worker, WorkerBuilder};
pub use beacon::{Beacon, BeaconRegistry};
pub use config::WorkerSettings;
pub use error::{Result, WorkerError};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
