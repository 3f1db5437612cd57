//! 命令行参数定义
//!
//! 使用clap定义启动器的命令行接口，每个选项都可以通过 `SERVICE_WORKER_*` 环境变量设置

use crate::config::WorkerSettings;
use clap::Parser;
use std::path::PathBuf;

/// Service Worker - 多服务进程启动器
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "service-worker",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SERVICE_WORKER_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 应用标识
    #[arg(long, value_name = "ID", help = "应用标识", env = "SERVICE_WORKER_APP_ID")]
    pub app_id: Option<String>,

    /// 调试模式
    #[arg(short, long, help = "启用调试模式（开启阻塞检测）", env = "SERVICE_WORKER_DEBUG")]
    pub debug: bool,

    /// 安静模式
    #[arg(short, long, help = "不向标准输出打印任何内容", env = "SERVICE_WORKER_QUIET")]
    pub quiet: bool,

    /// 日志级别
    #[arg(
        short = 'l',
        long,
        value_name = "LEVEL",
        help = "日志级别（名称或数值，如 info、20）",
        env = "SERVICE_WORKER_LOGLEVEL"
    )]
    pub loglevel: Option<String>,

    /// 日志文件
    #[arg(
        long,
        value_name = "FILE",
        help = "日志文件，默认输出到标准错误",
        env = "SERVICE_WORKER_LOGFILE"
    )]
    pub logfile: Option<PathBuf>,

    /// 日志格式
    #[arg(
        long,
        value_name = "FORMAT",
        help = "日志格式（full、compact、json）",
        env = "SERVICE_WORKER_LOGFORMAT"
    )]
    pub logformat: Option<String>,

    /// 阻塞检测阈值
    #[arg(
        long,
        value_name = "SECONDS",
        help = "阻塞检测阈值（秒）",
        env = "SERVICE_WORKER_BLOCKING_TIMEOUT"
    )]
    pub blocking_timeout: Option<f64>,

    /// 工作目录
    #[arg(
        long,
        value_name = "DIR",
        help = "工作目录",
        env = "SERVICE_WORKER_WORKDIR"
    )]
    pub workdir: Option<PathBuf>,

    /// 网站实现
    #[arg(
        long,
        value_name = "NAME",
        help = "网站实现名称",
        env = "SERVICE_WORKER_WEBSITE"
    )]
    pub website: Option<String>,

    /// 网站绑定地址
    #[arg(
        long,
        value_name = "ADDR",
        help = "网站绑定地址",
        env = "SERVICE_WORKER_WEB_BIND"
    )]
    pub web_bind: Option<String>,

    /// 网站端口
    #[arg(
        short = 'p',
        long,
        value_name = "PORT",
        help = "网站端口",
        env = "SERVICE_WORKER_WEB_PORT"
    )]
    pub web_port: Option<u16>,

    /// 横幅中显示的网站地址
    #[arg(
        long,
        value_name = "URL",
        help = "横幅中显示的网站地址",
        env = "SERVICE_WORKER_WEB_TRANSPORT"
    )]
    pub web_transport: Option<String>,
}

impl Args {
    /// 把命令行参数叠加到配置上，命令行优先
    pub fn apply(&self, settings: &mut WorkerSettings) {
        if let Some(app_id) = &self.app_id {
            settings.app_id = app_id.clone();
        }
        settings.debug |= self.debug;
        settings.quiet |= self.quiet;
        if let Some(loglevel) = &self.loglevel {
            settings.loglevel = Some(loglevel.clone());
        }
        if let Some(logfile) = &self.logfile {
            settings.logfile = Some(logfile.clone());
        }
        if let Some(logformat) = &self.logformat {
            settings.logformat = logformat.clone();
        }
        if let Some(timeout) = self.blocking_timeout {
            settings.blocking_timeout = timeout;
        }
        if let Some(workdir) = &self.workdir {
            settings.workdir = Some(workdir.clone());
        }
        if let Some(website) = &self.website {
            settings.website = website.clone();
        }
        if let Some(web_bind) = &self.web_bind {
            settings.web_bind = web_bind.clone();
        }
        if let Some(web_port) = self.web_port {
            settings.web_port = web_port;
        }
        if let Some(web_transport) = &self.web_transport {
            settings.web_transport = Some(web_transport.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_options() {
        let args = Args::try_parse_from([
            "service-worker",
            "--app-id",
            "orders",
            "-l",
            "debug",
            "--web-port",
            "8080",
            "--debug",
        ])
        .unwrap();

        assert_eq!(args.app_id.as_deref(), Some("orders"));
        assert_eq!(args.loglevel.as_deref(), Some("debug"));
        assert_eq!(args.web_port, Some(8080));
        assert!(args.debug);
        assert!(!args.quiet);
    }

    #[test]
    fn test_apply_overrides_only_given_options() {
        let mut settings = WorkerSettings {
            app_id: "from-file".to_string(),
            web_port: 7000,
            ..Default::default()
        };
        let args = Args {
            loglevel: Some("info".to_string()),
            quiet: true,
            ..Default::default()
        };

        args.apply(&mut settings);
        assert_eq!(settings.app_id, "from-file");
        assert_eq!(settings.web_port, 7000);
        assert_eq!(settings.loglevel.as_deref(), Some("info"));
        assert!(settings.quiet);
    }
}
