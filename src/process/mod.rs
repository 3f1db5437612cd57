//! 进程级别的辅助功能
//!
//! 进程标题、主机名和信号处理

pub mod signal_handler;
pub mod title;

pub use signal_handler::{setup_signal_handlers, wait_for_shutdown};
pub use title::{set_process_title, PROCESS_IDENT};

/// 获取主机名，失败时返回 `localhost`
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
    }
}
