//! 信号处理模块
//!
//! 将 SIGINT/SIGTERM 转换为关闭广播

use crate::error::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 设置信号处理器
pub async fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    #[cfg(unix)]
    {
        setup_unix_signals(shutdown_tx).await
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("接收到 Ctrl+C，开始关闭...");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => error!("监听中断信号失败: {e}"),
            }
        });
        Ok(())
    }
}

/// Unix/Linux系统信号处理
#[cfg(unix)]
async fn setup_unix_signals(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    use futures::stream::StreamExt;

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    tokio::spawn(async move {
        let mut signals = signals;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGINT | SIGTERM => {
                    info!("接收到信号 {signal}，开始关闭...");
                    if let Err(e) = shutdown_tx.send(()) {
                        error!("发送关闭信号失败: {e}");
                    }
                    break;
                }
                _ => {
                    warn!("接收到未处理的信号: {signal}");
                }
            }
        }
        handle.close();
    });

    Ok(())
}

/// 等待关闭信号
pub async fn wait_for_shutdown(mut shutdown_rx: broadcast::Receiver<()>) {
    match shutdown_rx.recv().await {
        Ok(()) => {
            info!("接收到关闭信号，开始停止服务...");
        }
        Err(e) => {
            error!("等待关闭信号时发生错误: {e}");
        }
    }
}
