//! 事件循环阻塞检测
//!
//! 后台任务以固定间隔休眠并测量唤醒延迟，延迟超过阈值即视为事件循环被阻塞。
//! 检测结果只作为警告日志输出，从不终止进程。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 默认阻塞检测阈值
pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(10);

/// 检测间隔上限
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// 阻塞检测器
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    stalls: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// 在指定运行时上启动检测任务
    pub fn spawn(handle: &Handle, timeout: Duration) -> Self {
        let stalls = Arc::new(AtomicU64::new(0));
        let interval = check_interval(timeout);
        let counter = stalls.clone();

        let task = handle.spawn(async move {
            debug!("阻塞检测已启动，阈值 {:?}，间隔 {:?}", timeout, interval);
            loop {
                let started = Instant::now();
                tokio::time::sleep(interval).await;
                let lag = started.elapsed().saturating_sub(interval);
                if lag >= timeout {
                    counter.fetch_add(1, Ordering::Relaxed);
                    warn!("事件循环被阻塞了 {:?}（阈值 {:?}）", lag, timeout);
                }
            }
        });

        Self {
            timeout,
            stalls,
            task,
        }
    }

    /// 检测阈值
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 已检测到的阻塞次数
    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    /// 停止检测任务
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 检测间隔：阈值的四分之一，最多一秒，至少一毫秒
fn check_interval(timeout: Duration) -> Duration {
    (timeout / 4).clamp(Duration::from_millis(1), MAX_CHECK_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_interval_bounds() {
        assert_eq!(check_interval(Duration::from_secs(10)), Duration::from_secs(1));
        assert_eq!(check_interval(Duration::from_millis(100)), Duration::from_millis(25));
        assert_eq!(check_interval(Duration::ZERO), Duration::from_millis(1));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_detects_blocked_loop() {
        let watchdog = Watchdog::spawn(&Handle::current(), Duration::from_millis(50));

        // 让检测任务先进入休眠
        tokio::time::sleep(Duration::from_millis(5)).await;
        std::thread::sleep(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(watchdog.stalls() >= 1);
        watchdog.stop();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_idle_loop_reports_nothing() {
        let watchdog = Watchdog::spawn(&Handle::current(), Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(watchdog.stalls(), 0);
    }
}
