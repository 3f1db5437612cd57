//! 终端进度指示器模块
//!
//! 每条日志记录推进一次指示器动画。指示器只有两个状态：
//! `Active`（持有动画句柄）和 `Disabled`（空）。`Disabled` 是终态，
//! 进程生命周期内不会再回到 `Active`。

use crate::console::{Console, SharedWriter};
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// 动画帧
const FRAMES: [char; 4] = ['-', '\\', '|', '/'];

/// 进度指示器能力
pub trait Spinner: Send + Sync {
    /// 推进一帧
    fn tick(&self);

    /// 结束动画并清除当前帧
    fn finish(&self);
}

/// 终端动画实现
pub struct TerminalSpinner {
    out: SharedWriter,
    phase: AtomicUsize,
}

impl TerminalSpinner {
    /// 绑定到输出流
    pub fn new(out: SharedWriter) -> Self {
        Self {
            out,
            phase: AtomicUsize::new(0),
        }
    }
}

impl Spinner for TerminalSpinner {
    fn tick(&self) {
        let phase = self.phase.fetch_add(1, Ordering::Relaxed);
        let frame = FRAMES[phase % FRAMES.len()];
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if phase > 0 {
            let _ = write!(out, "\x08");
        }
        let _ = write!(out, "{frame}");
        let _ = out.flush();
    }

    fn finish(&self) {
        if self.phase.load(Ordering::Relaxed) == 0 {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        let _ = write!(out, "\x08 \x08");
        let _ = out.flush();
    }
}

/// 无输出实现，终端不可用时使用
#[derive(Debug, Default)]
pub struct NoopSpinner;

impl Spinner for NoopSpinner {
    fn tick(&self) {}

    fn finish(&self) {}
}

/// 根据终端能力选择实现
pub fn select_spinner(console: &Console) -> Arc<dyn Spinner> {
    if console.is_terminal() {
        Arc::new(TerminalSpinner::new(console.stdout()))
    } else {
        Arc::new(NoopSpinner)
    }
}

enum SpinnerState {
    Active(Arc<dyn Spinner>),
    Disabled,
}

/// 进度指示器状态槽
pub struct SpinnerSlot {
    state: Mutex<SpinnerState>,
    ticks: AtomicU64,
}

impl std::fmt::Debug for SpinnerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinnerSlot")
            .field("active", &self.is_active())
            .field("ticks", &self.ticks())
            .finish()
    }
}

impl SpinnerSlot {
    /// 创建处于 `Active` 状态的槽
    pub fn active(spinner: Arc<dyn Spinner>) -> Self {
        Self {
            state: Mutex::new(SpinnerState::Active(spinner)),
            ticks: AtomicU64::new(0),
        }
    }

    /// 创建处于 `Disabled` 状态的槽
    pub fn disabled() -> Self {
        Self {
            state: Mutex::new(SpinnerState::Disabled),
            ticks: AtomicU64::new(0),
        }
    }

    /// 是否处于 `Active` 状态
    pub fn is_active(&self) -> bool {
        matches!(*self.lock(), SpinnerState::Active(_))
    }

    /// 推进一帧，`Disabled` 时什么也不做
    pub fn tick(&self) {
        if let SpinnerState::Active(spinner) = &*self.lock() {
            spinner.tick();
            self.ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `Active` 状态下累计的帧数
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// 直接进入 `Disabled`，不清理输出
    pub fn disable(&self) {
        *self.lock() = SpinnerState::Disabled;
    }

    /// 结束动画并进入 `Disabled`
    ///
    /// 只有从 `Active` 转换时返回 `true`。
    pub fn finish(&self) -> bool {
        let previous = std::mem::replace(&mut *self.lock(), SpinnerState::Disabled);
        match previous {
            SpinnerState::Active(spinner) => {
                spinner.finish();
                true
            }
            SpinnerState::Disabled => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpinnerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// 每条日志记录推进一次指示器的 tracing 层
///
/// 不做级别过滤，过滤由格式化层自己的过滤器完成。
#[derive(Debug, Clone)]
pub struct SpinnerLayer {
    slot: Arc<SpinnerSlot>,
}

impl SpinnerLayer {
    /// 绑定到状态槽
    pub fn new(slot: Arc<SpinnerSlot>) -> Self {
        Self { slot }
    }
}

impl<S: Subscriber> Layer<S> for SpinnerLayer {
    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
        self.slot.tick();
    }
}
