//! 启动横幅模块
//!
//! 根据运行时快照渲染启动横幅，纯函数，不做任何IO。

use crate::logging::LogTarget;
use log::LevelFilter;
use tokio::runtime::RuntimeFlavor;

/// 横幅中的 ASCII 图案
pub const ART: &str = r"
   ___  ___ _ ____   __(_) ___ ___      __      _____  _ __| | _____ _ __
  / __|/ _ \ '__\ \ / /| |/ __/ _ \_____\ \ /\ / / _ \| '__| |/ / _ \ '__|
  \__ \  __/ |   \ V / | | (_|  __/_____|\ V  V / (_) | |  |   <  __/ |
  |___/\___|_|    \_/  |_|\___\___|       \_/\_/ \___/|_|  |_|\_\___|_|
";

/// 标识行中的名称标记
pub const ART_TAG: &str = "şervice-ωorker";

/// 日志写到标准错误时显示的占位符
pub const STDERR_PLACEHOLDER: &str = "-stderr-";

/// 日志写到调用方提供的输出流时显示的占位符
pub const STREAM_PLACEHOLDER: &str = "-stream-";

/// 多线程调度器的后缀标记
pub const MULTI_THREAD_VARIANT: &str = "multi_thread";

/// 横幅渲染所需的运行时快照
#[derive(Debug, Clone, PartialEq)]
pub struct BannerContext {
    /// 应用标识
    pub app_id: String,
    /// 网站地址
    pub web_url: String,
    /// 网站驱动版本
    pub web_driver_version: String,
    /// 日志输出目标
    pub log_target: LogTarget,
    /// 生效的日志级别
    pub loglevel: LevelFilter,
    /// 进程ID
    pub pid: u32,
    /// 主机名
    pub hostname: String,
    /// 事件循环的文本表示
    pub loop_repr: String,
    /// 事件循环实现变体，仅在非默认实现时为 `Some`
    pub loop_variant: Option<String>,
    /// 传输层地址
    pub transport_url: String,
    /// 传输层驱动版本
    pub transport_driver_version: String,
    /// 存储标识
    pub store: String,
    /// 包版本
    pub version: String,
    /// 操作系统名称
    pub system: String,
    /// 运行时名称
    pub interpreter: String,
    /// 运行时版本
    pub interpreter_version: String,
}

/// 日志级别的小写名称
pub fn level_name(level: LevelFilter) -> String {
    level.as_str().to_lowercase()
}

/// 日志输出目标在横幅中的显示
pub fn log_destination(target: &LogTarget) -> String {
    match target {
        LogTarget::Stderr => STDERR_PLACEHOLDER.to_string(),
        LogTarget::File(path) => path.display().to_string(),
        LogTarget::Stream(_) => STREAM_PLACEHOLDER.to_string(),
    }
}

/// 事件循环的文本表示和实现变体
///
/// 多线程调度器视为另一种高性能实现，带上变体标记。`#[tokio::main]`
/// 默认使用多线程调度器，所以二进制程序的横幅总是带有 `+multi_thread`；
/// 嵌入到 current_thread 运行时里的 Worker 不带标记。
pub fn loop_identity(flavor: RuntimeFlavor) -> (String, Option<String>) {
    match flavor {
        RuntimeFlavor::MultiThread => (
            format!("tokio({})", MULTI_THREAD_VARIANT),
            Some(MULTI_THREAD_VARIANT.to_string()),
        ),
        RuntimeFlavor::CurrentThread => ("tokio(current_thread)".to_string(), None),
        other => (format!("tokio({:?})", other), None),
    }
}

/// 渲染标识行
pub fn render_ident(ctx: &BannerContext) -> String {
    format!(
        "{} v{} {} ({} {} {}={})",
        ART_TAG,
        ctx.version,
        ctx.system,
        ctx.transport_driver_version,
        ctx.web_driver_version,
        ctx.interpreter,
        ctx.interpreter_version,
    )
}

/// 渲染完整横幅
pub fn render(ctx: &BannerContext) -> String {
    let logfile = log_destination(&ctx.log_target);
    let transport = match &ctx.loop_variant {
        Some(variant) => format!("{} +{}", ctx.transport_url, variant),
        None => ctx.transport_url.clone(),
    };

    format!(
        "{art}\n\
         {ident}\n\
         [ .id          -> {id}\n  \
         .web         -> {web}\n  \
         .log         -> {logfile} ({level})\n  \
         .pid         -> {pid}\n  \
         .hostname    -> {hostname}\n  \
         .loop        -> {loop_repr}\n  \
         .transport   -> {transport}\n  \
         .store       -> {store} ]",
        art = ART.trim_matches('\n'),
        ident = render_ident(ctx),
        id = ctx.app_id,
        web = ctx.web_url,
        logfile = logfile,
        level = level_name(ctx.loglevel),
        pid = ctx.pid,
        hostname = ctx.hostname,
        loop_repr = ctx.loop_repr,
        transport = transport,
        store = ctx.store,
    )
}
