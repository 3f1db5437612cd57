//! Worker 启动器
//!
//! 把网站、辅助服务和主应用组装成一个整体，按 `[网站, 辅助服务..., 应用]`
//! 的顺序启动，并负责工作目录、日志、横幅、进度指示器和启动完成通知。

use crate::banner::{self, BannerContext};
use crate::beacon::Beacon;
use crate::config::WorkerSettings;
use crate::console::{Console, SharedWriter};
use crate::core::app::{Application, Sensor, SensorSet, StartupHandler};
use crate::core::sequencer::prepare_environment;
use crate::core::service::{Service, ServiceChain, ServiceRef};
use crate::error::{ConfigError, Result, WorkerError};
use crate::logging::{is_verbose, LogConfig, LogTarget, LoggingSystem};
use crate::process::{self, set_process_title};
use crate::spinner::{select_spinner, SpinnerLayer, SpinnerSlot};
use crate::watchdog::Watchdog;
use crate::web::{Website, WebsiteArgs, WebsiteFactory};
use futures::FutureExt;
use log::LevelFilter;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 启动顺序中的一项
#[derive(Clone)]
pub enum Dependency {
    /// 内嵌网站，第一次访问时才构造
    Website,
    /// 辅助服务
    Service(Arc<dyn Service>),
    /// 主应用
    App,
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Website => f.write_str("Website"),
            Dependency::Service(service) => write!(f, "Service({})", service.label()),
            Dependency::App => f.write_str("App"),
        }
    }
}

/// Worker 构造器
pub struct WorkerBuilder {
    app: Arc<dyn Application>,
    services: Vec<Arc<dyn Service>>,
    sensors: Vec<Arc<dyn Sensor>>,
    settings: WorkerSettings,
    factory: Option<Arc<dyn WebsiteFactory>>,
    loop_handle: Option<Handle>,
    stdout: Option<Box<dyn Write + Send>>,
    stderr: Option<Box<dyn Write + Send>>,
    log_stream: Option<Box<dyn Write + Send>>,
}

impl WorkerBuilder {
    /// 以主应用开始构造
    pub fn new(app: Arc<dyn Application>) -> Self {
        Self {
            app,
            services: Vec::new(),
            sensors: Vec::new(),
            settings: WorkerSettings::default(),
            factory: None,
            loop_handle: None,
            stdout: None,
            stderr: None,
            log_stream: None,
        }
    }

    /// 追加一个辅助服务
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// 追加多个辅助服务，保持给定顺序
    pub fn services<I>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Service>>,
    {
        self.services.extend(services);
        self
    }

    /// 追加一个传感器
    pub fn sensor(mut self, sensor: Arc<dyn Sensor>) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 指定网站工厂，未指定时按配置中的名称解析
    pub fn website_factory(mut self, factory: Arc<dyn WebsiteFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 指定事件循环，未指定时使用调用方所在的运行时
    pub fn loop_handle(mut self, handle: Handle) -> Self {
        self.loop_handle = Some(handle);
        self
    }

    pub fn stdout(mut self, stdout: Box<dyn Write + Send>) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn stderr(mut self, stderr: Box<dyn Write + Send>) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// 日志写入已打开的输出流，优先于配置中的日志文件
    pub fn log_stream(mut self, stream: Box<dyn Write + Send>) -> Self {
        self.log_stream = Some(stream);
        self
    }

    /// 构造 Worker
    ///
    /// 先完成所有可能失败的检查，再依次：订阅启动完成通知、把应用的监控节点
    /// 挂到 Worker 下、把传感器合并到应用、固定启动顺序。失败时应用保持原样。
    /// 不做任何网络或文件系统操作。
    pub fn build(self) -> Result<Worker> {
        let settings = self.settings;

        if self.app.id().trim().is_empty() {
            return Err(ConfigError::ValidationError("应用标识不能为空".to_string()).into());
        }

        let level = settings.level()?;
        let mut log_config = settings.log_config()?;
        let workdir = resolve_workdir(settings.workdir.as_deref())?;
        let factory = match self.factory {
            Some(factory) => factory,
            None => settings.website_factory()?,
        };

        let mut console = Console::stdio(settings.quiet);
        if let Some(stdout) = self.stdout {
            console.set_stdout(stdout);
        }
        if let Some(stderr) = self.stderr {
            console.set_stderr(stderr);
            log_config.ansi = false;
        }
        if let Some(stream) = self.log_stream {
            let stream: SharedWriter = Arc::new(Mutex::new(stream));
            log_config.target = LogTarget::Stream(stream);
            log_config.ansi = false;
        }

        let spinner = if settings.quiet || is_verbose(level) {
            Arc::new(SpinnerSlot::disabled())
        } else {
            Arc::new(SpinnerSlot::active(select_spinner(&console)))
        };

        self.app.beacon().check_reattach()?;
        self.app.check_startup_subscription()?;

        let watchdog = Arc::new(Mutex::new(None));
        let completion = Completion {
            app: Arc::downgrade(&self.app),
            spinner: spinner.clone(),
            console: console.clone(),
            debug: settings.debug,
            blocking_timeout: settings.blocking_timeout(),
            loop_handle: self.loop_handle.clone(),
            watchdog: watchdog.clone(),
        };
        self.app.on_startup_finished(completion.into_handler())?;

        let beacon = self.app.beacon().registry().root("worker");
        self.app.beacon().reattach(&beacon)?;

        let sensors = SensorSet::new();
        sensors.extend(self.sensors);
        let added = self.app.sensors().extend(sensors.snapshot());
        debug!("合并了 {} 个传感器到应用 {}", added, self.app.id());

        let mut dependencies = Vec::with_capacity(self.services.len() + 2);
        dependencies.push(Dependency::Website);
        dependencies.extend(self.services.iter().cloned().map(Dependency::Service));
        dependencies.push(Dependency::App);

        Ok(Worker {
            app: self.app,
            services: self.services,
            sensors,
            settings,
            level,
            log_config,
            workdir,
            beacon,
            spinner,
            console,
            factory,
            loop_handle: self.loop_handle,
            website: Mutex::new(None),
            dependencies,
            chain: tokio::sync::Mutex::new(ServiceChain::new()),
            started: AtomicBool::new(false),
            watchdog,
        })
    }
}

/// 解析为绝对路径，只做词法处理
fn resolve_workdir(workdir: Option<&Path>) -> std::result::Result<PathBuf, ConfigError> {
    let invalid = |path: &Path| ConfigError::InvalidWorkdir {
        path: path.display().to_string(),
    };
    match workdir {
        Some(path) if path.as_os_str().is_empty() => Err(invalid(path)),
        Some(path) => std::path::absolute(path).map_err(|_| invalid(path)),
        None => std::env::current_dir().map_err(|_| invalid(Path::new("."))),
    }
}

/// 启动完成回调持有的状态
///
/// 只持有应用的弱引用，应用不会因为回调而无法释放。
struct Completion {
    app: Weak<dyn Application>,
    spinner: Arc<SpinnerSlot>,
    console: Console,
    debug: bool,
    blocking_timeout: Duration,
    loop_handle: Option<Handle>,
    watchdog: Arc<Mutex<Option<Watchdog>>>,
}

impl Completion {
    fn into_handler(self) -> StartupHandler {
        Box::new(move || self.run().boxed())
    }

    async fn run(self) {
        if let Some(app) = self.app.upgrade() {
            app.ready().await;
        }

        if self.debug {
            let handle = self.loop_handle.or_else(|| Handle::try_current().ok());
            match handle {
                Some(handle) => {
                    let watchdog = Watchdog::spawn(&handle, self.blocking_timeout);
                    debug!("阻塞检测已开启，阈值 {:?}", watchdog.timeout());
                    *self.watchdog.lock().unwrap_or_else(|p| p.into_inner()) = Some(watchdog);
                }
                None => debug!("没有可用的事件循环，跳过阻塞检测"),
            }
        }

        if self.spinner.finish() {
            self.console.say("ready- ^");
        } else {
            info!("Ready");
        }
    }
}

/// 进程级别的启动器
///
/// 一个进程只应有一个 Worker 驱动启动流程。
pub struct Worker {
    app: Arc<dyn Application>,
    services: Vec<Arc<dyn Service>>,
    sensors: SensorSet,
    settings: WorkerSettings,
    level: LevelFilter,
    log_config: LogConfig,
    workdir: PathBuf,
    beacon: Beacon,
    spinner: Arc<SpinnerSlot>,
    console: Console,
    factory: Arc<dyn WebsiteFactory>,
    loop_handle: Option<Handle>,
    website: Mutex<Option<Arc<dyn Website>>>,
    dependencies: Vec<Dependency>,
    chain: tokio::sync::Mutex<ServiceChain>,
    started: AtomicBool,
    watchdog: Arc<Mutex<Option<Watchdog>>>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("app", &self.app.id())
            .field("dependencies", &self.dependencies)
            .field("workdir", &self.workdir)
            .field("level", &self.level)
            .field("spinner", &self.spinner)
            .finish()
    }
}

impl Worker {
    /// 以主应用开始构造
    pub fn builder(app: Arc<dyn Application>) -> WorkerBuilder {
        WorkerBuilder::new(app)
    }

    pub fn app(&self) -> &Arc<dyn Application> {
        &self.app
    }

    /// 辅助服务，保持构造时的顺序
    pub fn services(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    /// 固定的启动顺序
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// 启动顺序中各项的名称
    pub fn dependency_labels(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .map(|dependency| match dependency {
                Dependency::Website => "website".to_string(),
                Dependency::Service(service) => service.label(),
                Dependency::App => self.app.label(),
            })
            .collect()
    }

    pub fn beacon(&self) -> &Beacon {
        &self.beacon
    }

    /// 构造时提供的传感器
    pub fn sensors(&self) -> &SensorSet {
        &self.sensors
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn spinner(&self) -> &SpinnerSlot {
        &self.spinner
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// 生效的日志级别
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// 配置的日志输出目标
    pub fn log_target(&self) -> &LogTarget {
        &self.log_config.target
    }

    /// 网站是否已经构造
    pub fn is_website_built(&self) -> bool {
        self.website
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// 阻塞检测是否已经开启
    pub fn is_watchdog_armed(&self) -> bool {
        self.watchdog
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// 内嵌网站，第一次访问时构造，之后总是返回同一个实例
    ///
    /// 没有配置事件循环且不在运行时内调用时返回 [`WorkerError::NotReady`]。
    /// 工厂失败不会被缓存，下次访问会重试。
    pub fn website(&self) -> Result<Arc<dyn Website>> {
        let mut slot = self.website.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(website) = slot.as_ref() {
            return Ok(website.clone());
        }

        let handle = match &self.loop_handle {
            Some(handle) => handle.clone(),
            None => Handle::try_current()
                .map_err(|e| WorkerError::NotReady(format!("没有可用的事件循环: {}", e)))?,
        };

        let website = self.factory.build(WebsiteArgs {
            app: self.app.clone(),
            bind: self.settings.web_bind.clone(),
            port: self.settings.web_port,
            handle,
            beacon: self.beacon.clone(),
        })?;
        debug!("网站已构造: {}", website.label());

        *slot = Some(website.clone());
        Ok(website)
    }

    /// 当前运行时状态的横幅快照，每次调用重新生成
    pub fn banner_context(&self) -> Result<BannerContext> {
        let website = self.website()?;
        let web = website.web();
        let transport = self.app.transport();

        let flavor = match &self.loop_handle {
            Some(handle) => handle.runtime_flavor(),
            None => Handle::try_current()
                .map_err(|e| WorkerError::NotReady(format!("没有可用的事件循环: {}", e)))?
                .runtime_flavor(),
        };
        let (loop_repr, loop_variant) = banner::loop_identity(flavor);

        Ok(BannerContext {
            app_id: self.app.id().to_string(),
            web_url: self.settings.web_transport.clone().unwrap_or(web.url),
            web_driver_version: web.driver_version,
            log_target: self.log_target().clone(),
            loglevel: self.level,
            pid: std::process::id(),
            hostname: process::hostname(),
            loop_repr,
            loop_variant,
            transport_url: transport.url,
            transport_driver_version: transport.driver_version,
            store: self.app.store(),
            version: crate::VERSION.to_string(),
            system: std::env::consts::OS.to_string(),
            interpreter: "rust".to_string(),
            interpreter_version: option_env!("CARGO_PKG_RUST_VERSION")
                .filter(|v| !v.is_empty())
                .unwrap_or("stable")
                .to_string(),
        })
    }

    /// 启动 Worker，只能调用一次
    ///
    /// 依次：切换工作目录、初始化日志、设置进程标题、打印横幅、按顺序启动依赖。
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted);
        }

        prepare_environment(&self.workdir)?;
        self.setup_logging()?;

        set_process_title("init");
        let banner = banner::render(&self.banner_context()?);
        self.console.say(&banner);
        self.console.say_raw("^ ");

        let services = self.resolve_dependencies()?;
        let mut chain = self.chain.lock().await;
        chain.start_all(services).await
    }

    /// 逆序停止已启动的依赖，并关闭阻塞检测
    pub async fn stop(&self) -> Result<()> {
        if let Some(watchdog) = self
            .watchdog
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            watchdog.stop();
        }

        self.chain.lock().await.stop_all().await;
        info!("Worker 已停止");
        Ok(())
    }

    /// 启动并运行，直到收到 SIGINT/SIGTERM 后停止
    pub async fn run(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        process::setup_signal_handlers(shutdown_tx).await?;

        if let Err(e) = self.start().await {
            self.console.carp(&format!("启动失败: {}", e));
            return Err(e);
        }

        process::wait_for_shutdown(shutdown_rx).await;
        self.stop().await
    }

    /// 日志级别比 WARN 更详细时，进度指示器在挂载任何层之前被关闭
    fn setup_logging(&self) -> Result<()> {
        if self.console.is_quiet() || is_verbose(self.level) {
            self.spinner.disable();
        }

        let layer = self
            .spinner
            .is_active()
            .then(|| SpinnerLayer::new(self.spinner.clone()));
        let system = LoggingSystem::setup_logging(self.effective_log_config(), layer)?;
        debug!(
            "日志系统已就绪，级别 {}，进度指示器 {}",
            self.level,
            if system.spinner_attached() { "已挂载" } else { "未挂载" }
        );
        Ok(())
    }

    /// 标准错误目标改为 Console 的标准错误，和 `carp` 写到同一个流
    fn effective_log_config(&self) -> LogConfig {
        let mut config = self.log_config.clone();
        if config.target == LogTarget::Stderr {
            config.target = LogTarget::Stream(self.console.stderr());
        }
        config
    }

    fn resolve_dependencies(&self) -> Result<Vec<Arc<dyn Service>>> {
        self.dependencies
            .iter()
            .map(|dependency| match dependency {
                Dependency::Website => Ok(ServiceRef::shared(self.website()?)),
                Dependency::Service(service) => Ok(service.clone()),
                Dependency::App => Ok(ServiceRef::shared(self.app.clone())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryWriter;
    use crate::core::app::StandaloneApp;
    use serial_test::serial;

    fn capture_worker(builder: impl FnOnce(WorkerBuilder) -> WorkerBuilder) -> Worker {
        let app: Arc<dyn Application> = Arc::new(StandaloneApp::new("log-target-test"));
        builder(Worker::builder(app)).build().unwrap()
    }

    #[test]
    fn test_stderr_logs_go_through_console() {
        let err = MemoryWriter::new();
        let worker = capture_worker(|b| b.stderr(Box::new(err.clone())));

        let config = worker.effective_log_config();
        assert_eq!(config.target, LogTarget::Stream(worker.console().stderr()));
        assert!(!config.ansi);
        assert_eq!(worker.log_target(), &LogTarget::Stderr);

        let subscriber = LoggingSystem::build_subscriber(&config, None).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("routed to console stderr");
        });
        assert!(err.contents().contains("routed to console stderr"));
    }

    #[test]
    fn test_log_stream_overrides_logfile() {
        let stream = MemoryWriter::new();
        let settings = WorkerSettings {
            logfile: Some(PathBuf::from("ignored.log")),
            ..Default::default()
        };
        let worker = capture_worker(|b| b.settings(settings).log_stream(Box::new(stream.clone())));

        let config = worker.effective_log_config();
        assert!(matches!(config.target, LogTarget::Stream(_)));
        assert!(config.target.path().is_none());

        let subscriber = LoggingSystem::build_subscriber(&config, None).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("routed to caller stream");
        });
        assert!(stream.contents().contains("routed to caller stream"));
    }

    #[test]
    #[serial(cwd)]
    fn test_resolve_workdir() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(resolve_workdir(None).unwrap(), cwd);
        assert_eq!(resolve_workdir(Some(Path::new("sub"))).unwrap(), cwd.join("sub"));
        let absolute = cwd.join("srv");
        assert_eq!(resolve_workdir(Some(&absolute)).unwrap(), absolute);
        assert!(matches!(
            resolve_workdir(Some(Path::new(""))),
            Err(ConfigError::InvalidWorkdir { .. })
        ));
    }
}
