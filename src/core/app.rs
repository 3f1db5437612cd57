//! 应用服务模块
//!
//! 主应用的接口、启动完成通知和传感器集合

use crate::beacon::Beacon;
use crate::core::service::Service;
use crate::error::{Result, SubscriptionError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 启动完成回调
pub type StartupHandler = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// 传输层信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportInfo {
    /// 传输层地址
    pub url: String,
    /// 驱动版本
    pub driver_version: String,
}

/// 运行时事件观察者，内部实现不由启动器关心
pub trait Sensor: Send + Sync {
    /// 传感器名称
    fn name(&self) -> &str;
}

/// 按插入顺序保存的传感器集合，以实例身份去重，只增不减
#[derive(Default)]
pub struct SensorSet {
    sensors: Mutex<Vec<Arc<dyn Sensor>>>,
}

impl fmt::Debug for SensorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|sensor| sensor.name().to_string())
            .collect();
        f.debug_struct("SensorSet").field("sensors", &names).finish()
    }
}

impl SensorSet {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加传感器，已存在时返回 `false`
    pub fn add(&self, sensor: Arc<dyn Sensor>) -> bool {
        let mut sensors = self.lock();
        if sensors.iter().any(|existing| Arc::ptr_eq(existing, &sensor)) {
            return false;
        }
        sensors.push(sensor);
        true
    }

    /// 批量添加，返回新增数量
    pub fn extend<I>(&self, sensors: I) -> usize
    where
        I: IntoIterator<Item = Arc<dyn Sensor>>,
    {
        sensors.into_iter().filter(|s| self.add(s.clone())).count()
    }

    /// 是否包含该传感器实例
    pub fn contains(&self, sensor: &Arc<dyn Sensor>) -> bool {
        self.lock().iter().any(|existing| Arc::ptr_eq(existing, sensor))
    }

    /// 传感器数量
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 当前所有传感器
    pub fn snapshot(&self) -> Vec<Arc<dyn Sensor>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Sensor>>> {
        self.sensors.lock().unwrap_or_else(|p| p.into_inner())
    }
}

enum SignalState {
    Empty,
    Subscribed(StartupHandler),
    Fired,
}

/// 单订阅者、只触发一次的启动完成通知
///
/// 应用实现内嵌此结构，在自身启动完成后调用 [`StartupSignal::fire`]。
pub struct StartupSignal {
    state: Mutex<SignalState>,
}

impl Default for StartupSignal {
    fn default() -> Self {
        Self {
            state: Mutex::new(SignalState::Empty),
        }
    }
}

impl fmt::Debug for StartupSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupSignal")
            .field("subscribed", &self.is_subscribed())
            .field("fired", &self.has_fired())
            .finish()
    }
}

impl StartupSignal {
    /// 创建空的通知
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册唯一的订阅者
    pub fn subscribe(&self, handler: StartupHandler) -> std::result::Result<(), SubscriptionError> {
        let mut state = self.lock();
        match *state {
            SignalState::Empty => {
                *state = SignalState::Subscribed(handler);
                Ok(())
            }
            SignalState::Subscribed(_) => Err(SubscriptionError::AlreadySubscribed),
            SignalState::Fired => Err(SubscriptionError::AlreadyFired),
        }
    }

    /// 检查是否还能注册订阅者，不改变状态
    pub fn check(&self) -> std::result::Result<(), SubscriptionError> {
        match *self.lock() {
            SignalState::Empty => Ok(()),
            SignalState::Subscribed(_) => Err(SubscriptionError::AlreadySubscribed),
            SignalState::Fired => Err(SubscriptionError::AlreadyFired),
        }
    }

    /// 发出通知，只有第一次调用会执行订阅者
    ///
    /// 返回是否执行了订阅者。
    pub async fn fire(&self) -> bool {
        let previous = std::mem::replace(&mut *self.lock(), SignalState::Fired);
        match previous {
            SignalState::Subscribed(handler) => {
                handler().await;
                true
            }
            SignalState::Empty => {
                debug!("启动完成通知没有订阅者");
                false
            }
            SignalState::Fired => false,
        }
    }

    /// 是否已有订阅者
    pub fn is_subscribed(&self) -> bool {
        matches!(*self.lock(), SignalState::Subscribed(_))
    }

    /// 是否已经发出
    pub fn has_fired(&self) -> bool {
        matches!(*self.lock(), SignalState::Fired)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// 主应用接口
#[async_trait]
pub trait Application: Service {
    /// 应用标识
    fn id(&self) -> &str;

    /// 传输层信息
    fn transport(&self) -> TransportInfo;

    /// 存储标识
    fn store(&self) -> String;

    /// 传感器集合
    fn sensors(&self) -> &SensorSet;

    /// 注册启动完成回调，最多一个订阅者
    fn on_startup_finished(
        &self,
        handler: StartupHandler,
    ) -> std::result::Result<(), SubscriptionError>;

    /// 检查 `on_startup_finished` 是否会成功，不注册任何回调
    fn check_startup_subscription(&self) -> std::result::Result<(), SubscriptionError>;

    /// 启动完成回调执行前等待的就绪检查
    async fn ready(&self) {}
}

/// 不做任何工作的独立应用
///
/// 启动后立即发出启动完成通知，用于单独运行启动器。
pub struct StandaloneApp {
    id: String,
    beacon: Beacon,
    sensors: SensorSet,
    startup: StartupSignal,
}

impl StandaloneApp {
    /// 在全局监控树中创建应用
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            beacon: Beacon::root(id.clone()),
            id,
            sensors: SensorSet::new(),
            startup: StartupSignal::new(),
        }
    }
}

#[async_trait]
impl Service for StandaloneApp {
    fn label(&self) -> String {
        self.id.clone()
    }

    fn beacon(&self) -> &Beacon {
        &self.beacon
    }

    async fn start(&self) -> Result<()> {
        info!("应用 {} 已启动", self.id);
        self.startup.fire().await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("应用 {} 已停止", self.id);
        Ok(())
    }
}

#[async_trait]
impl Application for StandaloneApp {
    fn id(&self) -> &str {
        &self.id
    }

    fn transport(&self) -> TransportInfo {
        TransportInfo {
            url: "memory://".to_string(),
            driver_version: format!("memory-{}", crate::VERSION),
        }
    }

    fn store(&self) -> String {
        "memory://".to_string()
    }

    fn sensors(&self) -> &SensorSet {
        &self.sensors
    }

    fn on_startup_finished(
        &self,
        handler: StartupHandler,
    ) -> std::result::Result<(), SubscriptionError> {
        self.startup.subscribe(handler)
    }

    fn check_startup_subscription(&self) -> std::result::Result<(), SubscriptionError> {
        self.startup.check()
    }
}
