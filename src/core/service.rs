//! 服务生命周期模块
//!
//! 定义服务接口，以及按顺序启动、逆序停止的服务链

use crate::beacon::Beacon;
use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// 长期运行的服务
#[async_trait]
pub trait Service: Send + Sync {
    /// 用于日志和错误信息的名称
    fn label(&self) -> String;

    /// 监控树节点
    fn beacon(&self) -> &Beacon;

    /// 启动服务，返回时服务已就绪
    async fn start(&self) -> Result<()>;

    /// 停止服务
    async fn stop(&self) -> Result<()>;
}

/// 将 `Arc<dyn Application>` 等子接口对象当作 `dyn Service` 使用的适配器
pub struct ServiceRef<T: ?Sized>(pub Arc<T>);

impl<T: Service + ?Sized + 'static> ServiceRef<T> {
    /// 包装为 `Arc<dyn Service>`
    pub fn shared(inner: Arc<T>) -> Arc<dyn Service> {
        Arc::new(ServiceRef(inner))
    }
}

#[async_trait]
impl<T: Service + ?Sized> Service for ServiceRef<T> {
    fn label(&self) -> String {
        self.0.label()
    }

    fn beacon(&self) -> &Beacon {
        self.0.beacon()
    }

    async fn start(&self) -> Result<()> {
        self.0.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.0.stop().await
    }
}

/// 按声明顺序启动的服务链
///
/// 第 N+1 个服务只在第 N 个服务启动完成后才开始启动。
/// 任何一个启动失败时，已启动的服务按逆序停止，然后返回错误。
#[derive(Default)]
pub struct ServiceChain {
    started: Vec<Arc<dyn Service>>,
}

impl ServiceChain {
    /// 创建空的服务链
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次启动所有服务
    pub async fn start_all(&mut self, services: Vec<Arc<dyn Service>>) -> Result<()> {
        for service in services {
            let label = service.label();
            debug!("启动服务: {}", label);

            if let Err(e) = service.start().await {
                error!("服务 {} 启动失败: {}", label, e);
                self.stop_all().await;
                return Err(WorkerError::dependency(label, e));
            }

            info!("服务已启动: {}", label);
            self.started.push(service);
        }
        Ok(())
    }

    /// 逆序停止所有已启动的服务，停止失败只记录日志
    pub async fn stop_all(&mut self) {
        while let Some(service) = self.started.pop() {
            let label = service.label();
            debug!("停止服务: {}", label);
            if let Err(e) = service.stop().await {
                error!("服务 {} 停止失败: {}", label, e);
            }
        }
    }

    /// 已启动服务的名称，按启动顺序
    pub fn started_labels(&self) -> Vec<String> {
        self.started.iter().map(|s| s.label()).collect()
    }

    /// 是否没有已启动的服务
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::BeaconRegistry;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        beacon: Beacon,
        fail: bool,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &str, fail: bool, events: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Service> {
            Arc::new(Self {
                name: name.to_string(),
                beacon: BeaconRegistry::new().root(name),
                fail,
                events: events.clone(),
            })
        }
    }

    #[async_trait]
    impl Service for Recorder {
        fn label(&self) -> String {
            self.name.clone()
        }

        fn beacon(&self) -> &Beacon {
            &self.beacon
        }

        async fn start(&self) -> Result<()> {
            if self.fail {
                return Err(WorkerError::Service(format!("{} refused", self.name)));
            }
            self.events.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.events.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_in_order_and_stop_in_reverse() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ServiceChain::new();
        chain
            .start_all(vec![
                Recorder::new("a", false, &events),
                Recorder::new("b", false, &events),
            ])
            .await
            .unwrap();
        assert_eq!(chain.started_labels(), vec!["a", "b"]);

        chain.stop_all().await;
        assert!(chain.is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn test_failure_rolls_back_started_services() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ServiceChain::new();
        let err = chain
            .start_all(vec![
                Recorder::new("a", false, &events),
                Recorder::new("b", false, &events),
                Recorder::new("c", true, &events),
                Recorder::new("d", false, &events),
            ])
            .await
            .unwrap_err();

        match err {
            WorkerError::DependencyStart { service, .. } => assert_eq!(service, "c"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(chain.is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }
}
