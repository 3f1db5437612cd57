//! 基于 axum 的内嵌网站
//!
//! 提供应用信息、健康检查和监控树三个只读端点

use super::{WebInfo, Website, WebsiteArgs, WebsiteFactory};
use crate::beacon::{Beacon, BeaconTree};
use crate::core::service::Service;
use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// axum 驱动版本
pub const DRIVER_VERSION: &str = "axum-0.8";

/// 网站共享状态
#[derive(Clone)]
struct WebState {
    app_id: String,
    root: Beacon,
    started_at: chrono::DateTime<chrono::Utc>,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

/// axum 网站
pub struct AxumWebsite {
    app_id: String,
    bind: String,
    port: u16,
    handle: Handle,
    root: Beacon,
    beacon: Beacon,
    running: Mutex<Option<Running>>,
}

impl AxumWebsite {
    /// 根据构造参数创建网站，网站节点挂在 Worker 节点下
    pub fn new(args: WebsiteArgs) -> Self {
        Self {
            app_id: args.app.id().to_string(),
            bind: args.bind,
            port: args.port,
            handle: args.handle,
            beacon: args.beacon.new_child("website"),
            root: args.beacon,
            running: Mutex::new(None),
        }
    }

    /// 实际监听的地址，未启动时为 `None`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|running| running.local_addr)
    }

    fn router(&self) -> Router {
        let state = WebState {
            app_id: self.app_id.clone(),
            root: self.root.clone(),
            started_at: chrono::Utc::now(),
        };

        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/beacons", get(beacons))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }
}

async fn index(State(state): State<WebState>) -> Json<Value> {
    Json(json!({
        "id": state.app_id,
        "version": crate::VERSION,
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn beacons(State(state): State<WebState>) -> Json<BeaconTree> {
    Json(state.root.snapshot())
}

#[async_trait]
impl Service for AxumWebsite {
    fn label(&self) -> String {
        "website".to_string()
    }

    fn beacon(&self) -> &Beacon {
        &self.beacon
    }

    async fn start(&self) -> Result<()> {
        if self.lock().is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.bind, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| WorkerError::Service(format!("绑定 {addr} 失败: {e}")))?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router();
        let task = self.handle.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("网站已启动: http://{}", local_addr);
        *self.lock() = Some(Running {
            shutdown,
            task,
            local_addr,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let running = self.lock().take();
        let Some(running) = running else {
            return Ok(());
        };

        let _ = running.shutdown.send(());
        match running.task.await {
            Ok(Ok(())) => info!("网站已关闭"),
            Ok(Err(e)) => error!("网站运行失败: {}", e),
            Err(e) => error!("网站任务异常退出: {}", e),
        }
        Ok(())
    }
}

impl Website for AxumWebsite {
    fn web(&self) -> WebInfo {
        let port = self
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.port);
        let host = match self.bind.as_str() {
            "0.0.0.0" | "::" | "" => "localhost",
            other => other,
        };
        WebInfo {
            url: format!("http://{host}:{port}"),
            driver_version: DRIVER_VERSION.to_string(),
        }
    }
}

/// axum 网站工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct AxumWebsiteFactory;

impl WebsiteFactory for AxumWebsiteFactory {
    fn build(&self, args: WebsiteArgs) -> Result<Arc<dyn Website>> {
        Ok(Arc::new(AxumWebsite::new(args)))
    }
}
