//! 核心模块
//!
//! 服务接口、主应用接口、启动前环境准备和 Worker 启动器

pub mod app;
pub mod sequencer;
pub mod service;
pub mod worker;

// 重新导出主要类型
pub use app::{
    Application, Sensor, SensorSet, StandaloneApp, StartupHandler, StartupSignal, TransportInfo,
};
pub use sequencer::prepare_environment;
pub use service::{Service, ServiceChain, ServiceRef};
pub use worker::{Dependency, Worker, WorkerBuilder};
