//! Service Worker 主程序入口
//!
//! 以独立应用运行启动器：加载配置、构造 Worker，直到收到退出信号

use anyhow::{Context, Result};
use clap::Parser;
use service_worker::cli::Args;
use service_worker::config::{
    get_default_config_path, validate_settings, SettingsLoader, TomlSettingsLoader, WorkerSettings,
};
use service_worker::core::{StandaloneApp, Worker};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let args = Args::parse();

    // 日志系统由 Worker 在切换工作目录之后初始化，这里只能写标准错误
    if let Err(e) = run(args).await {
        eprintln!("service-worker: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = load_settings(&args).await?;

    let app = Arc::new(StandaloneApp::new(settings.app_id.clone()));
    let worker = Worker::builder(app)
        .settings(settings)
        .build()
        .context("构造 Worker 失败")?;

    worker.run().await.context("Worker 运行失败")
}

/// 加载配置文件并叠加命令行参数
///
/// 显式指定的配置文件必须存在；未指定时默认路径不存在则使用内置默认值。
async fn load_settings(args: &Args) -> Result<WorkerSettings> {
    let loader = TomlSettingsLoader::new(true);

    let mut settings = match &args.config {
        Some(path) => loader
            .load_from_file(path)
            .await
            .with_context(|| format!("加载配置文件失败: {}", path.display()))?,
        None => {
            let path = get_default_config_path();
            if path.exists() {
                loader
                    .load_from_file(&path)
                    .await
                    .with_context(|| format!("加载配置文件失败: {}", path.display()))?
            } else {
                WorkerSettings::default()
            }
        }
    };

    args.apply(&mut settings);
    validate_settings(&settings).context("配置验证失败")?;
    Ok(settings)
}
