//! 内嵌网站端到端测试
//!
//! 启动真实的 axum 网站，通过 HTTP 访问诊断端点

use service_worker::config::WorkerSettings;
use service_worker::console::MemoryWriter;
use service_worker::core::{StandaloneApp, Worker};
use std::sync::Arc;

fn local_settings() -> WorkerSettings {
    WorkerSettings {
        app_id: "web-e2e".to_string(),
        web_bind: "127.0.0.1".to_string(),
        web_port: 0,
        ..Default::default()
    }
}

/// 深度优先收集监控树中的节点名称
fn names(tree: &serde_json::Value) -> Vec<String> {
    let mut collected = vec![tree["name"].as_str().unwrap_or_default().to_string()];
    if let Some(children) = tree["children"].as_array() {
        for child in children {
            collected.extend(names(child));
        }
    }
    collected
}

#[tokio::test]
async fn test_website_serves_diagnostics() {
    let settings = local_settings();
    let app = Arc::new(StandaloneApp::new(settings.app_id.clone()));
    let worker = Worker::builder(app)
        .settings(settings)
        .stdout(Box::new(MemoryWriter::new()))
        .build()
        .unwrap();

    worker.start().await.unwrap();
    let url = worker.website().unwrap().web().url;
    assert!(url.starts_with("http://127.0.0.1:"));
    assert!(!url.ends_with(":0"));

    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let health = client
        .get(format!("{url}/health"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(health, "OK");

    let index: serde_json::Value = client
        .get(format!("{url}/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(index["id"], "web-e2e");
    assert_eq!(index["version"], service_worker::VERSION);

    let tree: serde_json::Value = client
        .get(format!("{url}/beacons"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tree["name"], "worker");
    let all = names(&tree);
    assert!(all.contains(&"web-e2e".to_string()));
    assert!(all.contains(&"website".to_string()));

    worker.stop().await.unwrap();
    // 停止后网站不再报告实际监听的端口
    assert!(worker.website().unwrap().web().url.ends_with(":0"));
}
