#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use scribe_rs::{
    files::FileStore,
    init_env,
    task::{RegistryConfig, TaskRegistry},
    transcribe::WhisperRunner,
    utils::logger,
    web, AppContext, MODELS_PATH, TASK_CAPACITY, TASK_RETENTION_SECS, TEMP_PATH, UPLOAD_PATH,
    WHISPER_PATH,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    let _guard = logger::init("./logs".to_string())?;
    init_env();

    info!("Starting transcription service...");

    info!("Initializing file store...");
    let files = Arc::new(FileStore::new(PathBuf::from(UPLOAD_PATH.as_str()))?);

    info!("Initializing task registry...");
    let runner = Arc::new(WhisperRunner::new(
        PathBuf::from(MODELS_PATH.as_str()),
        PathBuf::from(TEMP_PATH.as_str()),
        PathBuf::from(WHISPER_PATH.as_str()),
    ));
    let registry = Arc::new(TaskRegistry::new(
        runner,
        RegistryConfig { capacity: *TASK_CAPACITY },
    ));

    let ctx = Arc::new(AppContext {
        registry: registry.clone(),
        files: files.clone(),
    });

    // 定期清理：过期的终态任务和陈旧的上传文件
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let evicted = registry.evict_terminal(*TASK_RETENTION_SECS).await;
            if evicted > 0 {
                info!("evicted {} terminal tasks", evicted);
            }
            let removed = files.clean_old_files(*TASK_RETENTION_SECS as u64).await;
            if removed > 0 {
                info!("removed {} stale uploads", removed);
            }
        }
    });

    // 配置服务器地址
    let addr = SocketAddr::from(([127, 0, 0, 1], 7200));
    info!("Starting HTTP server at http://{}", addr);

    // 启动 HTTP 服务器
    match web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
