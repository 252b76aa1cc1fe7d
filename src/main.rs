use mc_remote_core::{config, ipc, supervisor};

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("mc-remote-core v{} starting", env!("CARGO_PKG_VERSION"));

    let cfg = config::GlobalConfig::load()?;
    if let Err(e) = cfg.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e);
    }
    tracing::info!(
        "Managing servers under {} on {}@{}:{}",
        cfg.server.root_path,
        cfg.ssh.username,
        cfg.ssh.host,
        cfg.ssh.port
    );

    let supervisor = Arc::new(supervisor::Supervisor::from_config(&cfg)?);
    tracing::info!(
        "Registry: {} ({} servers)",
        supervisor.instance_store.file_path().display(),
        supervisor.instance_store.list().len()
    );

    let ipc_server = ipc::IPCServer::new(supervisor, &cfg.ipc.listen_addr);

    // Graceful shutdown: Ctrl+C 시 진행 중인 요청을 마치고 종료
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    if let Err(e) = ipc_server.start(shutdown).await {
        tracing::error!("IPC server error: {}", e);
        return Err(e);
    }

    tracing::info!("mc-remote-core shutting down");
    Ok(())
}
