mod handlers;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::supervisor::Supervisor;
use handlers::{server, versions};

/// IPC 서버 상태
#[derive(Clone)]
pub struct IPCServer {
    pub supervisor: Arc<Supervisor>,
    pub listen_addr: String,
}

impl IPCServer {
    pub fn new(supervisor: Arc<Supervisor>, listen_addr: &str) -> Self {
        Self {
            supervisor,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::index))
            .route("/api/versions", get(versions::list_versions))
            .route("/api/servers", get(server::list_servers))
            .route("/api/server/create", post(server::create_server))
            .route("/api/server/:id", axum::routing::delete(server::delete_server))
            .route("/api/server/:id/start", post(server::start_server))
            .route("/api/server/:id/stop", post(server::stop_server))
            .route("/api/server/:id/restart", post(server::restart_server))
            .route("/api/server/:id/kill", post(server::kill_server))
            .route("/api/server/:id/command", post(server::send_command))
            .route("/api/server/:id/logs", get(server::get_logs))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(self.clone())
    }

    /// `shutdown` 이 완료되면 진행 중인 요청을 마치고 종료합니다.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!("IPC HTTP server starting on {}", self.listen_addr);
        let router = self.router();

        // TCP 리스너
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
