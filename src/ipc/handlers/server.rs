use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::super::IPCServer;
use crate::supervisor::{CreateRequest, SupervisorError};

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

/// GET /api/servers - 등록된 서버 목록 + 실시간 상태
pub async fn list_servers(State(state): State<IPCServer>) -> Result<impl IntoResponse, SupervisorError> {
    let servers = state.supervisor.list_servers().await?;
    Ok(Json(json!({ "servers": servers })))
}

/// POST /api/server/create - 원격 디렉토리 준비 후 등록
pub async fn create_server(
    State(state): State<IPCServer>,
    Json(payload): Json<CreateRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    tracing::info!(
        "Creating server: {} ({} {} {})",
        payload.name,
        payload.version,
        payload.server_type.as_deref().unwrap_or("vanilla"),
        payload.ram.as_deref().unwrap_or("default"),
    );
    let server = state.supervisor.create_server(payload).await?;
    Ok(Json(json!({ "success": true, "server": server })))
}

/// POST /api/server/:id/start
pub async fn start_server(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, SupervisorError> {
    Ok(Json(state.supervisor.start_server(&id).await?))
}

/// POST /api/server/:id/stop
pub async fn stop_server(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, SupervisorError> {
    Ok(Json(state.supervisor.stop_server(&id).await?))
}

/// POST /api/server/:id/restart
pub async fn restart_server(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, SupervisorError> {
    Ok(Json(state.supervisor.restart_server(&id).await?))
}

/// POST /api/server/:id/kill - 강제 종료
pub async fn kill_server(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, SupervisorError> {
    Ok(Json(state.supervisor.kill_server(&id).await?))
}

/// DELETE /api/server/:id - 원격 정리는 best-effort, 등록 해제는 항상 수행
pub async fn delete_server(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, SupervisorError> {
    Ok(Json(state.supervisor.delete_server(&id).await?))
}

/// POST /api/server/:id/command - 콘솔 입력
pub async fn send_command(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
    Json(payload): Json<CommandRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    Ok(Json(state.supervisor.send_command(&id, &payload.command).await?))
}

/// GET /api/server/:id/logs?lines=N
pub async fn get_logs(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, SupervisorError> {
    let logs = state.supervisor.get_logs(&id, query.lines).await?;
    Ok(Json(json!({ "logs": logs })))
}
