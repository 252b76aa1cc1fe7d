use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::super::IPCServer;

const DEFAULT_LIMIT: usize = 30;

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    #[serde(default = "default_releases_only")]
    pub releases_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_releases_only() -> bool {
    true
}

/// GET /api/versions - 사용 가능한 버전 목록 (SSH 불필요, 실패 시 고정 목록)
pub async fn list_versions(
    State(state): State<IPCServer>,
    Query(query): Query<VersionQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).max(1);
    let versions = state.supervisor.list_versions(query.releases_only, limit).await;
    Json(json!({ "versions": versions }))
}
