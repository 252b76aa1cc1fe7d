pub mod server;
pub mod versions;

use axum::{response::IntoResponse, Json};
use serde_json::json;

/// GET / - 데몬 상태
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Minecraft remote manager",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
