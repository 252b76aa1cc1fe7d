//! Supervisor 전용 에러 타입. 에러 종류를 구분하여 IPC 핸들러에서
//! 적절한 HTTP 상태 코드를 반환할 수 있게 합니다.

use axum::http::StatusCode;

use super::session::SessionError;
use crate::instance::StoreError;
use crate::remote::RemoteError;

/// 라이프사이클 작업 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("Server '{0}' is not running")]
    NotRunning(String),

    #[error("SSH connection failed: {0}")]
    Connection(String),

    #[error("Remote command failed: {0}")]
    RemoteCommand(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Registry error: {0}")]
    Storage(String),
}

impl SupervisorError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotRunning(_) => StatusCode::CONFLICT,
            Self::Connection(_) | Self::RemoteCommand(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::NotRunning(_) => "NOT_RUNNING",
            Self::Connection(_) => "CONNECTION_FAILED",
            Self::RemoteCommand(_) => "REMOTE_COMMAND_FAILED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<RemoteError> for SupervisorError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Connection { .. } => Self::Connection(e.to_string()),
            other => Self::RemoteCommand(other.to_string()),
        }
    }
}

impl From<SessionError> for SupervisorError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotRunning(name) => Self::NotRunning(name),
            SessionError::InvalidName(_) | SessionError::InvalidInput(_) => Self::InvalidRequest(e.to_string()),
            SessionError::Remote(remote) => remote.into(),
        }
    }
}

impl From<StoreError> for SupervisorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::InstanceNotFound(id),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// axum 핸들러에서 SupervisorError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
