use serde::Serialize;

use super::session::{StartOutcome, StopOutcome};
use crate::instance::InstanceStatus;

/// 인스턴스별 세션 상태. 저장하지 않고 매번 폴링/직전 명령으로부터 유도합니다.
/// 이후 조회에서는 `Running` 과 `Absent` 만 관측됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Absent,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    pub fn observed(running: bool) -> Self {
        if running {
            Self::Running
        } else {
            Self::Absent
        }
    }

    /// 상태 힌트로 저장할 값
    pub fn as_status(&self) -> InstanceStatus {
        match self {
            Self::Absent => InstanceStatus::Offline,
            Self::Starting => InstanceStatus::Starting,
            Self::Running => InstanceStatus::Online,
            Self::Stopping => InstanceStatus::Stopping,
        }
    }
}

impl From<StartOutcome> for SessionState {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Starting => Self::Starting,
            StartOutcome::AlreadyRunning => Self::Running,
        }
    }
}

impl From<StopOutcome> for SessionState {
    fn from(outcome: StopOutcome) -> Self {
        match outcome {
            StopOutcome::Stopping => Self::Stopping,
            StopOutcome::NotRunning => Self::Absent,
        }
    }
}
