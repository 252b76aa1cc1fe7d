use serde::Serialize;
use std::collections::HashSet;

use super::state_machine::SessionState;
use crate::instance::ServerInstance;

/// 목록 조회용 뷰. `instance.status` 는 폴링 결과로 덮어써진 값입니다.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: ServerInstance,
    pub state: SessionState,
}

/// 레지스트리 레코드와 세션 목록 한 번을 합칩니다. 저장된 상태 힌트는 무시하고
/// `live_sessions` 포함 여부만 봅니다.
pub fn reconcile(instances: Vec<ServerInstance>, live_sessions: &[String]) -> Vec<InstanceView> {
    let live: HashSet<&str> = live_sessions.iter().map(String::as_str).collect();
    instances
        .into_iter()
        .map(|mut instance| {
            let state = SessionState::observed(live.contains(instance.session_name.as_str()));
            instance.status = state.as_status();
            InstanceView { instance, state }
        })
        .collect()
}
