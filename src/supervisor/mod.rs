pub mod error;
pub mod locks;
pub mod reconcile;
pub mod session;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GlobalConfig;
use crate::instance::{is_valid_ram, is_valid_token, InstancePatch, InstanceStatus, InstanceStore, ServerInstance};
use crate::remote::{Connector, RemoteShell, SshConnector};
use crate::utils::shell_quote;
use crate::versions::VersionResolver;
pub use error::SupervisorError;
use locks::InstanceLocks;
use reconcile::{reconcile, InstanceView};
use session::{BackoffPolicy, SessionSupervisor, StartOutcome, StopOutcome};
use state_machine::SessionState;

pub const DEFAULT_LOG_LINES: usize = 50;
pub const MAX_LOG_LINES: usize = 1000;

/// POST /api/server/create 요청 본문
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub ram: Option<String>,
    #[serde(rename = "type", default)]
    pub server_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Starting,
    AlreadyRunning,
    Stopping,
    NotRunning,
    Restarting,
    Killed,
    Deleted,
    Sent,
}

/// 라이프사이클 명령 결과
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutcome {
    pub id: String,
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_kill: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl LifecycleOutcome {
    fn new(id: &str, status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            status,
            message: message.into(),
            forced_kill: None,
            warnings: Vec::new(),
            command: None,
        }
    }
}

/// 모든 작업이 공유하는 원격 경로 및 실행 파라미터
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub root_path: String,
    pub default_ram: String,
    pub min_heap: String,
    pub default_port: u16,
    pub stop_command: String,
    pub command_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl LifecycleSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            root_path: config.server.root_path.trim_end_matches('/').to_string(),
            default_ram: config.server.default_ram.clone(),
            min_heap: config.server.min_heap.clone(),
            default_port: config.server.default_port,
            stop_command: config.server.stop_command.clone(),
            command_timeout: config.ssh.command_timeout(),
            backoff: BackoffPolicy::from(&config.server.restart),
        }
    }

    /// `java` 실행 명령. -Xms 는 min_heap 과 ram 중 작은 값.
    pub fn launch_command(&self, ram: &str) -> String {
        let xms = match (heap_megabytes(&self.min_heap), heap_megabytes(ram)) {
            (Some(min), Some(max)) if min <= max => self.min_heap.as_str(),
            _ => ram,
        };
        format!("java -Xmx{} -Xms{} -jar server.jar nogui", ram, xms)
    }

    /// `rm -rf` 대상이 될 수 있는 경로인지 (루트 하위, `..` 없음)
    pub fn is_managed_path(&self, path: &str) -> bool {
        if self.root_path.is_empty() || path.split('/').any(|c| c == "..") {
            return false;
        }
        path.strip_prefix(&self.root_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| !rest.trim_matches('/').is_empty())
            .unwrap_or(false)
    }
}

fn heap_megabytes(spec: &str) -> Option<u64> {
    if !is_valid_ram(spec) {
        return None;
    }
    let (digits, unit) = spec.split_at(spec.len() - 1);
    let n: u64 = digits.parse().ok()?;
    Some(if unit == "G" { n * 1024 } else { n })
}

/// 라이프사이클 작업의 진입점. 작업마다 채널 하나를 열고 반드시 닫습니다.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    pub instance_store: InstanceStore,
    versions: VersionResolver,
    locks: InstanceLocks,
    settings: LifecycleSettings,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn Connector>,
        instance_store: InstanceStore,
        versions: VersionResolver,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            connector,
            instance_store,
            versions,
            locks: InstanceLocks::new(),
            settings,
        }
    }

    pub fn from_config(config: &GlobalConfig) -> anyhow::Result<Self> {
        let connector = SshConnector::new(config.ssh.clone());
        let store = InstanceStore::new(config.storage.servers_file());
        let versions = VersionResolver::from_config(&config.versions, &config.storage)?;
        Ok(Self::new(
            Arc::new(connector),
            store,
            versions,
            LifecycleSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    async fn open(&self) -> Result<Box<dyn RemoteShell>, SupervisorError> {
        self.connector.open().await.map_err(|e| {
            tracing::error!("Failed to open remote channel: {}", e);
            SupervisorError::from(e)
        })
    }

    fn find(&self, id: &str) -> Result<ServerInstance, SupervisorError> {
        self.instance_store
            .find(id)
            .ok_or_else(|| SupervisorError::InstanceNotFound(id.to_string()))
    }

    /// 상태 힌트 갱신. 실패해도 작업 결과는 유지.
    fn record_hint(&self, id: &str, state: SessionState) {
        if let Err(e) = self.instance_store.upsert(id, InstancePatch::status(state.as_status())) {
            tracing::warn!("Failed to record status hint for {}: {}", id, e);
        }
    }

    // ── list ─────────────────────────────────────────────

    /// 등록된 모든 인스턴스와 한 번의 `screen -list` 폴링 결과를 합칩니다.
    pub async fn list_servers(&self) -> Result<Vec<InstanceView>, SupervisorError> {
        let instances = self.instance_store.list();
        if instances.is_empty() {
            return Ok(Vec::new());
        }

        let mut shell = self.open().await?;
        let polled = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout)
            .list_sessions()
            .await;
        shell.close().await;

        let live = polled.unwrap_or_else(|e| {
            tracing::warn!("Session listing failed, reporting all servers offline: {}", e);
            Vec::new()
        });
        let views = reconcile(instances, &live);

        let hints: Vec<(String, InstanceStatus)> = views
            .iter()
            .map(|v| (v.instance.id.clone(), v.instance.status))
            .collect();
        if let Err(e) = self.instance_store.refresh_statuses(&hints) {
            tracing::warn!("Failed to refresh status hints: {}", e);
        }
        Ok(views)
    }

    // ── create ───────────────────────────────────────────

    /// 원격 호스트에 인스턴스 디렉토리를 준비한 뒤 등록합니다.
    /// 준비에 실패하면 아무것도 등록하지 않습니다.
    pub async fn create_server(&self, request: CreateRequest) -> Result<ServerInstance, SupervisorError> {
        let name = request.name.trim();
        if name.is_empty() || name.chars().count() > 64 || name.chars().any(char::is_control) {
            return Err(SupervisorError::InvalidRequest(format!("invalid server name '{}'", request.name)));
        }
        let version = request.version.trim();
        if !is_valid_token(version) {
            return Err(SupervisorError::InvalidRequest(format!("invalid version '{}'", request.version)));
        }
        let ram = request
            .ram
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(self.settings.default_ram.as_str())
            .to_uppercase();
        if !is_valid_ram(&ram) {
            return Err(SupervisorError::InvalidRequest(format!("invalid memory size '{}'", ram)));
        }
        let server_type = request
            .server_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("vanilla")
            .to_string();
        if !is_valid_token(&server_type) {
            return Err(SupervisorError::InvalidRequest(format!("invalid server type '{}'", server_type)));
        }
        if self.settings.root_path.is_empty() {
            return Err(SupervisorError::InvalidRequest("remote server root is not configured".into()));
        }

        let existing = self.instance_store.list();
        let port = self.settings.default_port;
        let instance = loop {
            let candidate = ServerInstance::new(name, version, &ram, &server_type, &self.settings.root_path, port);
            let clash = existing
                .iter()
                .any(|i| i.id == candidate.id || i.session_name == candidate.session_name || i.path == candidate.path);
            if !clash {
                break candidate;
            }
        };
        if existing.iter().any(|i| i.port == port) {
            tracing::warn!("Port {} is already assigned to another server; '{}' will share it", port, name);
        }

        let url = self.versions.resolve_download_url(version).await;
        tracing::info!("Creating server '{}' ({} {}) at {}", name, server_type, version, instance.path);

        let mut shell = self.open().await?;
        let provisioned = self.provision(shell.as_ref(), &instance, &url).await;
        if let Err(e) = &provisioned {
            tracing::error!("Provisioning '{}' failed: {}", instance.path, e);
            let cleanup = format!("rm -rf {}", shell_quote(&instance.path));
            if self.settings.is_managed_path(&instance.path) {
                if let Err(e) = shell.execute(&cleanup, self.settings.command_timeout).await {
                    tracing::warn!("Cleanup of {} failed: {}", instance.path, e);
                }
            }
        }
        shell.close().await;
        provisioned?;

        self.instance_store.add(instance.clone())?;
        tracing::info!("Server '{}' created with id {}", instance.name, instance.id);
        Ok(instance)
    }

    async fn provision(&self, shell: &dyn RemoteShell, instance: &ServerInstance, url: &str) -> Result<(), SupervisorError> {
        let dir = shell_quote(&instance.path);
        let commands = [
            format!("mkdir -p {}", dir),
            format!("cd {} && wget -q -O server.jar {}", dir, shell_quote(url)),
            format!("echo 'eula=true' > {}/eula.txt", dir),
        ];
        for command in &commands {
            tracing::debug!("provision: {}", command);
            shell
                .execute(command, self.settings.command_timeout)
                .await?
                .check(command)?;
        }
        Ok(())
    }

    // ── start / stop / restart / kill ────────────────────

    pub async fn start_server(&self, id: &str) -> Result<LifecycleOutcome, SupervisorError> {
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;
        let launch = self.launch_for(&instance)?;

        let mut shell = self.open().await?;
        let result = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout)
            .start(&instance.session_name, &instance.path, &launch)
            .await;
        shell.close().await;
        let outcome = result?;

        self.record_hint(id, SessionState::from(outcome));
        Ok(match outcome {
            StartOutcome::Starting => LifecycleOutcome::new(
                id,
                OutcomeStatus::Starting,
                format!("Server '{}' is starting", instance.name),
            ),
            StartOutcome::AlreadyRunning => LifecycleOutcome::new(
                id,
                OutcomeStatus::AlreadyRunning,
                format!("Server '{}' is already running", instance.name),
            ),
        })
    }

    pub async fn stop_server(&self, id: &str) -> Result<LifecycleOutcome, SupervisorError> {
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;

        let mut shell = self.open().await?;
        let result = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout)
            .stop(&instance.session_name, &self.settings.stop_command)
            .await;
        shell.close().await;
        let outcome = result?;

        self.record_hint(id, SessionState::from(outcome));
        Ok(match outcome {
            StopOutcome::Stopping => LifecycleOutcome::new(
                id,
                OutcomeStatus::Stopping,
                format!("Server '{}' is stopping", instance.name),
            ),
            StopOutcome::NotRunning => LifecycleOutcome::new(
                id,
                OutcomeStatus::NotRunning,
                format!("Server '{}' is not running", instance.name),
            ),
        })
    }

    pub async fn restart_server(&self, id: &str) -> Result<LifecycleOutcome, SupervisorError> {
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;
        let launch = self.launch_for(&instance)?;

        let mut shell = self.open().await?;
        let result = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout)
            .restart(
                &instance.session_name,
                &instance.path,
                &launch,
                &self.settings.stop_command,
                &self.settings.backoff,
            )
            .await;
        shell.close().await;
        let outcome = result?;

        self.record_hint(id, SessionState::from(outcome.start));
        let mut out = LifecycleOutcome::new(
            id,
            OutcomeStatus::Restarting,
            format!("Server '{}' is restarting", instance.name),
        );
        out.forced_kill = Some(outcome.forced_kill);
        Ok(out)
    }

    pub async fn kill_server(&self, id: &str) -> Result<LifecycleOutcome, SupervisorError> {
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;

        let mut shell = self.open().await?;
        let result = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout)
            .kill(&instance.session_name)
            .await;
        shell.close().await;
        result?;

        self.record_hint(id, SessionState::Absent);
        Ok(LifecycleOutcome::new(
            id,
            OutcomeStatus::Killed,
            format!("Server '{}' was killed", instance.name),
        ))
    }

    fn launch_for(&self, instance: &ServerInstance) -> Result<String, SupervisorError> {
        if !is_valid_ram(&instance.ram) {
            return Err(SupervisorError::InvalidRequest(format!(
                "instance '{}' has invalid memory size '{}'",
                instance.id, instance.ram
            )));
        }
        Ok(self.settings.launch_command(&instance.ram))
    }

    // ── delete ───────────────────────────────────────────

    /// 세션 종료와 원격 파일 삭제는 최선 노력으로 시도하고, 등록 해제는 항상 수행합니다.
    pub async fn delete_server(&self, id: &str) -> Result<LifecycleOutcome, SupervisorError> {
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;
        let mut warnings = Vec::new();

        match self.connector.open().await {
            Ok(mut shell) => {
                let screens = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout);
                if let Err(e) = screens.kill(&instance.session_name).await {
                    warnings.push(format!("failed to terminate session: {}", e));
                }
                if self.settings.is_managed_path(&instance.path) {
                    let command = format!("rm -rf {}", shell_quote(&instance.path));
                    let removed = match shell.execute(&command, self.settings.command_timeout).await {
                        Ok(out) => out.check(&command).map(|_| ()),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = removed {
                        warnings.push(format!("failed to remove remote files: {}", e));
                    }
                } else {
                    warnings.push(format!("refusing to remove '{}' outside the server root", instance.path));
                }
                shell.close().await;
            }
            Err(e) => warnings.push(format!("remote cleanup skipped: {}", e)),
        }

        for w in &warnings {
            tracing::warn!("Delete {}: {}", id, w);
        }

        self.instance_store.remove(id)?;
        self.locks.forget(id);
        tracing::info!("Server '{}' ({}) deleted", instance.name, id);

        let mut out = LifecycleOutcome::new(
            id,
            OutcomeStatus::Deleted,
            format!("Server '{}' deleted", instance.name),
        );
        out.warnings = warnings;
        Ok(out)
    }

    // ── console ──────────────────────────────────────────

    pub async fn send_command(&self, id: &str, text: &str) -> Result<LifecycleOutcome, SupervisorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SupervisorError::InvalidRequest("command is empty".into()));
        }
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;

        let mut shell = self.open().await?;
        let result = SessionSupervisor::new(shell.as_ref(), self.settings.command_timeout)
            .send_text(&instance.session_name, text)
            .await;
        shell.close().await;
        result?;

        tracing::info!("Sent '{}' to server '{}'", text, instance.name);
        let mut out = LifecycleOutcome::new(id, OutcomeStatus::Sent, format!("Command sent to '{}'", instance.name));
        out.command = Some(text.to_string());
        Ok(out)
    }

    /// `logs/latest.log` 의 마지막 `lines` 줄 (기본 50, 1..=1000)
    pub async fn get_logs(&self, id: &str, lines: Option<usize>) -> Result<Vec<String>, SupervisorError> {
        let lines = lines.unwrap_or(DEFAULT_LOG_LINES).clamp(1, MAX_LOG_LINES);
        let _guard = self.locks.acquire(id).await;
        let instance = self.find(id)?;

        let command = format!(
            "tail -n {} {}/logs/latest.log 2>/dev/null || echo 'No logs found'",
            lines,
            shell_quote(&instance.path)
        );
        let mut shell = self.open().await?;
        let result = shell.execute(&command, self.settings.command_timeout).await;
        shell.close().await;
        let output = result?;

        Ok(output.stdout.lines().map(str::to_string).collect())
    }

    // ── versions ─────────────────────────────────────────

    pub async fn list_versions(&self, releases_only: bool, limit: usize) -> Vec<String> {
        self.versions.list_versions(releases_only, limit).await
    }
}
