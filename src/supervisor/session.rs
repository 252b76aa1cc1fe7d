//! GNU screen 세션 제어
//!
//! 원격 호스트에서 유일하게 쓸 수 있는 프로세스 감독 수단이 screen 세션입니다.
//! 모든 판단은 호출 시점의 `screen -list` 결과로만 내립니다.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::config::RestartConfig;
use crate::remote::{CommandOutput, RemoteError, RemoteShell};
use crate::utils::shell_quote;

pub const LIST_COMMAND: &str = "screen -list";
pub const WIPE_COMMAND: &str = "screen -wipe";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session '{0}' is not running")]
    NotRunning(String),
    #[error("invalid session name '{0}'")]
    InvalidName(String),
    #[error("invalid console input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Starting,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopping,
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartOutcome {
    pub was_running: bool,
    pub forced_kill: bool,
    pub start: StartOutcome,
}

/// 종료 대기 정책: 지수 백오프로 폴링하고 `timeout` 이 지나면 포기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RestartConfig::default())
    }
}

impl From<&RestartConfig> for BackoffPolicy {
    fn from(cfg: &RestartConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms.max(1)),
            max_delay: Duration::from_millis(cfg.max_delay_ms.max(cfg.initial_delay_ms).max(1)),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }
}

fn listing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\.(\S+)").expect("static regex"))
}

/// `screen -list` 출력에서 정확한 세션 이름을 추출합니다.
///
/// 각 줄은 `\t12345.mc-survival-ab12cd34\t(10/17/2026 09:00:00 AM)\t(Detached)` 형태이며
/// 헤더와 마지막 소켓 요약 줄은 건너뜁니다. `(Dead ???)` 소켓은 살아 있는 세션이 아닙니다.
pub fn parse_session_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.to_ascii_lowercase().contains("(dead"))
        .filter_map(|line| listing_regex().captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// 세션 이름은 셸과 screen 인자 파서를 모두 거치므로 `[A-Za-z0-9_-]` 만 허용합니다.
pub fn validate_session_name(name: &str) -> Result<(), SessionError> {
    let ok = !name.is_empty()
        && name.len() <= 80
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SessionError::InvalidName(name.to_string()))
    }
}

/// `screen -X stuff` 용 인자를 만듭니다. screen 이 `\` 와 `^` 를 직접 해석하므로
/// 둘 다 이스케이프하고, 끝의 `\n` 은 screen 의 줄바꿈 표기입니다.
fn stuff_payload(text: &str) -> Result<String, SessionError> {
    if text.chars().any(char::is_control) {
        return Err(SessionError::InvalidInput("control characters are not allowed".into()));
    }
    let escaped = text.replace('\\', "\\\\").replace('^', "\\^");
    Ok(shell_quote(&format!("{}\\n", escaped)))
}

pub struct SessionSupervisor<'a> {
    shell: &'a dyn RemoteShell,
    timeout: Duration,
}

impl<'a> SessionSupervisor<'a> {
    pub fn new(shell: &'a dyn RemoteShell, timeout: Duration) -> Self {
        Self { shell, timeout }
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        self.shell.execute(command, self.timeout).await
    }

    /// `screen -list` 는 세션이 없으면 exit 1 이므로 종료 코드와 무관하게 출력만 파싱합니다.
    pub async fn list_sessions(&self) -> Result<Vec<String>, RemoteError> {
        let output = self.run(LIST_COMMAND).await?;
        Ok(parse_session_list(&output.stdout))
    }

    pub async fn is_running(&self, session_name: &str) -> Result<bool, RemoteError> {
        let sessions = self.list_sessions().await?;
        Ok(sessions.iter().any(|s| s == session_name))
    }

    /// 세션이 이미 살아 있지 않으면 `working_dir` 에서 `launch_command` 를
    /// 새 detached 세션으로 실행합니다.
    pub async fn start(
        &self,
        session_name: &str,
        working_dir: &str,
        launch_command: &str,
    ) -> Result<StartOutcome, SessionError> {
        validate_session_name(session_name)?;
        if self.is_running(session_name).await? {
            tracing::info!("Session '{}' already running", session_name);
            return Ok(StartOutcome::AlreadyRunning);
        }

        let command = format!(
            "cd {} && screen -dmS {} {}",
            shell_quote(working_dir),
            shell_quote(session_name),
            launch_command
        );
        self.run(&command).await?.check(&command)?;
        tracing::info!("Session '{}' launched in {}", session_name, working_dir);
        Ok(StartOutcome::Starting)
    }

    /// 정상 종료 명령을 주입합니다. 세션이 없으면 목록 폴링 외에는 아무것도 하지 않고,
    /// 프로세스 종료를 기다리지 않습니다.
    pub async fn stop(&self, session_name: &str, graceful_command: &str) -> Result<StopOutcome, SessionError> {
        validate_session_name(session_name)?;
        if !self.is_running(session_name).await? {
            return Ok(StopOutcome::NotRunning);
        }
        self.inject(session_name, graceful_command).await?;
        tracing::info!("Sent '{}' to session '{}'", graceful_command, session_name);
        Ok(StopOutcome::Stopping)
    }

    /// 강제 종료 + 죽은 소켓 정리. 세션이 없어도 에러가 아님.
    pub async fn kill(&self, session_name: &str) -> Result<(), SessionError> {
        validate_session_name(session_name)?;
        let quit = format!("screen -S {} -X quit", shell_quote(session_name));
        let out = self.run(&quit).await?;
        if !out.success() {
            tracing::debug!("'{}' exited {:?}: {}", quit, out.exit_code, out.stderr);
        }
        let wipe = self.run(WIPE_COMMAND).await?;
        if !wipe.success() {
            tracing::debug!("screen -wipe exited {:?}", wipe.exit_code);
        }
        tracing::info!("Session '{}' killed", session_name);
        Ok(())
    }

    pub async fn send_text(&self, session_name: &str, text: &str) -> Result<(), SessionError> {
        validate_session_name(session_name)?;
        if !self.is_running(session_name).await? {
            return Err(SessionError::NotRunning(session_name.to_string()));
        }
        self.inject(session_name, text).await
    }

    async fn inject(&self, session_name: &str, text: &str) -> Result<(), SessionError> {
        let command = format!(
            "screen -S {} -p 0 -X stuff {}",
            shell_quote(session_name),
            stuff_payload(text)?
        );
        self.run(&command).await?.check(&command)?;
        Ok(())
    }

    /// 세션이 사라질 때까지 폴링합니다. `policy.timeout` 이 지나도 남아 있으면 `false`.
    pub async fn wait_until_stopped(&self, session_name: &str, policy: &BackoffPolicy) -> Result<bool, RemoteError> {
        let deadline = tokio::time::Instant::now() + policy.timeout;
        let mut delay = policy.initial_delay;
        loop {
            if !self.is_running(session_name).await? {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(policy.max_delay);
        }
    }

    /// stop → 종료 확인(백오프 폴링) → 시간 초과 시 kill → start
    pub async fn restart(
        &self,
        session_name: &str,
        working_dir: &str,
        launch_command: &str,
        graceful_command: &str,
        policy: &BackoffPolicy,
    ) -> Result<RestartOutcome, SessionError> {
        let stop = self.stop(session_name, graceful_command).await?;
        let was_running = stop == StopOutcome::Stopping;
        let mut forced_kill = false;

        if was_running && !self.wait_until_stopped(session_name, policy).await? {
            tracing::warn!(
                "Session '{}' still alive {}s after stop, forcing kill",
                session_name,
                policy.timeout.as_secs()
            );
            self.kill(session_name).await?;
            forced_kill = true;
        }

        let start = self.start(session_name, working_dir, launch_command).await?;
        Ok(RestartOutcome {
            was_running,
            forced_kill,
            start,
        })
    }
}
