//! OpenSSH 기반 게이트웨이
//!
//! `open()` 은 컨트롤 마스터(`ssh -M -N`)를 띄우고, 이후 명령은 같은 소켓으로
//! 다중화합니다. 마스터 프로세스는 `kill_on_drop` 으로 생성되고 소켓은 임시
//! 디렉토리에 있으므로 어떤 경로로 빠져나가도 채널이 정리됩니다.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use super::{CommandOutput, Connector, RemoteError, RemoteShell};
use crate::config::SshConfig;
use crate::utils::apply_creation_flags;

const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(200);
const MASTER_EXIT_GRACE: Duration = Duration::from_secs(5);

/// 설정된 호스트로 SSH 채널을 엽니다.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.config.username, self.config.host)
    }

    /// 마스터와 다중화된 모든 클라이언트가 공유하는 옵션
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
        ];
        if let Some(key) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        if self.config.password.is_some() {
            args.push("-o".to_string());
            args.push("PreferredAuthentications=password,keyboard-interactive".to_string());
        } else {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        args
    }

    fn connection_error(&self, reason: impl Into<String>) -> RemoteError {
        RemoteError::Connection {
            host: self.config.host.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self) -> Result<Box<dyn RemoteShell>, RemoteError> {
        let control_dir = tempfile::Builder::new().prefix("mcr-ssh-").tempdir()?;
        let control_path = control_dir.path().join("ctl");
        let target = self.target();
        let common = self.common_args();

        // 비밀번호 인증은 sshpass 로 감싸되, 비밀번호는 환경 변수로만 전달
        let ssh = self.config.ssh_program.as_str();
        let mut cmd = match &self.config.password {
            Some(password) => {
                let mut c = Command::new(&self.config.sshpass_program);
                c.arg("-e").arg(ssh).env("SSHPASS", password);
                c
            }
            None => Command::new(ssh),
        };
        cmd.arg("-M")
            .arg("-N")
            .arg("-S")
            .arg(&control_path)
            .args(&common)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        apply_creation_flags(&mut cmd);

        tracing::debug!("Opening SSH control master to {}", target);
        let mut master = cmd
            .spawn()
            .map_err(|e| self.connection_error(format!("failed to spawn ssh client: {}", e)))?;

        let budget = self.config.connect_timeout() + self.config.banner_timeout();
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let exited = master
                .try_wait()
                .map_err(|e| self.connection_error(format!("failed to poll ssh client: {}", e)))?;
            if let Some(status) = exited {
                let mut stderr = String::new();
                if let Some(mut pipe) = master.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                let reason = if stderr.trim().is_empty() {
                    format!("ssh exited with {}", status)
                } else {
                    stderr.trim().to_string()
                };
                tracing::error!("SSH connection to {} failed: {}", target, reason);
                return Err(self.connection_error(reason));
            }

            if control_check(ssh, &control_path, &common, &target).await {
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                let _ = master.kill().await;
                return Err(self.connection_error(format!(
                    "no session established within {}s",
                    budget.as_secs()
                )));
            }
            tokio::time::sleep(MASTER_POLL_INTERVAL).await;
        }

        tracing::info!("SSH channel open: {}", target);
        Ok(Box::new(SshChannel {
            program: ssh.to_string(),
            target,
            common_args: common,
            control_path,
            master: Some(master),
            _control_dir: control_dir,
        }))
    }
}

async fn control_check(program: &str, control_path: &Path, common: &[String], target: &str) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg("-S")
        .arg(control_path)
        .args(common)
        .arg("-O")
        .arg("check")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    apply_creation_flags(&mut cmd);
    matches!(cmd.status().await, Ok(status) if status.success())
}

/// 다중화된 SSH 세션 하나. drop 되면 컨트롤 마스터도 종료됩니다.
pub struct SshChannel {
    program: String,
    target: String,
    common_args: Vec<String>,
    control_path: PathBuf,
    master: Option<Child>,
    _control_dir: TempDir,
}

impl SshChannel {
    fn client(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-S")
            .arg(&self.control_path)
            .args(&self.common_args)
            .kill_on_drop(true);
        apply_creation_flags(&mut cmd);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshChannel {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        if self.master.is_none() {
            return Err(RemoteError::Connection {
                host: self.target.clone(),
                reason: "channel already closed".to_string(),
            });
        }

        let mut cmd = self.client();
        cmd.arg(&self.target)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!("[{}] $ {}", self.target, command);
        let child = cmd.spawn()?;

        // 타임아웃 시 future 가 drop 되면서 로컬 ssh 클라이언트도 종료됨 (kill_on_drop)
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput::new(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
                output.status.code(),
            )),
            Ok(Err(e)) => Err(RemoteError::Io(e)),
            Err(_) => {
                tracing::warn!("[{}] command timed out after {}s: {}", self.target, timeout.as_secs(), command);
                Err(RemoteError::Timeout {
                    command: command.to_string(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn close(&mut self) {
        let Some(mut master) = self.master.take() else {
            return;
        };

        let mut cmd = self.client();
        cmd.arg("-O")
            .arg("exit")
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Err(e) = cmd.status().await {
            tracing::debug!("ssh -O exit failed for {}: {}", self.target, e);
        }

        match tokio::time::timeout(MASTER_EXIT_GRACE, master.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("SSH master for {} did not exit, killing", self.target);
                let _ = master.kill().await;
            }
        }
        tracing::info!("SSH channel closed: {}", self.target);
    }
}
