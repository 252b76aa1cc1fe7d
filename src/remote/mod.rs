//! 원격 실행 게이트웨이
//!
//! 작업 하나당 채널 하나를 열고, 명령을 하나씩 실행한 뒤 반드시 닫습니다.
//! 재시도는 하지 않으며 네트워크 오류는 그대로 호출자에게 전달됩니다.

pub mod ssh;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use ssh::{SshConnector, SshChannel};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("cannot connect to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("remote command `{command}` failed (exit {exit_code:?}): {stderr}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("remote command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("local ssh client error: {0}")]
    Io(#[from] std::io::Error),
}

/// 원격 명령 실행 결과 (stdout / stderr 는 앞뒤 공백 제거됨)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: &str, stderr: &str, exit_code: Option<i32>) -> Self {
        Self {
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 0 이 아닌 종료 코드를 원본 stderr 를 담은 [`RemoteError::Command`] 로 바꿉니다.
    pub fn check(self, command: &str) -> Result<Self, RemoteError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RemoteError::Command {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: if self.stderr.is_empty() { self.stdout } else { self.stderr },
            })
        }
    }
}

/// 원격 호스트로 열린 명령 채널
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, RemoteError>;

    /// 채널을 닫습니다. 두 번째 호출은 아무 일도 하지 않습니다.
    async fn close(&mut self);
}

/// 작업 하나당 [`RemoteShell`] 하나를 엽니다.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RemoteShell>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_trimmed() {
        let out = CommandOutput::new("  hello\n", "\n", Some(0));
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.stderr, "");
        assert!(out.success());
    }

    #[test]
    fn test_check_reports_stderr() {
        let out = CommandOutput::new("", "rm: cannot remove", Some(1));
        let err = out.check("rm -rf '/srv/x'").unwrap_err();
        match err {
            RemoteError::Command { command, exit_code, stderr } => {
                assert_eq!(command, "rm -rf '/srv/x'");
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "rm: cannot remove");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_falls_back_to_stdout() {
        let err = CommandOutput::new("oops", "", None).check("x").unwrap_err();
        assert!(err.to_string().contains("oops"));
    }
}
