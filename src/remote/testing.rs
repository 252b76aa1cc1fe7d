//! GNU screen 이 돌아가는 원격 호스트의 메모리 내 대역

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{CommandOutput, Connector, RemoteError, RemoteShell};

#[derive(Debug, Default)]
pub struct FakeHost {
    pub sessions: BTreeSet<String>,
    /// 비정상 종료된 서버가 남긴 소켓. `(Dead ???)` 로 표시됩니다.
    pub dead_sessions: BTreeSet<String>,
    pub commands: Vec<String>,
    /// 이 문자열 중 하나를 포함한 명령은 종료 코드 1 로 실패합니다.
    pub fail_on: Vec<String>,
    /// `stop` 주입 후 세션이 목록에 남아 있는 폴링 횟수
    pub stop_after_polls: Option<usize>,
    pending_stops: Vec<(String, usize)>,
    pub logs: Vec<String>,
    pub refuse_connections: bool,
    pub opened: usize,
    pub closed: usize,
}

impl FakeHost {
    fn listing(&self) -> CommandOutput {
        if self.sessions.is_empty() && self.dead_sessions.is_empty() {
            return CommandOutput::new("No Sockets found in /run/screen/S-mc.\n", "", Some(1));
        }
        let mut out = String::from("There are screens on:\n");
        for (n, name) in self.sessions.iter().enumerate() {
            out.push_str(&format!("\t{}.{}\t(10/17/2026 09:00:00 AM)\t(Detached)\n", 4000 + n, name));
        }
        for (n, name) in self.dead_sessions.iter().enumerate() {
            out.push_str(&format!("\t{}.{}\t(Dead ???)\n", 5000 + n, name));
        }
        if !self.dead_sessions.is_empty() {
            out.push_str("Remove dead screens with 'screen -wipe'.\n");
        }
        out.push_str(&format!(
            "{} Sockets in /run/screen/S-mc.\n",
            self.sessions.len() + self.dead_sessions.len()
        ));
        CommandOutput::new(&out, "", Some(0))
    }

    fn handle(&mut self, command: &str) -> CommandOutput {
        self.commands.push(command.to_string());
        if self.fail_on.iter().any(|f| command.contains(f.as_str())) {
            return CommandOutput::new("", &format!("fake failure: {}", command), Some(1));
        }

        if command == "screen -list" {
            self.pending_stops.retain_mut(|(name, remaining)| {
                if *remaining == 0 {
                    self.sessions.remove(name.as_str());
                    false
                } else {
                    *remaining -= 1;
                    true
                }
            });
            return self.listing();
        }
        if command == "screen -wipe" {
            return CommandOutput::new("", "", Some(0));
        }
        if let Some(name) = quoted_after(command, "screen -dmS ") {
            self.sessions.insert(name);
            return CommandOutput::new("", "", Some(0));
        }
        if command.contains(" -X quit") {
            if let Some(name) = quoted_after(command, "screen -S ") {
                self.sessions.remove(name.as_str());
            }
            return CommandOutput::new("", "", Some(0));
        }
        if command.contains(" -X stuff ") {
            let Some(name) = quoted_after(command, "screen -S ") else {
                return CommandOutput::new("", "", Some(1));
            };
            if !self.sessions.contains(&name) {
                return CommandOutput::new("", "No screen session found.", Some(1));
            }
            if command.ends_with("'stop\\n'") {
                if let Some(polls) = self.stop_after_polls {
                    self.pending_stops.push((name, polls));
                }
            }
            return CommandOutput::new("", "", Some(0));
        }
        if command.starts_with("tail -n ") {
            return CommandOutput::new(&self.logs.join("\n"), "", Some(0));
        }
        CommandOutput::new("", "", Some(0))
    }
}

/// `marker` 바로 뒤의 작은따옴표 인자를 꺼냅니다.
pub fn quoted_after(command: &str, marker: &str) -> Option<String> {
    let rest = &command[command.find(marker)? + marker.len()..];
    let rest = rest.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub host: Arc<Mutex<FakeHost>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, name: &str) -> Self {
        self.host.lock().unwrap().sessions.insert(name.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.host.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.host.lock().unwrap().commands.clear();
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.host.lock().unwrap().sessions.contains(name)
    }
}

pub struct FakeShell {
    host: Arc<Mutex<FakeHost>>,
    closed: bool,
}

impl FakeShell {
    pub fn new(host: Arc<Mutex<FakeHost>>) -> Self {
        Self { host, closed: false }
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, RemoteError> {
        Ok(self.host.lock().unwrap().handle(command))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.host.lock().unwrap().closed += 1;
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self) -> Result<Box<dyn RemoteShell>, RemoteError> {
        let mut host = self.host.lock().unwrap();
        if host.refuse_connections {
            return Err(RemoteError::Connection {
                host: "fake".into(),
                reason: "Authentication failed.".into(),
            });
        }
        host.opened += 1;
        drop(host);
        Ok(Box::new(FakeShell::new(self.host.clone())))
    }
}
