// 라이프사이클 통합 테스트
// 공개 API만 사용하고, 원격 호스트는 메모리 안의 screen 시뮬레이터로 대체

use async_trait::async_trait;
use mc_remote_core::instance::{InstanceStatus, InstanceStore};
use mc_remote_core::remote::{CommandOutput, Connector, RemoteError, RemoteShell};
use mc_remote_core::supervisor::session::BackoffPolicy;
use mc_remote_core::supervisor::{CreateRequest, LifecycleSettings, OutcomeStatus, Supervisor};
use mc_remote_core::versions::cache::VersionCache;
use mc_remote_core::versions::{MetadataSource, VersionDetails, VersionManifest, VersionResolver};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Host {
    sessions: HashSet<String>,
    commands: Vec<String>,
    fail_cleanup: bool,
    offline: bool,
}

fn quoted_after(command: &str, marker: &str) -> Option<String> {
    let rest = &command[command.find(marker)? + marker.len()..];
    let rest = rest.strip_prefix('\'')?;
    Some(rest[..rest.find('\'')?].to_string())
}

impl Host {
    fn run(&mut self, command: &str) -> CommandOutput {
        self.commands.push(command.to_string());
        if command == "screen -list" {
            if self.sessions.is_empty() {
                return CommandOutput::new("No Sockets found in /run/screen/S-mc.", "", Some(1));
            }
            let body: String = self
                .sessions
                .iter()
                .enumerate()
                .map(|(i, s)| format!("\t{}.{}\t(Detached)\n", 100 + i, s))
                .collect();
            return CommandOutput::new(&format!("There are screens on:\n{}", body), "", Some(0));
        }
        if command.starts_with("rm -rf") && self.fail_cleanup {
            return CommandOutput::new("", "rm: cannot remove: Permission denied", Some(1));
        }
        if let Some(name) = quoted_after(command, "screen -dmS ") {
            self.sessions.insert(name);
        } else if command.contains("-X quit") {
            if let Some(name) = quoted_after(command, "screen -S ") {
                self.sessions.remove(&name);
            }
        } else if command.ends_with("-X stuff 'stop\\n'") {
            // 서버는 `stop` 을 읽자마자 종료됨
            if let Some(name) = quoted_after(command, "screen -S ") {
                self.sessions.remove(&name);
            }
        }
        CommandOutput::new("", "", Some(0))
    }
}

#[derive(Clone, Default)]
struct SimConnector(Arc<Mutex<Host>>);

struct SimShell(Arc<Mutex<Host>>);

#[async_trait]
impl RemoteShell for SimShell {
    async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, RemoteError> {
        Ok(self.0.lock().unwrap().run(command))
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl Connector for SimConnector {
    async fn open(&self) -> Result<Box<dyn RemoteShell>, RemoteError> {
        if self.0.lock().unwrap().offline {
            return Err(RemoteError::Connection {
                host: "sim".into(),
                reason: "Connection refused".into(),
            });
        }
        Ok(Box::new(SimShell(self.0.clone())))
    }
}

struct NoNetwork;

#[async_trait]
impl MetadataSource for NoNetwork {
    async fn fetch_manifest(&self) -> anyhow::Result<VersionManifest> {
        anyhow::bail!("no network in tests")
    }

    async fn fetch_details(&self, _url: &str) -> anyhow::Result<VersionDetails> {
        anyhow::bail!("no network in tests")
    }
}

fn build(dir: &tempfile::TempDir, connector: &SimConnector) -> Supervisor {
    let settings = LifecycleSettings {
        root_path: "/home/mc/servers".into(),
        default_ram: "2G".into(),
        min_heap: "1G".into(),
        default_port: 25565,
        stop_command: "stop".into(),
        command_timeout: Duration::from_secs(5),
        backoff: BackoffPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_millis(20),
        },
    };
    let cache = VersionCache::new(dir.path().join("versions_cache.json"), Duration::from_secs(3600));
    Supervisor::new(
        Arc::new(connector.clone()),
        InstanceStore::new(dir.path().join("servers.json")),
        VersionResolver::new(Arc::new(NoNetwork), cache),
        settings,
    )
}

fn survival() -> CreateRequest {
    CreateRequest {
        name: "Survival".into(),
        version: "1.20.1".into(),
        ram: Some("4G".into()),
        server_type: Some("vanilla".into()),
    }
}

#[tokio::test]
async fn test_create_start_and_poll_online() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimConnector::default();
    let sup = build(&dir, &sim);

    let inst = sup.create_server(survival()).await.unwrap();
    assert_eq!(sup.instance_store.list().len(), 1);
    assert!(inst.session_name.starts_with("mc-survival-"));

    sim.0.lock().unwrap().commands.clear();
    let out = sup.start_server(&inst.id).await.unwrap();
    assert_eq!(out.status, OutcomeStatus::Starting);
    let launches = sim
        .0
        .lock()
        .unwrap()
        .commands
        .iter()
        .filter(|c| c.contains("screen -dmS"))
        .count();
    assert_eq!(launches, 1);

    let views = sup.list_servers().await.unwrap();
    assert_eq!(views[0].instance.status, InstanceStatus::Online);

    // 새 저장소로도 레지스트리 파일을 읽을 수 있어야 함
    let reopened = InstanceStore::new(dir.path().join("servers.json"));
    assert_eq!(reopened.find(&inst.id).unwrap().status, InstanceStatus::Online);
}

#[tokio::test]
async fn test_restart_orders_stop_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimConnector::default();
    let sup = build(&dir, &sim);
    let inst = sup.create_server(survival()).await.unwrap();
    sup.start_server(&inst.id).await.unwrap();
    sim.0.lock().unwrap().commands.clear();

    let out = sup.restart_server(&inst.id).await.unwrap();
    assert_eq!(out.status, OutcomeStatus::Restarting);
    assert_eq!(out.forced_kill, Some(false));

    let host = sim.0.lock().unwrap();
    let stop = host.commands.iter().position(|c| c.contains("-X stuff 'stop\\n'")).unwrap();
    let launch = host.commands.iter().position(|c| c.contains("screen -dmS")).unwrap();
    assert!(stop < launch);
    assert!(host.sessions.contains(&inst.session_name));
}

#[tokio::test]
async fn test_delete_is_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimConnector::default();
    let sup = build(&dir, &sim);
    let inst = sup.create_server(survival()).await.unwrap();
    sup.start_server(&inst.id).await.unwrap();
    sim.0.lock().unwrap().fail_cleanup = true;

    let out = sup.delete_server(&inst.id).await.unwrap();
    assert_eq!(out.status, OutcomeStatus::Deleted);
    assert!(!out.warnings.is_empty());
    assert!(sup.instance_store.list().is_empty());
    assert!(!sim.0.lock().unwrap().sessions.contains(&inst.session_name));
}

#[tokio::test]
async fn test_delete_while_host_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimConnector::default();
    let sup = build(&dir, &sim);
    let inst = sup.create_server(survival()).await.unwrap();
    sim.0.lock().unwrap().offline = true;

    assert!(sup.start_server(&inst.id).await.is_err());
    let out = sup.delete_server(&inst.id).await.unwrap();
    assert_eq!(out.status, OutcomeStatus::Deleted);
    assert!(sup.instance_store.find(&inst.id).is_none());
}

#[tokio::test]
async fn test_versions_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimConnector::default();
    sim.0.lock().unwrap().offline = true;
    let sup = build(&dir, &sim);

    let versions = sup.list_versions(true, 30).await;
    assert!(!versions.is_empty());
    assert!(versions.len() <= 30);
}
