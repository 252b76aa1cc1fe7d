use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 기본 설정 파일 경로 (`MC_REMOTE_CONFIG` 로 덮어쓸 수 있음)
pub const DEFAULT_CONFIG_PATH: &str = "config/global.toml";

/// 작업 디렉토리의 `.env` 파일. 프로세스 환경 변수가 우선합니다.
pub const DEFAULT_ENV_PATH: &str = ".env";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GlobalConfig {
    pub ssh: SshConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub versions: VersionsConfig,
    pub ipc: IpcConfig,
}

/// 원격 호스트 접속 정보
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub identity_file: Option<String>,
    pub connect_timeout_secs: u64,
    pub banner_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// 로컬 OpenSSH 클라이언트 실행 파일
    pub ssh_program: String,
    pub sshpass_program: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: None,
            identity_file: None,
            connect_timeout_secs: 30,
            banner_timeout_secs: 30,
            command_timeout_secs: 60,
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_secs(self.banner_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// 관리 대상 서버의 원격 디렉토리 구조와 실행 파라미터
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// 모든 인스턴스를 담는 원격 호스트의 절대 경로
    pub root_path: String,
    pub default_ram: String,
    pub min_heap: String,
    pub default_port: u16,
    pub stop_command: String,
    pub restart: RestartConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_path: String::new(),
            default_ram: "2G".to_string(),
            min_heap: "1G".to_string(),
            default_port: 25565,
            stop_command: "stop".to_string(),
            restart: RestartConfig::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RestartConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            timeout_secs: 30,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn servers_file(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("servers.json")
    }

    pub fn versions_cache_file(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("versions_cache.json")
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct VersionsConfig {
    pub manifest_url: String,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            manifest_url: "https://launchermeta.mojang.com/mc/game/version_manifest.json".to_string(),
            request_timeout_secs: 10,
            cache_ttl_secs: 3600,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IpcConfig {
    pub listen_addr: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl GlobalConfig {
    /// 설정 파일을 읽고 환경 변수로 덮어씁니다. 파일이 없으면 기본값에서 시작합니다.
    pub fn load() -> anyhow::Result<Self> {
        let dotenv = read_env_file(Path::new(DEFAULT_ENV_PATH))?;
        let lookup = |key: &str| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned());

        let path = lookup("MC_REMOTE_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::from_file(&path)?;
        cfg.apply_env(lookup);
        Ok(cfg)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::from_toml(&s)
                .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Config file {} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to read config file {}: {}", path, e)),
        }
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// `.env` 스타일 환경 변수 오버라이드. 조회 함수를 주입받아 테스트에서 프로세스 환경을 건드리지 않습니다.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SERVER_HOST") {
            self.ssh.host = v;
        }
        if let Some(v) = lookup("SERVER_PORT") {
            match v.parse() {
                Ok(port) => self.ssh.port = port,
                Err(_) => tracing::warn!("Ignoring invalid SERVER_PORT '{}'", v),
            }
        }
        if let Some(v) = lookup("SERVER_USER") {
            self.ssh.username = v;
        }
        if let Some(v) = lookup("SERVER_PASSWORD") {
            self.ssh.password = Some(v);
        }
        if let Some(v) = lookup("SERVER_KEY_PATH") {
            self.ssh.identity_file = Some(v);
        }
        if let Some(v) = lookup("SERVER_PATH") {
            self.server.root_path = v;
        }
        if let Some(v) = lookup("SERVER_RAM") {
            self.server.default_ram = v;
        }
        if let Some(v) = lookup("MC_REMOTE_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Some(v) = lookup("MC_REMOTE_LISTEN") {
            self.ipc.listen_addr = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ssh.host.trim().is_empty() {
            anyhow::bail!("SERVER_HOST is required (ssh.host)");
        }
        if self.ssh.username.trim().is_empty() {
            anyhow::bail!("SERVER_USER is required (ssh.username)");
        }
        if self.ssh.password.is_none() && self.ssh.identity_file.is_none() {
            anyhow::bail!("SERVER_PASSWORD or SERVER_KEY_PATH is required (ssh.password / ssh.identity_file)");
        }
        let root = self.server.root_path.trim();
        if root.is_empty() {
            anyhow::bail!("SERVER_PATH is required (server.root_path)");
        }
        if !root.starts_with('/') || root == "/" {
            anyhow::bail!("server.root_path must be an absolute directory other than '/': {}", root);
        }
        if !crate::instance::is_valid_ram(&self.server.default_ram) {
            anyhow::bail!("SERVER_RAM must look like '4G' or '512M': {}", self.server.default_ram);
        }
        Ok(())
    }
}

/// `.env` 파일을 읽어 키/값 맵으로 반환합니다. 프로세스 환경은 변경하지 않습니다.
/// 파일이 없으면 빈 맵입니다.
pub fn read_env_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(anyhow::anyhow!("Failed to read {}: {}", path.display(), e)),
    };
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| anyhow::anyhow!("Invalid line in {}: {}", path.display(), e))?;
        vars.insert(key, value);
    }
    tracing::info!("Loaded {} variables from {}", vars.len(), path.display());
    Ok(vars)
}
