use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Instance '{0}' not found")]
    NotFound(String),
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to replace registry file: {0}")]
    Persist(std::io::Error),
}

/// 마지막으로 관측된 상태. 힌트일 뿐이며 제어 판단에 쓰면 안 됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Online,
    Offline,
    Starting,
    Stopping,
    #[serde(other)]
    Unknown,
}

/// 서버 인스턴스 - 원격 호스트에서 관리하는 게임 서버 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInstance {
    pub id: String,                    // 고유 ID (uuid v4), 재사용 금지
    pub name: String,                  // 사용자 지정 이름 (예: "Survival")
    pub path: String,                  // 원격 호스트의 서버 디렉토리
    #[serde(rename = "screen_name")]
    pub session_name: String,          // screen 세션 이름
    pub version: String,
    pub ram: String,                   // 예: "4G"
    #[serde(rename = "type")]
    pub server_type: String,           // 예: "vanilla"
    pub port: u16,
    pub status: InstanceStatus,
    pub created_at: String,
}

impl ServerInstance {
    /// 새 id 로 레코드를 만들고, 원격 경로와 세션 이름을 id 로부터 유도합니다.
    /// `root_path` 는 모든 인스턴스를 담는 원격 디렉토리입니다.
    pub fn new(
        name: &str,
        version: &str,
        ram: &str,
        server_type: &str,
        root_path: &str,
        port: u16,
    ) -> Self {
        let uuid = uuid::Uuid::new_v4();
        let short = &uuid.simple().to_string()[..8];
        let slug = crate::utils::slugify(name);
        Self {
            id: uuid.to_string(),
            name: name.trim().to_string(),
            path: format!("{}/{}-{}", root_path.trim_end_matches('/'), slug, short),
            session_name: format!("mc-{}-{}", slug, short),
            version: version.to_string(),
            ram: ram.to_string(),
            server_type: server_type.to_string(),
            port,
            status: InstanceStatus::Offline,
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// [`InstanceStore::upsert`] 용 부분 업데이트. 생성 이후 바뀔 수 있는 필드만 포함합니다.
#[derive(Debug, Clone, Default)]
pub struct InstancePatch {
    pub name: Option<String>,
    pub status: Option<InstanceStatus>,
    pub port: Option<u16>,
}

impl InstancePatch {
    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn apply(self, instance: &mut ServerInstance) {
        if let Some(name) = self.name {
            instance.name = name;
        }
        if let Some(status) = self.status {
            instance.status = status;
        }
        if let Some(port) = self.port {
            instance.port = port;
        }
    }
}

/// 레지스트리 파일의 레코드 하나. 현재 스키마로 읽히지 않는 레코드는
/// 원문 그대로 다시 기록됩니다.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Record {
    Known(ServerInstance),
    Opaque(serde_json::Value),
}

impl Record {
    fn as_known_mut(&mut self) -> Option<&mut ServerInstance> {
        match self {
            Record::Known(instance) => Some(instance),
            Record::Opaque(_) => None,
        }
    }

    fn known_mut(&mut self, id: &str) -> Option<&mut ServerInstance> {
        self.as_known_mut().filter(|i| i.id == id)
    }
}

/// 인스턴스 저장소 - servers.json 관리
///
/// 매 호출마다 파일을 다시 읽고, 쓰기는 임시 파일 + rename 으로 원자적으로 교체합니다.
/// 같은 프로세스 안의 read-modify-write 는 `write_lock` 으로 직렬화됩니다.
pub struct InstanceStore {
    file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl InstanceStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| {
            tracing::error!("InstanceStore write lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// 파일에서 인스턴스 로드. 파일이 없거나 손상되었으면 빈 목록.
    /// 현재 스키마로 해석되지 않는 레코드는 건너뜁니다.
    pub fn load(&self) -> Vec<ServerInstance> {
        let records = match self.read_records() {
            Ok(Some(records)) => records,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}; treating registry as empty", self.file_path.display(), e);
                return Vec::new();
            }
        };
        records
            .into_iter()
            .filter_map(|r| match r {
                Record::Known(instance) => Some(instance),
                Record::Opaque(_) => None,
            })
            .collect()
    }

    /// `Ok(None)` 은 파일 없음 또는 JSON 배열이 아닌 문서
    fn read_records(&self) -> Result<Option<Vec<Record>>, StoreError> {
        let content = match fs::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let values: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Malformed registry {}: {}; treating as empty", self.file_path.display(), e);
                return Ok(None);
            }
        };
        let records = values
            .into_iter()
            .map(|value| match serde_json::from_value::<ServerInstance>(value.clone()) {
                Ok(instance) => Record::Known(instance),
                Err(e) => {
                    tracing::warn!("Skipping unreadable registry record in {}: {}", self.file_path.display(), e);
                    Record::Opaque(value)
                }
            })
            .collect();
        Ok(Some(records))
    }

    /// read-modify-write 용 로드. 읽을 수 없는 레코드는 그대로 다시 쓰이고,
    /// 배열이 아닌 손상된 파일은 덮어쓰기 전에 `<file>.bak` 으로 보관합니다.
    fn load_for_write(&self) -> Result<Vec<Record>, StoreError> {
        if let Some(records) = self.read_records()? {
            return Ok(records);
        }
        if self.file_path.exists() {
            let backup = self.backup_path();
            fs::copy(&self.file_path, &backup)?;
            tracing::warn!("Kept unparseable registry as {}", backup.display());
        }
        Ok(Vec::new())
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.file_path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// 전체 목록을 원자적으로 교체 저장
    pub fn save(&self, instances: &[ServerInstance]) -> Result<(), StoreError> {
        self.write_json(instances, instances.len())
    }

    fn save_records(&self, records: &[Record]) -> Result<(), StoreError> {
        self.write_json(records, records.len())
    }

    fn write_json<T: Serialize + ?Sized>(&self, value: &T, count: usize) -> Result<(), StoreError> {
        let dir = match self.file_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut content = serde_json::to_string_pretty(value)?;
        content.push('\n');

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.file_path).map_err(|e| StoreError::Persist(e.error))?;
        tracing::debug!("Saved {} instances to {}", count, self.file_path.display());
        Ok(())
    }

    pub fn find(&self, id: &str) -> Option<ServerInstance> {
        self.load().into_iter().find(|i| i.id == id)
    }

    pub fn list(&self) -> Vec<ServerInstance> {
        self.load()
    }

    /// 인스턴스 추가
    pub fn add(&self, instance: ServerInstance) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut records = self.load_for_write()?;
        records.push(Record::Known(instance));
        self.save_records(&records)
    }

    /// 인스턴스 부분 업데이트
    pub fn upsert(&self, id: &str, patch: InstancePatch) -> Result<ServerInstance, StoreError> {
        let _guard = self.lock();
        let mut records = self.load_for_write()?;
        let instance = records
            .iter_mut()
            .find_map(|r| r.known_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(instance);
        let updated = instance.clone();
        self.save_records(&records)?;
        Ok(updated)
    }

    /// 나열된 id 전체에 `status` 를 한 번의 쓰기로 반영합니다.
    /// 그 사이 삭제된 id 는 건너뜁니다.
    pub fn refresh_statuses(&self, statuses: &[(String, InstanceStatus)]) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut records = self.load_for_write()?;
        let mut changed = false;
        for instance in records.iter_mut().filter_map(Record::as_known_mut) {
            if let Some((_, status)) = statuses.iter().find(|(id, _)| *id == instance.id) {
                if instance.status != *status {
                    instance.status = *status;
                    changed = true;
                }
            }
        }
        if changed {
            self.save_records(&records)?;
        }
        Ok(())
    }

    /// 인스턴스 제거. 제거되었으면 true.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock();
        let mut records = self.load_for_write()?;
        let before = records.len();
        records.retain(|r| !matches!(r, Record::Known(i) if i.id == id));
        if records.len() == before {
            return Ok(false);
        }
        self.save_records(&records)?;
        Ok(true)
    }
}

fn ram_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[1-9][0-9]{0,5}[MG]$").expect("static regex"))
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("static regex"))
}

/// `4G`, `512M` 형태의 JVM 힙 크기
pub fn is_valid_ram(ram: &str) -> bool {
    ram_regex().is_match(ram)
}

/// 버전 id 와 서버 타입은 원격 명령에 그대로 들어가므로 단순 토큰만 허용합니다.
pub fn is_valid_token(value: &str) -> bool {
    token_regex().is_match(value)
}
