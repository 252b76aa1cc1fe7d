//! 버전 캐시 파일 (`versions_cache.json`)
//!
//! `{ "timestamp": <unix secs>, "versions": { "<id>": { "type", "url", "server_url"? } } }`
//! 신선도는 읽는 시점의 시계 차이로만 판단합니다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVersion {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

/// 캐시 문서. `versions` 는 매니페스트 순서(최신순)를 유지합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub versions: Map<String, Value>,
}

impl CacheDocument {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<CachedVersion> {
        self.versions
            .get(id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, CachedVersion)> + '_ {
        self.versions.iter().map(|(id, v)| {
            (id.as_str(), serde_json::from_value(v.clone()).unwrap_or_default())
        })
    }

    pub fn insert(&mut self, id: &str, entry: &CachedVersion) {
        if let Ok(value) = serde_json::to_value(entry) {
            self.versions.insert(id.to_string(), value);
        }
    }

    pub fn server_url(&self, id: &str) -> Option<String> {
        self.get(id)
            .and_then(|e| e.server_url)
            .filter(|u| !u.is_empty())
    }
}

pub struct VersionCache {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl VersionCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_clock(path, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            ttl,
            clock,
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now_secs()
    }

    /// 만료 여부와 무관하게 읽기 (이미 해석한 server_url 을 보존할 때 사용)
    pub fn read_any(&self) -> Option<CacheDocument> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!("Ignoring malformed version cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// `now - timestamp < ttl` 인 동안만 문서를 반환합니다.
    pub fn read_fresh(&self) -> Option<CacheDocument> {
        let doc = self.read_any()?;
        let age = self.now() - doc.timestamp;
        if age >= 0.0 && age < self.ttl.as_secs_f64() {
            Some(doc)
        } else {
            tracing::debug!("Version cache expired ({:.0}s old)", age);
            None
        }
    }

    /// 쓰기 실패는 로그만 남기고 무시
    pub fn store(&self, doc: &CacheDocument) {
        if let Err(e) = self.try_store(doc) {
            tracing::warn!("Failed to save version cache {}: {}", self.path.display(), e);
        }
    }

    fn try_store(&self, doc: &CacheDocument) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(doc)?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) struct ManualClock(std::sync::atomic::AtomicU64);

#[cfg(test)]
impl ManualClock {
    pub fn new(secs: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(secs))
    }

    pub fn set(&self, secs: u64) {
        self.0.store(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst) as f64
    }
}
