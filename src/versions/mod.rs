//! 게임 버전 → 서버 아티팩트 URL 해석
//!
//! 외부 메타데이터 서비스(Mojang version manifest)를 조회하고, 결과를 1시간
//! 동안 로컬 캐시에 보관합니다. 서비스에 닿지 못하면 고정 목록으로 대체하며
//! 에러는 호출자에게 전달하지 않습니다.

pub mod cache;
pub mod fallback;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StorageConfig, VersionsConfig};
use cache::{CacheDocument, CachedVersion, VersionCache};

/// version_manifest.json (필요한 필드만)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub versions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

/// 버전별 상세 문서
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionDetails {
    #[serde(default)]
    pub downloads: Downloads,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Downloads {
    pub server: Option<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    pub url: String,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_manifest(&self) -> Result<VersionManifest>;
    async fn fetch_details(&self, url: &str) -> Result<VersionDetails>;
}

/// HTTP 메타데이터 클라이언트
pub struct HttpMetadataSource {
    manifest_url: String,
    http: reqwest::Client,
}

impl HttpMetadataSource {
    pub fn new(manifest_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mc-remote-core/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            manifest_url: manifest_url.to_string(),
            http,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("GET {} returned {}", url, response.status());
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch_manifest(&self) -> Result<VersionManifest> {
        self.get_json(&self.manifest_url).await
    }

    async fn fetch_details(&self, url: &str) -> Result<VersionDetails> {
        self.get_json(url).await
    }
}

/// 스냅샷(`23w31a`), 프리릴리스, 릴리스 후보 id 판별
pub fn has_prerelease_marker(id: &str) -> bool {
    let lower = id.to_lowercase();
    lower.contains('w') || lower.contains("pre") || lower.contains("rc") || lower.contains("snapshot")
}

fn is_release(id: &str, entry: &CachedVersion) -> bool {
    if !entry.kind.is_empty() && entry.kind != "release" {
        return false;
    }
    !has_prerelease_marker(id)
}

pub struct VersionResolver {
    source: Arc<dyn MetadataSource>,
    cache: VersionCache,
}

impl VersionResolver {
    pub fn new(source: Arc<dyn MetadataSource>, cache: VersionCache) -> Self {
        Self { source, cache }
    }

    pub fn from_config(versions: &VersionsConfig, storage: &StorageConfig) -> Result<Self> {
        let source = HttpMetadataSource::new(
            &versions.manifest_url,
            Duration::from_secs(versions.request_timeout_secs),
        )?;
        let cache = VersionCache::new(
            storage.versions_cache_file(),
            Duration::from_secs(versions.cache_ttl_secs),
        );
        Ok(Self::new(Arc::new(source), cache))
    }

    /// 사용 가능한 버전 id 목록(최신순). `limit` 은 최소 1 로 취급합니다.
    pub async fn list_versions(&self, releases_only: bool, limit: usize) -> Vec<String> {
        let limit = limit.max(1);
        if let Some(doc) = self.cache.read_fresh().filter(|d| !d.is_empty()) {
            tracing::debug!("Using cached versions");
            return select(&doc, releases_only, limit);
        }

        match self.refresh_manifest().await {
            Ok(doc) => {
                let versions = select(&doc, releases_only, limit);
                tracing::info!("Found {} versions", versions.len());
                versions
            }
            Err(e) => {
                tracing::warn!("Version manifest unavailable ({}), using fallback list", e);
                fallback::fallback_versions(limit)
            }
        }
    }

    /// `version` 서버 아티팩트의 다운로드 URL
    pub async fn resolve_download_url(&self, version: &str) -> String {
        match self.try_resolve(version).await {
            Ok(url) => url,
            Err(e) => {
                let url = fallback::fallback_url(version);
                tracing::warn!("Could not resolve server URL for {} ({}), using fallback {}", version, e, url);
                url
            }
        }
    }

    async fn try_resolve(&self, version: &str) -> Result<String> {
        let cached = self.cache.read_fresh();
        if let Some(url) = cached.as_ref().and_then(|d| d.server_url(version)) {
            tracing::debug!("Using cached URL for {}", version);
            return Ok(url);
        }

        let detail_url = cached
            .as_ref()
            .and_then(|d| d.get(version))
            .map(|e| e.url)
            .filter(|u| !u.is_empty());
        let (mut doc, detail_url) = match (cached, detail_url) {
            (Some(doc), Some(url)) => (doc, url),
            _ => {
                let doc = self.refresh_manifest().await?;
                let url = doc
                    .get(version)
                    .map(|e| e.url)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("version {} not in manifest", version))?;
                (doc, url)
            }
        };

        let details = self.source.fetch_details(&detail_url).await?;
        let server_url = details
            .downloads
            .server
            .map(|a| a.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("no server download for {}", version))?;

        let mut entry = doc.get(version).unwrap_or_default();
        entry.server_url = Some(server_url.clone());
        doc.insert(version, &entry);
        self.cache.store(&doc);

        tracing::info!("Found server URL for {}", version);
        Ok(server_url)
    }

    /// 매니페스트를 받아 새 타임스탬프로 캐시에 씁니다. 이전에 찾은 서버 URL 은 유지합니다.
    async fn refresh_manifest(&self) -> Result<CacheDocument> {
        let manifest = self.source.fetch_manifest().await?;
        if manifest.versions.is_empty() {
            anyhow::bail!("manifest lists no versions");
        }

        let previous = self.cache.read_any().unwrap_or_default();
        let mut doc = CacheDocument {
            timestamp: self.cache.now(),
            ..Default::default()
        };
        for v in manifest.versions {
            let entry = CachedVersion {
                kind: v.kind,
                url: v.url,
                server_url: previous.server_url(&v.id),
            };
            doc.insert(&v.id, &entry);
        }
        self.cache.store(&doc);
        Ok(doc)
    }
}

fn select(doc: &CacheDocument, releases_only: bool, limit: usize) -> Vec<String> {
    doc.entries()
        .filter(|(id, entry)| !releases_only || is_release(id, entry))
        .map(|(id, _)| id.to_string())
        .take(limit)
        .collect()
}
