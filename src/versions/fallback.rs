//! 메타데이터 서비스에 닿지 못할 때 쓰는 고정 데이터

/// 최신순
pub const FALLBACK_VERSIONS: &[&str] = &[
    "1.21.3", "1.21.2", "1.21.1", "1.21",
    "1.20.6", "1.20.4", "1.20.2", "1.20.1", "1.20",
    "1.19.4", "1.19.3", "1.19.2", "1.19.1", "1.19",
    "1.18.2", "1.18.1", "1.18",
    "1.17.1", "1.17",
    "1.16.5", "1.16.4", "1.16.3", "1.16.2", "1.16.1",
    "1.15.2", "1.14.4", "1.13.2", "1.12.2",
    "1.11.2", "1.10.2", "1.9.4", "1.8.9",
];

pub const FALLBACK_URLS: &[(&str, &str)] = &[
    ("1.21.3", "https://piston-data.mojang.com/v1/objects/45810d238246d90e811d896f87b14695b7fb6839/server.jar"),
    ("1.21.2", "https://piston-data.mojang.com/v1/objects/7bf27679d8d45e4669a59c0d6c20a7df2b4e1e9c/server.jar"),
    ("1.20.1", "https://piston-data.mojang.com/v1/objects/84194a2f286ef7c14ed7ce0090dba59902951553/server.jar"),
    ("1.19.4", "https://piston-data.mojang.com/v1/objects/8f3112a1049751cc472ec13e397eade5336ca7ae/server.jar"),
    ("1.18.2", "https://piston-data.mojang.com/v1/objects/c8f83c5655308435b3dcf03c06d9fe8740a77469/server.jar"),
    ("1.16.5", "https://launcher.mojang.com/v1/objects/1b557e7b033b583cd9f66746b7a9ab1ec1673ced/server.jar"),
    ("1.12.2", "https://launcher.mojang.com/v1/objects/886945bfb2b978778c3a0288fd7fab09d315b25f/server.jar"),
    ("1.8.9", "https://launcher.mojang.com/v1/objects/b58b2ceb36e01bcd8dbf49c8fb66c55a9f0676cd/server.jar"),
];

pub fn fallback_versions(limit: usize) -> Vec<String> {
    FALLBACK_VERSIONS.iter().take(limit).map(|v| v.to_string()).collect()
}

/// 모르는 버전은 알려진 최신 아티팩트를 받습니다.
pub fn fallback_url(version: &str) -> String {
    FALLBACK_URLS
        .iter()
        .find(|(v, _)| *v == version)
        .unwrap_or(&FALLBACK_URLS[0])
        .1
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_versions_respect_limit() {
        assert_eq!(fallback_versions(3), vec!["1.21.3", "1.21.2", "1.21.1"]);
        assert_eq!(fallback_versions(1000).len(), FALLBACK_VERSIONS.len());
    }

    #[test]
    fn test_fallback_url_known_and_unknown() {
        assert!(fallback_url("1.16.5").contains("1b557e7b033b583cd9f66746b7a9ab1ec1673ced"));
        assert_eq!(fallback_url("0.0.1"), FALLBACK_URLS[0].1);
    }

    #[test]
    fn test_every_fallback_url_version_is_listed() {
        for (version, url) in FALLBACK_URLS {
            assert!(FALLBACK_VERSIONS.contains(version));
            assert!(url.ends_with("/server.jar"));
        }
    }
}
