//! HTTPS client for the remote package index (spec.md §6's wire
//! protocol: "a per-package JSON metadata document (name, versions,
//! declared dependencies, summary)"). `ureq` is the thinnest synchronous
//! client that satisfies the interface spec.md places out of scope as an
//! external collaborator (§1: "the HTTP client used to fetch the package
//! index ... the TLS/TCP stack underneath it") without dragging an async
//! runtime into an otherwise synchronous compiler.

use crate::errors::{EmberError, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRelease {
    pub version: String,
    pub wheel_url: String,
    pub sha256: Option<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub summary: Option<String>,
    pub releases: Vec<PackageRelease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope {
    fetched_at_secs: u64,
    body: PackageMetadata,
}

/// Disk-cached index client: a per-package metadata fetch that's reused
/// for `ttl` before hitting the network again (spec.md §4.9: "Cache index
/// responses on disk (TTL default one day)").
pub struct IndexClient {
    base_url: String,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl IndexClient {
    pub fn new(base_url: impl Into<String>, cache_dir: PathBuf, ttl: Duration) -> Self {
        IndexClient {
            base_url: base_url.into(),
            cache_dir,
            ttl,
        }
    }

    fn cache_path(&self, package: &str) -> PathBuf {
        self.cache_dir.join(format!("{package}.json"))
    }

    pub fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata> {
        if let Some(cached) = self.read_cache(package) {
            return Ok(cached);
        }
        let body = self.fetch_live(package)?;
        self.write_cache(package, &body);
        Ok(body)
    }

    fn read_cache(&self, package: &str) -> Option<PackageMetadata> {
        let text = fs::read_to_string(self.cache_path(package)).ok()?;
        let envelope: CacheEnvelope = serde_json::from_str(&text).ok()?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        if now.saturating_sub(envelope.fetched_at_secs) > self.ttl.as_secs() {
            return None;
        }
        Some(envelope.body)
    }

    fn write_cache(&self, package: &str, body: &PackageMetadata) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let envelope = CacheEnvelope {
            fetched_at_secs: now,
            body: body.clone(),
        };
        if fs::create_dir_all(&self.cache_dir).is_ok() {
            if let Ok(text) = serde_json::to_string(&envelope) {
                let _ = fs::write(self.cache_path(package), text);
            }
        }
    }

    fn fetch_live(&self, package: &str) -> Result<PackageMetadata> {
        let url = format!("{}/{}/json", self.base_url.trim_end_matches('/'), package);
        let response = ureq::get(&url)
            .call()
            .map_err(|e| EmberError::new(ErrorKind::Download, format!("GET {url}: {e}")))?;
        response
            .into_json::<PackageMetadata>()
            .map_err(|e| EmberError::new(ErrorKind::Download, format!("parsing index response for {package}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_roundtrips_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let client = IndexClient::new("https://index.example", dir.path().to_path_buf(), Duration::from_secs(3600));
        let meta = PackageMetadata {
            name: "A".into(),
            summary: None,
            releases: vec![PackageRelease {
                version: "1.0".into(),
                wheel_url: "https://example/a-1.0.whl".into(),
                sha256: Some("deadbeef".into()),
                dependencies: vec![],
            }],
        };
        client.write_cache("A", &meta);
        let cached = client.read_cache("A").expect("cache hit");
        assert_eq!(cached.releases.len(), 1);
    }

    #[test]
    fn expired_cache_entry_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let client = IndexClient::new("https://index.example", dir.path().to_path_buf(), Duration::from_secs(0));
        let meta = PackageMetadata { name: "A".into(), summary: None, releases: vec![] };
        client.write_cache("A", &meta);
        std::thread::sleep(Duration::from_millis(1100));
        assert!(client.read_cache("A").is_none());
    }
}
