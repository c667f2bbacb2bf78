use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact_cache::local::LocalRemoteArtifactCache;
use crate::cache::disk::DiskCache;
use crate::maven::repository::Repository;

const DEFAULT_HEAP_BUDGET_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_PARALLELISM: usize = 8;

/// Settings of a resolution session, read from a JSON file. Every field has a default, so `{}`
///  is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// durable descriptor cache directory; without one the cache lives on the heap
    pub cache_workspace: Option<PathBuf>,
    pub heap_budget_bytes: usize,
    pub artifact_cache_dir: PathBuf,
    /// how many descriptors are prefetched concurrently
    pub parallelism: usize,
    pub repositories: Vec<Repository>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            cache_workspace: None,
            heap_budget_bytes: DEFAULT_HEAP_BUDGET_BYTES,
            artifact_cache_dir: PathBuf::from(".arti-resolver/artifacts"),
            parallelism: DEFAULT_PARALLELISM,
            repositories: vec![Repository::maven_central()],
        }
    }
}

impl ResolverSettings {
    pub fn load(path: &Path) -> anyhow::Result<ResolverSettings> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading resolver settings from {}", path.display()))?;
        let settings = Self::from_json(&json)
            .with_context(|| format!("parsing resolver settings in {}", path.display()))?;
        debug!("loaded resolver settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    pub fn from_json(json: &str) -> anyhow::Result<ResolverSettings> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn open_maven_cache(&self) -> anyhow::Result<DiskCache> {
        match &self.cache_workspace {
            Some(workspace) => DiskCache::open(workspace),
            None => Ok(DiskCache::in_memory(self.heap_budget_bytes)),
        }
    }

    pub async fn open_artifact_cache(&self) -> anyhow::Result<LocalRemoteArtifactCache> {
        LocalRemoteArtifactCache::open(&self.artifact_cache_dir).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::artifact_cache::RemoteArtifactCache;
    use crate::cache::MavenCache;

    #[test]
    fn test_empty_json_gives_defaults() {
        assert_eq!(ResolverSettings::from_json("{}").unwrap(), ResolverSettings::default());
    }

    #[test]
    fn test_partial_json() {
        let settings = ResolverSettings::from_json(r#"{
            "parallelism": 2,
            "repositories": [
                {"url": "https://repo.example.com/releases/", "snapshots_enabled": false}
            ]
        }"#).unwrap();

        assert_eq!(settings.parallelism, 2);
        assert_eq!(settings.heap_budget_bytes, DEFAULT_HEAP_BUDGET_BYTES);
        assert_eq!(settings.repositories.len(), 1);
        assert!(settings.repositories[0].releases_enabled);
        assert!(!settings.repositories[0].snapshots_enabled);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(ResolverSettings::from_json(r#"{"parallelism": "many"}"#).is_err());
    }

    #[test]
    fn test_load_and_open_durable_cache() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("workspace");
        let settings = ResolverSettings {
            cache_workspace: Some(workspace.clone()),
            ..Default::default()
        };
        let path = dir.path().join("settings.json");
        std::fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();

        let loaded = ResolverSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        let mut cache = loaded.open_maven_cache().unwrap();
        assert!(cache.is_durable());
        assert!(workspace.exists());
        cache.close().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let e = ResolverSettings::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(e.to_string().starts_with("reading resolver settings"));
    }

    #[test]
    fn test_heap_cache_without_workspace() {
        let cache = ResolverSettings::default().open_maven_cache().unwrap();
        assert!(!cache.is_durable());
    }

    #[tokio::test]
    async fn test_open_artifact_cache() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ResolverSettings {
            artifact_cache_dir: dir.path().join("artifacts"),
            ..Default::default()
        };
        let cache = settings.open_artifact_cache().await.unwrap();
        assert!(!cache.contains_key("https://repo.example.com/x.pom").await);
    }
}
