use serde::{Deserialize, Serialize};

use crate::maven::coordinates::MavenVersion;

/// A cleaned-up abstraction of the maven-metadata.xml file format described at
///  https://maven.apache.org/ref/3.9.5/maven-repository-metadata/repository-metadata.html,
///  restricted to what version selection needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MavenMetadata {
    pub versioning: Versioning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioning {
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
    pub last_updated: Option<String>,
    pub snapshot: Option<Snapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: String,
    pub build_number: Option<u32>,
}

impl MavenMetadata {
    /// Combines the metadata for the same artifact from several repositories. Versions keep the
    ///  order in which they were first seen; latest / release come from the most recently updated.
    pub fn merge(self, other: MavenMetadata) -> MavenMetadata {
        let (newer, older) = if other.versioning.last_updated > self.versioning.last_updated {
            (other, self)
        }
        else {
            (self, other)
        };

        let mut versions = older.versioning.versions;
        for v in newer.versioning.versions {
            if !versions.contains(&v) {
                versions.push(v);
            }
        }

        MavenMetadata {
            versioning: Versioning {
                latest: newer.versioning.latest.or(older.versioning.latest),
                release: newer.versioning.release.or(older.versioning.release),
                versions,
                last_updated: newer.versioning.last_updated.or(older.versioning.last_updated),
                snapshot: newer.versioning.snapshot.or(older.versioning.snapshot),
            }
        }
    }

    /// Resolves a dynamic version (LATEST, RELEASE) to a concrete one. Fixed versions are
    ///  returned as they are.
    pub fn select(&self, version: &MavenVersion) -> Option<String> {
        let v = &self.versioning;
        match version {
            MavenVersion::Release(s) | MavenVersion::Snapshot(s) => Some(s.clone()),
            MavenVersion::Latest => v.latest.clone()
                .or_else(|| v.versions.last().cloned()),
            MavenVersion::LatestRelease => v.release.clone()
                .or_else(|| v.versions.iter()
                    .rev()
                    .find(|s| !MavenVersion::parse(s).is_snapshot())
                    .cloned()
                ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn metadata(versions: &[&str], last_updated: &str) -> MavenMetadata {
        MavenMetadata {
            versioning: Versioning {
                versions: versions.iter().map(|s| s.to_string()).collect(),
                last_updated: Some(last_updated.to_string()),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_select_falls_back_to_version_list() {
        let m = metadata(&["1.0", "1.1", "2.0-SNAPSHOT"], "20240101000000");
        assert_eq!(m.select(&MavenVersion::Latest), Some("2.0-SNAPSHOT".to_string()));
        assert_eq!(m.select(&MavenVersion::LatestRelease), Some("1.1".to_string()));
        assert_eq!(m.select(&MavenVersion::parse("0.9")), Some("0.9".to_string()));
    }

    #[test]
    fn test_select_prefers_explicit_markers() {
        let mut m = metadata(&["1.0", "1.1"], "20240101000000");
        m.versioning.release = Some("1.0".to_string());
        assert_eq!(m.select(&MavenVersion::LatestRelease), Some("1.0".to_string()));
        assert_eq!(MavenMetadata::default().select(&MavenVersion::Latest), None);
    }

    #[test]
    fn test_merge() {
        let mut older = metadata(&["1.0", "1.1"], "20230101000000");
        older.versioning.release = Some("1.1".to_string());
        let mut newer = metadata(&["1.1", "1.2"], "20240101000000");
        newer.versioning.release = Some("1.2".to_string());

        let merged = newer.merge(older);
        assert_eq!(merged.versioning.versions, vec!["1.0", "1.1", "1.2"]);
        assert_eq!(merged.versioning.release, Some("1.2".to_string()));
        assert_eq!(merged.versioning.last_updated, Some("20240101000000".to_string()));
    }
}
