use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::maven::coordinates::MavenVersion;

pub const MAVEN_CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2/";

/// A remote repository descriptors are fetched from. Two repositories are the same repository
///  if their URLs are equal, regardless of their policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    #[serde(default = "enabled")]
    pub releases_enabled: bool,
    #[serde(default = "enabled")]
    pub snapshots_enabled: bool,
}

fn enabled() -> bool {
    true
}

impl Repository {
    pub fn new(url: impl Into<String>) -> Repository {
        Repository {
            url: url.into(),
            releases_enabled: true,
            snapshots_enabled: true,
        }
    }

    pub fn maven_central() -> Repository {
        Repository {
            url: MAVEN_CENTRAL_URL.to_string(),
            releases_enabled: true,
            snapshots_enabled: false,
        }
    }

    /// whether this repository's policy allows looking up `version` in it
    pub fn accepts(&self, version: &MavenVersion) -> bool {
        if version.is_snapshot() {
            self.snapshots_enabled
        }
        else {
            self.releases_enabled
        }
    }

    /// the same repository with a canonical URL: surrounding whitespace removed, with trailing '/'
    pub fn normalized(&self) -> Repository {
        let mut url = self.url.trim().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }

        Repository {
            url,
            releases_enabled: self.releases_enabled,
            snapshots_enabled: self.snapshots_enabled,
        }
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}
impl Eq for Repository {}

impl Hash for Repository {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}
