use std::fmt::{Display, Formatter};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::maven::error::ModelError;

pub const DEFAULT_TYPE: &str = "jar";

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum MavenVersion {
    Release(String),
    Snapshot(String), // ending in '-SNAPSHOT'
    Latest,
    LatestRelease,
}
impl MavenVersion {
    pub fn parse(version: &str) -> MavenVersion {
        match version {
            "LATEST" => MavenVersion::Latest,
            "RELEASE" => MavenVersion::LatestRelease,
            v if v.ends_with("-SNAPSHOT") => MavenVersion::Snapshot(v.to_string()),
            v => MavenVersion::Release(v.to_string()),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, MavenVersion::Snapshot(_))
    }

    /// LATEST and RELEASE are placeholders that need repository metadata to become a version
    pub fn is_dynamic(&self) -> bool {
        matches!(self, MavenVersion::Latest | MavenVersion::LatestRelease)
    }
}

#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize)]
pub enum MavenClassifier {
    Unclassified,
    Classified(String),
}
impl MavenClassifier {
    pub fn from_option(classifier: Option<&str>) -> MavenClassifier {
        match classifier {
            None | Some("") => MavenClassifier::Unclassified,
            Some(c) => MavenClassifier::Classified(c.to_string()),
        }
    }
}

/// A fully specified groupId / artifactId / version triple. This is what gets fetched from a
///  repository, and what cache keys are made of.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gav {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}
impl Gav {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>, version: impl Into<String>) -> Gav {
        Gav {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// parses the 'groupId:artifactId:version' notation
    pub fn parse(s: &str) -> anyhow::Result<Gav> {
        let mut parts = s.trim().split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(g), Some(a), Some(v), None) if !g.is_empty() && !a.is_empty() && !v.is_empty() => {
                Ok(Gav::new(g, a, v))
            }
            _ => Err(anyhow!("not a valid groupId:artifactId:version coordinate: {:?}", s)),
        }
    }
}
impl Display for Gav {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Identity of a descriptor. groupId and version may be missing here, in which case they are
///  inherited from the parent descriptor.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct Coordinate {
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    pub packaging_type: String,
    pub classifier: MavenClassifier,
}
impl Coordinate {
    pub fn new(group_id: Option<&str>, artifact_id: Option<&str>, version: Option<&str>) -> Result<Coordinate, ModelError> {
        let artifact_id = match artifact_id {
            Some(a) if !a.is_empty() => a,
            _ => return Err(ModelError::MissingArtifactId),
        };

        Ok(Coordinate {
            group_id: group_id.filter(|g| !g.is_empty()).map(str::to_string),
            artifact_id: artifact_id.to_string(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
            packaging_type: DEFAULT_TYPE.to_string(),
            classifier: MavenClassifier::Unclassified,
        })
    }

    pub fn from_gav(gav: &Gav) -> Coordinate {
        Coordinate {
            group_id: Some(gav.group_id.clone()),
            artifact_id: gav.artifact_id.clone(),
            version: Some(gav.version.clone()),
            packaging_type: DEFAULT_TYPE.to_string(),
            classifier: MavenClassifier::Unclassified,
        }
    }

    pub fn with_type(mut self, packaging_type: &str) -> Coordinate {
        self.packaging_type = packaging_type.to_string();
        self
    }

    pub fn with_classifier(mut self, classifier: MavenClassifier) -> Coordinate {
        self.classifier = classifier;
        self
    }
}
impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id.as_deref().unwrap_or("?"),
            self.artifact_id,
            self.version.as_deref().unwrap_or("?"),
        )?;
        if self.packaging_type != DEFAULT_TYPE {
            write!(f, ":{}", self.packaging_type)?;
        }
        if let MavenClassifier::Classified(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        Ok(())
    }
}

/// An exclusion declared on a dependency edge; '*' matches any groupId or artifactId.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize)]
pub struct Exclusion {
    pub group_id: String,
    pub artifact_id: String,
}
impl Exclusion {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Exclusion {
        Exclusion {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }

    pub fn matches(&self, group_id: &str, artifact_id: &str) -> bool {
        (self.group_id == "*" || self.group_id == group_id)
            && (self.artifact_id == "*" || self.artifact_id == artifact_id)
    }
}
