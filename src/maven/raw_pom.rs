use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::maven::coordinates::{Exclusion, Gav};
use crate::maven::repository::Repository;

/// A descriptor as the manifest parser hands it over: plain data, nothing inherited, no
///  placeholders substituted. This is also what the descriptor cache stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<Gav>,
    pub dependencies: Vec<RawDependency>,
    pub dependency_management: Vec<RawDependency>,
    pub licenses: Vec<String>,
    pub repositories: Vec<Repository>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub packaging_type: Option<String>,
    pub classifier: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
}

impl RawDependency {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>, version: Option<&str>) -> RawDependency {
        RawDependency {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: &str) -> RawDependency {
        self.scope = Some(scope.to_string());
        self
    }

    /// a dependency management entry with scope 'import' pulls in a BOM's managed dependencies
    pub fn is_bom_import(&self) -> bool {
        self.scope.as_deref() == Some("import")
    }
}

impl RawPom {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> RawPom {
        RawPom {
            group_id: Some(group_id.to_string()),
            artifact_id: Some(artifact_id.to_string()),
            version: Some(version.to_string()),
            ..Default::default()
        }
    }

    /// groupId, falling back to the one declared in the parent reference
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
            .or_else(|| self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    /// version, falling back to the one declared in the parent reference
    pub fn effective_version(&self) -> Option<&str> {
        self.version.as_deref()
            .or_else(|| self.parent.as_ref().map(|p| p.version.as_str()))
    }
}
