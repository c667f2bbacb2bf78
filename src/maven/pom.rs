use std::collections::{BTreeMap, HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::maven::coordinates::{Coordinate, Exclusion, Gav, MavenClassifier};
use crate::maven::error::ModelError;
use crate::maven::license::License;
use crate::maven::repository::Repository;
use crate::maven::scope::Scope;

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// properties may refer to other properties; this bounds the substitution of self-referencing ones
const MAX_INTERPOLATION_PASSES: usize = 16;

/// Handle to a descriptor interned in a [PomSession]. Handles are only meaningful for the
///  session that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PomId(usize);

/// A declared dependency edge, pointing to the descriptor of its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub target: PomId,
    pub scope: Scope,
    pub classifier: MavenClassifier,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
}
impl Dependency {
    pub fn new(target: PomId, scope: Scope) -> Dependency {
        Dependency {
            target,
            scope,
            classifier: MavenClassifier::Unclassified,
            optional: false,
            exclusions: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<Scope>,
    pub classifier: MavenClassifier,
    pub exclusions: Vec<Exclusion>,
}
impl ManagedDependency {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>, version: Option<&str>) -> ManagedDependency {
        ManagedDependency {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.map(str::to_string),
            scope: None,
            classifier: MavenClassifier::Unclassified,
            exclusions: vec![],
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> ManagedDependency {
        self.scope = Some(scope);
        self
    }

    fn matches(&self, group_id: &str, artifact_id: &str) -> bool {
        self.group_id == group_id && self.artifact_id == artifact_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyManagementEntry {
    /// a literal managed coordinate
    Defined(ManagedDependency),
    /// a BOM whose effective dependency management is flattened in
    Imported(PomId),
}

impl DependencyManagementEntry {
    /// The managed dependencies this entry stands for. For an imported BOM this is the BOM's
    ///  effective dependency management, including what the BOM inherits or imports itself.
    pub fn dependencies(&self, session: &PomSession) -> Result<Vec<ManagedDependency>, ModelError> {
        self.flatten(session, &mut HashSet::new())
    }

    /// properties contributed to the importing descriptor; only BOM imports have any
    pub fn properties(&self, session: &PomSession) -> Result<BTreeMap<String, String>, ModelError> {
        match self {
            DependencyManagementEntry::Defined(_) => Ok(BTreeMap::new()),
            DependencyManagementEntry::Imported(bom) => session.get(*bom)?.effective_properties(),
        }
    }

    fn flatten(&self, session: &PomSession, importing: &mut HashSet<PomId>) -> Result<Vec<ManagedDependency>, ModelError> {
        match self {
            DependencyManagementEntry::Defined(d) => Ok(vec![d.clone()]),
            DependencyManagementEntry::Imported(bom) => session.get(*bom)?.flatten_management(importing),
        }
    }
}

/// Everything but the coordinate that goes into a descriptor
#[derive(Debug, Clone, Default)]
pub struct PomParts {
    pub parent: Option<PomId>,
    pub dependencies: Vec<Dependency>,
    pub dependency_management: Vec<DependencyManagementEntry>,
    pub licenses: Vec<License>,
    pub repositories: Vec<Repository>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Pom {
    coordinate: Coordinate,
    parent: Option<PomId>,
    dependencies: Vec<Dependency>,
    dependency_management: Vec<DependencyManagementEntry>,
    licenses: Vec<License>,
    repositories: Vec<Repository>,
    properties: BTreeMap<String, String>,
}

/// Interning table for the descriptors of one resolution run. Building a descriptor for a
///  coordinate that was built before returns the existing handle, so diamond dependencies end
///  up pointing at the same descriptor.
#[derive(Debug, Default)]
pub struct PomSession {
    poms: Vec<Pom>,
    index: HashMap<Coordinate, PomId>,
}

impl PomSession {
    pub fn new() -> PomSession {
        Default::default()
    }

    /// Returns the interned descriptor for `coordinate`. If there is one already, `parts` is
    ///  ignored.
    pub fn build(&mut self, coordinate: Coordinate, parts: PomParts) -> Result<PomId, ModelError> {
        if coordinate.artifact_id.is_empty() {
            return Err(ModelError::MissingArtifactId);
        }
        if let Some(id) = self.index.get(&coordinate) {
            trace!("descriptor for {} is already interned", coordinate);
            return Ok(*id);
        }

        if let Some(parent) = parts.parent {
            self.get(parent)?;
        }
        for dependency in &parts.dependencies {
            self.get(dependency.target)?;
        }
        for entry in &parts.dependency_management {
            if let DependencyManagementEntry::Imported(bom) = entry {
                self.get(*bom)?;
            }
        }

        let id = PomId(self.poms.len());
        trace!("interning descriptor for {} as {:?}", coordinate, id);
        self.index.insert(coordinate.clone(), id);
        self.poms.push(Pom {
            coordinate,
            parent: parts.parent,
            dependencies: parts.dependencies,
            dependency_management: parts.dependency_management,
            licenses: parts.licenses,
            repositories: parts.repositories,
            properties: parts.properties,
        });
        Ok(id)
    }

    /// The resolver interns a descriptor before resolving its dependencies so that dependency
    ///  cycles terminate; the edges are attached once they are known. A descriptor's edges are
    ///  attached at most once.
    pub(crate) fn attach_dependencies(&mut self, id: PomId, dependencies: Vec<Dependency>) -> Result<(), ModelError> {
        for dependency in &dependencies {
            self.get(dependency.target)?;
        }
        let pom = self.poms.get_mut(id.0)
            .ok_or(ModelError::UnknownPom(id.0))?;
        if pom.dependencies.is_empty() {
            pom.dependencies = dependencies;
        }
        Ok(())
    }

    pub fn lookup(&self, coordinate: &Coordinate) -> Option<PomId> {
        self.index.get(coordinate).copied()
    }

    pub fn get(&self, id: PomId) -> Result<PomRef<'_>, ModelError> {
        match self.poms.get(id.0) {
            Some(pom) => Ok(PomRef { session: self, id, pom }),
            None => Err(ModelError::UnknownPom(id.0)),
        }
    }

    pub fn len(&self) -> usize {
        self.poms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poms.is_empty()
    }
}

/// A view of one interned descriptor. Accessors that look at inherited data walk the parent
///  chain and fail with [ModelError::CyclicAncestry] if a descriptor turns out to be its own
///  ancestor.
#[derive(Debug, Clone, Copy)]
pub struct PomRef<'a> {
    session: &'a PomSession,
    id: PomId,
    pom: &'a Pom,
}

impl<'a> PomRef<'a> {
    pub fn id(&self) -> PomId {
        self.id
    }

    pub fn coordinate(&self) -> &'a Coordinate {
        &self.pom.coordinate
    }

    pub fn artifact_id(&self) -> &'a str {
        &self.pom.coordinate.artifact_id
    }

    pub fn parent(&self) -> Result<Option<PomRef<'a>>, ModelError> {
        self.pom.parent
            .map(|p| self.session.get(p))
            .transpose()
    }

    /// dependencies declared by this descriptor itself
    pub fn dependencies(&self) -> &'a [Dependency] {
        &self.pom.dependencies
    }

    /// dependency management entries declared by this descriptor itself
    pub fn dependency_management(&self) -> &'a [DependencyManagementEntry] {
        &self.pom.dependency_management
    }

    /// properties declared by this descriptor itself
    pub fn properties(&self) -> &'a BTreeMap<String, String> {
        &self.pom.properties
    }

    pub fn group_id(&self) -> Result<&'a str, ModelError> {
        self.ancestry()?
            .iter()
            .find_map(|p| p.pom.coordinate.group_id.as_deref())
            .ok_or_else(|| ModelError::MissingGroupId { coordinate: self.pom.coordinate.to_string() })
    }

    pub fn version(&self) -> Result<&'a str, ModelError> {
        self.ancestry()?
            .iter()
            .find_map(|p| p.pom.coordinate.version.as_deref())
            .ok_or_else(|| ModelError::MissingVersion { coordinate: self.pom.coordinate.to_string() })
    }

    pub fn gav(&self) -> Result<Gav, ModelError> {
        Ok(Gav::new(self.group_id()?, self.artifact_id(), self.version()?))
    }

    /// Looks up a property (`x` or `${x}`) in this descriptor, then up the parent chain.
    pub fn property(&self, name: &str) -> Result<Option<&'a str>, ModelError> {
        let key = strip_template(name);
        Ok(self.ancestry()?
            .iter()
            .find_map(|p| p.pom.properties.get(key))
            .map(String::as_str))
    }

    /// all properties visible to this descriptor, the closest declaration winning
    pub fn effective_properties(&self) -> Result<BTreeMap<String, String>, ModelError> {
        let mut result = BTreeMap::new();
        for pom in self.ancestry()?.iter().rev() {
            result.extend(pom.pom.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(result)
    }

    /// own dependency management entries first, followed by the parent's effective ones
    pub fn effective_dependency_management(&self) -> Result<Vec<&'a DependencyManagementEntry>, ModelError> {
        Ok(self.ancestry()?
            .iter()
            .flat_map(|p| p.pom.dependency_management.iter())
            .collect())
    }

    /// The flattened effective dependency management, in precedence order. Versions are
    ///  interpolated in the context of the descriptor declaring them, i.e. entries coming from
    ///  a BOM see the BOM's properties.
    pub fn managed_dependencies(&self) -> Result<Vec<ManagedDependency>, ModelError> {
        self.flatten_management(&mut HashSet::new())
    }

    pub fn managed_version(&self, group_id: &str, artifact_id: &str) -> Result<Option<String>, ModelError> {
        Ok(self.managed_dependencies()?
            .into_iter()
            .filter(|d| d.matches(group_id, artifact_id))
            .find_map(|d| d.version))
    }

    pub fn managed_scope(&self, group_id: &str, artifact_id: &str) -> Result<Option<Scope>, ModelError> {
        Ok(self.managed_dependencies()?
            .into_iter()
            .filter(|d| d.matches(group_id, artifact_id))
            .find_map(|d| d.scope))
    }

    /// Own dependencies, followed by those inherited from the parent chain that this descriptor
    ///  does not redeclare (same groupId, artifactId and classifier).
    pub fn effective_dependencies(&self) -> Result<Vec<&'a Dependency>, ModelError> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for pom in self.ancestry()? {
            for dependency in &pom.pom.dependencies {
                let target = self.session.get(dependency.target)?;
                let key = (target.group_id()?, target.artifact_id(), &dependency.classifier);
                if seen.insert(key) {
                    result.push(dependency);
                }
            }
        }
        Ok(result)
    }

    /// licenses of the closest descriptor in the parent chain that declares any
    pub fn licenses(&self) -> Result<&'a [License], ModelError> {
        Ok(self.ancestry()?
            .iter()
            .map(|p| p.pom.licenses.as_slice())
            .find(|l| !l.is_empty())
            .unwrap_or_default())
    }

    /// own repositories followed by inherited ones, without duplicates
    pub fn repositories(&self) -> Result<Vec<&'a Repository>, ModelError> {
        let mut result: Vec<&'a Repository> = Vec::new();
        for pom in self.ancestry()? {
            for repository in &pom.pom.repositories {
                if !result.contains(&repository) {
                    result.push(repository);
                }
            }
        }
        Ok(result)
    }

    /// Substitutes `${...}` placeholders. Keys are looked up in the property chain, then in the
    ///  built-in project properties, then in imported BOMs' properties. Unknown placeholders are
    ///  left as they are.
    pub fn interpolate(&self, text: &str) -> Result<String, ModelError> {
        interpolate(text, |key| self.lookup(key))
    }

    fn lookup(&self, key: &str) -> Result<Option<String>, ModelError> {
        if let Some(value) = self.property(key)? {
            return Ok(Some(value.to_string()));
        }
        if let Some(value) = self.builtin_property(key)? {
            return Ok(Some(value));
        }
        for entry in self.effective_dependency_management()? {
            if let DependencyManagementEntry::Imported(_) = entry {
                if let Some(value) = entry.properties(self.session)?.remove(key) {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    fn builtin_property(&self, key: &str) -> Result<Option<String>, ModelError> {
        let key = key.strip_prefix("project.")
            .or_else(|| key.strip_prefix("pom."))
            .unwrap_or(key);

        Ok(match key {
            "groupId" => Some(self.group_id()?.to_string()),
            "artifactId" => Some(self.artifact_id().to_string()),
            "version" => Some(self.version()?.to_string()),
            "parent.groupId" => self.parent()?.map(|p| p.group_id()).transpose()?.map(str::to_string),
            "parent.version" => self.parent()?.map(|p| p.version()).transpose()?.map(str::to_string),
            _ => None,
        })
    }

    fn flatten_management(&self, importing: &mut HashSet<PomId>) -> Result<Vec<ManagedDependency>, ModelError> {
        if !importing.insert(self.id) {
            return Err(ModelError::CyclicAncestry { coordinate: self.pom.coordinate.to_string() });
        }

        let mut result = Vec::new();
        for entry in self.effective_dependency_management()? {
            match entry {
                DependencyManagementEntry::Defined(d) => {
                    let mut d = d.clone();
                    d.version = d.version
                        .map(|v| self.interpolate(&v))
                        .transpose()?;
                    result.push(d);
                }
                DependencyManagementEntry::Imported(_) => {
                    result.extend(entry.flatten(self.session, importing)?);
                }
            }
        }

        importing.remove(&self.id);
        Ok(result)
    }

    /// this descriptor followed by its ancestors
    fn ancestry(&self) -> Result<Vec<PomRef<'a>>, ModelError> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(*self);
        while let Some(pom) = current {
            if !seen.insert(pom.id) {
                return Err(ModelError::CyclicAncestry { coordinate: self.pom.coordinate.to_string() });
            }
            chain.push(pom);
            current = pom.parent()?;
        }
        Ok(chain)
    }
}

fn strip_template(name: &str) -> &str {
    name.strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(name)
}

pub(crate) fn interpolate<F>(text: &str, mut lookup: F) -> Result<String, ModelError>
where
    F: FnMut(&str) -> Result<Option<String>, ModelError>,
{
    let mut current = text.to_string();
    for _ in 0..MAX_INTERPOLATION_PASSES {
        if !current.contains("${") {
            break;
        }

        let mut result = String::with_capacity(current.len());
        let mut last = 0;
        let mut changed = false;
        for caps in PLACEHOLDER_REGEX.captures_iter(&current) {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };
            result.push_str(&current[last..whole.start()]);
            match lookup(&caps[1])? {
                Some(value) => {
                    result.push_str(&value);
                    changed = true;
                }
                None => result.push_str(whole.as_str()),
            }
            last = whole.end();
        }
        result.push_str(&current[last..]);
        current = result;

        if !changed {
            break;
        }
    }
    Ok(current)
}
