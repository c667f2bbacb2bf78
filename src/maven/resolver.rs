use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tracing::{debug, trace, warn};

use crate::cache::{CacheResult, MavenCache};
use crate::maven::coordinates::{Coordinate, Exclusion, Gav, MavenClassifier, MavenVersion, DEFAULT_TYPE};
use crate::maven::error::ModelError;
use crate::maven::license::License;
use crate::maven::metadata::MavenMetadata;
use crate::maven::pom::{self, Dependency, DependencyManagementEntry, ManagedDependency, PomId, PomParts, PomSession};
use crate::maven::raw_pom::{RawDependency, RawPom};
use crate::maven::repository::Repository;
use crate::maven::scope::{self, Scope};

/// Where descriptors come from on a cache miss: parsing and transport live behind this trait.
///  Calls are blocking.
pub trait DescriptorSource: Send + Sync {
    fn fetch_pom(&self, repository: &Repository, gav: &Gav) -> anyhow::Result<RawPom>;

    fn fetch_metadata(&self, repository: &Repository, group_id: &str, artifact_id: &str) -> anyhow::Result<MavenMetadata>;

    /// e.g. following redirects or mirror configuration; the result is cached per URL
    fn normalize_repository(&self, repository: &Repository) -> anyhow::Result<Repository> {
        Ok(repository.normalized())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub pom: PomId,
    pub gav: Gav,
    pub classifier: MavenClassifier,
    pub scope: Scope,
    pub optional: bool,
    /// 1 for the root's own dependencies
    pub depth: usize,
    pub requested_by: Gav,
}

/// The outcome of a resolution: every included dependency once (nearest declaration wins), in
///  breadth first order, plus the coordinates that could not be fetched.
#[derive(Debug)]
pub struct ResolvedGraph {
    pub session: PomSession,
    pub root: PomId,
    pub root_gav: Gav,
    pub dependencies: Vec<ResolvedDependency>,
    pub unavailable: Vec<Gav>,
}

impl ResolvedGraph {
    /// the dependencies on the classpath of `view`, e.g. `Scope::Runtime` for the runtime classpath
    pub fn view(&self, view: Scope) -> Vec<&ResolvedDependency> {
        self.dependencies.iter()
            .filter(|d| d.scope.is_in_classpath_of(view))
            .collect()
    }

    pub fn find(&self, group_id: &str, artifact_id: &str) -> Option<&ResolvedDependency> {
        self.dependencies.iter()
            .find(|d| d.gav.group_id == group_id && d.gav.artifact_id == artifact_id)
    }
}

struct Node {
    id: PomId,
    path_scope: Option<Scope>,
    exclusions: Vec<Exclusion>,
    depth: usize,
}

/// Resolves one project's dependency graph. The descriptors of a resolution live in the
///  resolver's [PomSession], which is handed over to the resulting [ResolvedGraph].
pub struct Resolver<'a, C: MavenCache> {
    cache: &'a mut C,
    source: &'a dyn DescriptorSource,
    repositories: Vec<Repository>,
    session: PomSession,
    raw_poms: HashMap<PomId, RawPom>,
    expanded: HashSet<PomId>,
    in_progress: HashSet<Coordinate>,
    unavailable: Vec<Gav>,
    root: Option<PomId>,
}

impl<'a, C: MavenCache> Resolver<'a, C> {
    pub fn new(cache: &'a mut C, source: &'a dyn DescriptorSource) -> Resolver<'a, C> {
        Resolver {
            cache,
            source,
            repositories: vec![Repository::maven_central()],
            session: PomSession::new(),
            raw_poms: HashMap::new(),
            expanded: HashSet::new(),
            in_progress: HashSet::new(),
            unavailable: Vec::new(),
            root: None,
        }
    }

    /// Repositories consulted for every descriptor, after those a descriptor declares itself.
    pub fn with_repositories(mut self, repositories: Vec<Repository>) -> Resolver<'a, C> {
        self.repositories = repositories;
        self
    }

    pub fn resolve(mut self, root: &RawPom) -> anyhow::Result<ResolvedGraph> {
        let configured = std::mem::take(&mut self.repositories);
        self.repositories = self.normalize_all(&configured);

        let root_id = match self.intern(root, &[])? {
            Some(id) => id,
            None => return Err(anyhow::anyhow!("the parent chain of {} is unavailable", root.artifact_id.as_deref().unwrap_or("?"))),
        };
        self.root = Some(root_id);
        let root_gav = self.session.get(root_id)?.gav()?;
        debug!("resolving dependencies of {}", root_gav);

        let dependencies = self.walk(root_id)?;
        debug!("resolved {} dependencies of {}, {} unavailable", dependencies.len(), root_gav, self.unavailable.len());

        Ok(ResolvedGraph {
            session: self.session,
            root: root_id,
            root_gav,
            dependencies,
            unavailable: self.unavailable,
        })
    }

    fn walk(&mut self, root: PomId) -> anyhow::Result<Vec<ResolvedDependency>> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        {
            let root = self.session.get(root)?;
            seen.insert((root.group_id()?.to_string(), root.artifact_id().to_string(), MavenClassifier::Unclassified));
        }

        let mut queue = VecDeque::new();
        queue.push_back(Node { id: root, path_scope: None, exclusions: vec![], depth: 0 });

        while let Some(node) = queue.pop_front() {
            self.expand(node.id, node.depth == 0)?;

            let pom = self.session.get(node.id)?;
            let requested_by = pom.gav()?;

            for dependency in pom.dependencies() {
                if node.depth > 0 && dependency.optional {
                    continue;
                }
                let scope = match scope::combine(node.path_scope, dependency.scope) {
                    Some(scope) => scope,
                    None => {
                        trace!("{:?} edge from {} excluded on a {:?} path", dependency.scope, requested_by, node.path_scope);
                        continue;
                    }
                };

                let gav = self.session.get(dependency.target)?.gav()?;
                if node.exclusions.iter().any(|e| e.matches(&gav.group_id, &gav.artifact_id)) {
                    trace!("{} is excluded below {}", gav, requested_by);
                    continue;
                }
                if !seen.insert((gav.group_id.clone(), gav.artifact_id.clone(), dependency.classifier.clone())) {
                    continue;
                }

                let mut exclusions = node.exclusions.clone();
                exclusions.extend(dependency.exclusions.iter().cloned());
                queue.push_back(Node {
                    id: dependency.target,
                    path_scope: Some(scope),
                    exclusions,
                    depth: node.depth + 1,
                });

                result.push(ResolvedDependency {
                    pom: dependency.target,
                    gav,
                    classifier: dependency.classifier.clone(),
                    scope,
                    optional: dependency.optional,
                    depth: node.depth + 1,
                    requested_by: requested_by.clone(),
                });
            }
        }
        Ok(result)
    }

    /// Attaches dependency edges to a descriptor: its own declarations followed by those it
    ///  inherits and does not redeclare, all resolved in the descriptor's own context so that its
    ///  properties and dependency management apply to inherited declarations too. The root gets
    ///  all of its edges, every other descriptor only those that can propagate (non-optional
    ///  compile and runtime), so nothing is fetched for edges the walk would drop anyway.
    fn expand(&mut self, id: PomId, all_edges: bool) -> anyhow::Result<()> {
        if !self.expanded.insert(id) {
            return Ok(());
        }

        let mut declared = Vec::new();
        {
            let pom = self.session.get(id)?;
            let mut seen = HashSet::new();
            let mut current = Some(pom);
            while let Some(ancestor) = current {
                for raw in self.raw_poms.get(&ancestor.id()).map(|r| r.dependencies.as_slice()).unwrap_or(&[]) {
                    let key = (
                        pom.interpolate(&raw.group_id)?,
                        pom.interpolate(&raw.artifact_id)?,
                        MavenClassifier::from_option(raw.classifier.as_deref()),
                    );
                    if seen.insert(key) {
                        declared.push(raw.clone());
                    }
                }
                current = ancestor.parent()?;
            }
        }

        let mut edges = Vec::new();
        for raw in &declared {
            if let Some(edge) = self.edge(id, raw, all_edges)? {
                edges.push(edge);
            }
        }
        self.session.attach_dependencies(id, edges)?;
        Ok(())
    }

    /// Resolves one declaration in the context of `declaring`. Below the root, the root's
    ///  dependency management pins version and scope ahead of the declaration.
    fn edge(&mut self, declaring: PomId, raw: &RawDependency, all_edges: bool) -> anyhow::Result<Option<Dependency>> {
        let (gav, scope, repositories) = {
            let pom = self.session.get(declaring)?;
            let root = match self.root {
                Some(root) if root != declaring => Some(self.session.get(root)?),
                _ => None,
            };

            let group_id = pom.interpolate(&raw.group_id)?;
            let artifact_id = pom.interpolate(&raw.artifact_id)?;

            let pinned_scope = match root {
                Some(root) => root.managed_scope(&group_id, &artifact_id)?,
                None => None,
            };
            let scope = match (pinned_scope, &raw.scope) {
                (Some(scope), _) => scope,
                (None, Some(s)) => pom.interpolate(s)?.parse::<Scope>()?,
                (None, None) => pom.managed_scope(&group_id, &artifact_id)?.unwrap_or(Scope::Compile),
            };

            if !all_edges && (raw.optional || !scope.is_transitive()) {
                return Ok(None);
            }

            let pinned_version = match root {
                Some(root) => root.managed_version(&group_id, &artifact_id)?,
                None => None,
            };
            let version = match (pinned_version, &raw.version) {
                (Some(version), _) => Some(version),
                (None, Some(v)) => Some(pom.interpolate(v)?),
                (None, None) => pom.managed_version(&group_id, &artifact_id)?,
            };
            let version = version.ok_or_else(|| ModelError::MissingVersion { coordinate: format!("{}:{}", group_id, artifact_id) })?;

            let mut repositories: Vec<Repository> = pom.repositories()?.into_iter().cloned().collect();
            for r in &self.repositories {
                if !repositories.contains(r) {
                    repositories.push(r.clone());
                }
            }
            (Gav::new(group_id, artifact_id, version), scope, repositories)
        };

        let gav = match self.resolve_version(gav, &repositories)? {
            Some(gav) => gav,
            None => return Ok(None),
        };
        let target = match self.fetch_pom(&gav, &repositories)? {
            Some(raw_target) => self.intern(&raw_target, &repositories)?,
            None => None,
        };

        Ok(target.map(|target| Dependency {
            target,
            scope,
            classifier: MavenClassifier::from_option(raw.classifier.as_deref()),
            optional: raw.optional,
            exclusions: raw.exclusions.clone(),
        }))
    }

    /// Interns the descriptor for `raw`, resolving its parent chain and BOM imports first.
    ///  Returns `None` if part of the chain is unavailable.
    fn intern(&mut self, raw: &RawPom, context: &[Repository]) -> anyhow::Result<Option<PomId>> {
        let coordinate = Coordinate::new(raw.effective_group_id(), raw.artifact_id.as_deref(), raw.effective_version())?
            .with_type(raw.packaging.as_deref().unwrap_or(DEFAULT_TYPE));

        if let Some(id) = self.session.lookup(&coordinate) {
            return Ok(Some(id));
        }
        if !self.in_progress.insert(coordinate.clone()) {
            return Err(ModelError::CyclicAncestry { coordinate: coordinate.to_string() }.into());
        }

        let result = self.do_intern(coordinate.clone(), raw, context);
        self.in_progress.remove(&coordinate);
        result
    }

    fn do_intern(&mut self, coordinate: Coordinate, raw: &RawPom, context: &[Repository]) -> anyhow::Result<Option<PomId>> {
        let mut repositories = self.normalize_all(&raw.repositories);
        let declared = repositories.clone();
        for r in context.iter().chain(self.repositories.iter()) {
            if !repositories.contains(r) {
                repositories.push(r.clone());
            }
        }

        let parent = match &raw.parent {
            None => None,
            Some(parent_gav) => {
                let parent = match self.fetch_pom(parent_gav, &repositories)? {
                    Some(parent_raw) => self.intern(&parent_raw, &repositories)?,
                    None => None,
                };
                if parent.is_none() {
                    debug!("parent {} of {} is unavailable", parent_gav, coordinate);
                    return Ok(None);
                }
                parent
            }
        };

        let mut dependency_management = Vec::new();
        for entry in &raw.dependency_management {
            let group_id = self.interpolate_raw(raw, parent, &entry.group_id)?;
            let artifact_id = self.interpolate_raw(raw, parent, &entry.artifact_id)?;

            if entry.is_bom_import() {
                let version = match &entry.version {
                    Some(v) => self.interpolate_raw(raw, parent, v)?,
                    None => return Err(ModelError::MissingVersion { coordinate: format!("{}:{}", group_id, artifact_id) }.into()),
                };
                let bom_gav = Gav::new(group_id, artifact_id, version);
                let bom = match self.fetch_pom(&bom_gav, &repositories)? {
                    Some(bom_raw) => self.intern(&bom_raw, &repositories)?,
                    None => None,
                };
                match bom {
                    Some(bom) => dependency_management.push(DependencyManagementEntry::Imported(bom)),
                    None => debug!("skipping unavailable BOM {} imported by {}", bom_gav, coordinate),
                }
            }
            else {
                let scope = entry.scope.as_deref()
                    .map(str::parse::<Scope>)
                    .transpose()?;
                dependency_management.push(DependencyManagementEntry::Defined(ManagedDependency {
                    group_id,
                    artifact_id,
                    version: entry.version.clone(),
                    scope,
                    classifier: MavenClassifier::from_option(entry.classifier.as_deref()),
                    exclusions: entry.exclusions.clone(),
                }));
            }
        }

        let id = self.session.build(coordinate, PomParts {
            parent,
            dependencies: vec![],
            dependency_management,
            licenses: raw.licenses.iter().map(|l| License::from_name(l)).collect(),
            repositories: declared,
            properties: raw.properties.clone(),
        })?;
        self.raw_poms.insert(id, raw.clone());
        Ok(Some(id))
    }

    /// substitution for a descriptor that is not interned yet, e.g. in BOM import coordinates
    fn interpolate_raw(&self, raw: &RawPom, parent: Option<PomId>, text: &str) -> anyhow::Result<String> {
        let parent = parent.map(|p| self.session.get(p)).transpose()?;
        let result = pom::interpolate(text, |key| {
            if let Some(value) = raw.properties.get(key) {
                return Ok(Some(value.clone()));
            }
            if let Some(parent) = parent {
                if let Some(value) = parent.property(key)? {
                    return Ok(Some(value.to_string()));
                }
            }
            let key = key.strip_prefix("project.")
                .or_else(|| key.strip_prefix("pom."))
                .unwrap_or(key);
            Ok(match key {
                "groupId" => raw.effective_group_id().map(str::to_string),
                "artifactId" => raw.artifact_id.clone(),
                "version" => raw.effective_version().map(str::to_string),
                _ => None,
            })
        })?;
        Ok(result)
    }

    /// Looks for the descriptor in each repository whose policy accepts its version, going
    ///  through the cache. `None` if no repository has it.
    fn fetch_pom(&mut self, gav: &Gav, repositories: &[Repository]) -> anyhow::Result<Option<RawPom>> {
        let source = self.source;
        let version = MavenVersion::parse(&gav.version);

        for repository in repositories.iter().filter(|r| r.accepts(&version)) {
            match self.cache.compute_pom(repository, gav, || source.fetch_pom(repository, gav)) {
                Ok(CacheResult::Cached(raw)) | Ok(CacheResult::Updated(raw)) => return Ok(Some(raw)),
                Ok(CacheResult::Unavailable) => {
                    trace!("{} is unavailable in {}", gav, repository.url);
                }
                Err(e) => {
                    warn!("failed to fetch {} from {}: {:#}", gav, repository.url, e);
                }
            }
        }

        debug!("{} is unavailable", gav);
        if !self.unavailable.contains(gav) {
            self.unavailable.push(gav.clone());
        }
        Ok(None)
    }

    /// Turns LATEST / RELEASE into a concrete version using the merged metadata of all
    ///  repositories.
    fn resolve_version(&mut self, gav: Gav, repositories: &[Repository]) -> anyhow::Result<Option<Gav>> {
        let version = MavenVersion::parse(&gav.version);
        if !version.is_dynamic() {
            return Ok(Some(gav));
        }

        let source = self.source;
        let mut merged: Option<MavenMetadata> = None;
        for repository in repositories {
            let fetched = self.cache.compute_metadata(repository, &gav.group_id, &gav.artifact_id, || {
                source.fetch_metadata(repository, &gav.group_id, &gav.artifact_id)
            });
            match fetched {
                Ok(CacheResult::Cached(m)) | Ok(CacheResult::Updated(m)) => {
                    merged = Some(match merged {
                        Some(previous) => previous.merge(m),
                        None => m,
                    });
                }
                Ok(CacheResult::Unavailable) => {}
                Err(e) => warn!("failed to fetch metadata for {}:{} from {}: {:#}", gav.group_id, gav.artifact_id, repository.url, e),
            }
        }

        match merged.and_then(|m| m.select(&version)) {
            Some(v) => {
                debug!("resolved {} to version {}", gav, v);
                Ok(Some(Gav::new(gav.group_id, gav.artifact_id, v)))
            }
            None => {
                debug!("no version found for {}", gav);
                if !self.unavailable.contains(&gav) {
                    self.unavailable.push(gav);
                }
                Ok(None)
            }
        }
    }

    fn normalize_all(&mut self, repositories: &[Repository]) -> Vec<Repository> {
        let source = self.source;
        let mut result: Vec<Repository> = Vec::new();
        for repository in repositories {
            match self.cache.compute_repository(repository, || source.normalize_repository(repository)) {
                Ok(CacheResult::Cached(r)) | Ok(CacheResult::Updated(r)) => {
                    if !result.contains(&r) {
                        result.push(r);
                    }
                }
                Ok(CacheResult::Unavailable) => trace!("skipping unusable repository {}", repository.url),
                Err(e) => warn!("skipping repository {}: {:#}", repository.url, e),
            }
        }
        result
    }
}

/// Fetches many descriptors concurrently, at most `parallelism` at a time, and stores them in
///  the shared cache. Only cache access is serialized; the fetches themselves run in parallel on
///  the blocking thread pool. The results are in the order of `gavs`, `None` for descriptors
///  that no repository has.
pub async fn prefetch_poms<C, S>(
    cache: Arc<Mutex<C>>,
    source: Arc<S>,
    repositories: Vec<Repository>,
    gavs: Vec<Gav>,
    parallelism: usize,
) -> Vec<(Gav, Option<RawPom>)>
where
    C: MavenCache,
    S: DescriptorSource + 'static,
{
    let repositories = Arc::new(repositories);
    futures::stream::iter(gavs)
        .map(|gav| {
            let cache = cache.clone();
            let source = source.clone();
            let repositories = repositories.clone();
            async move {
                let raw = prefetch_one(&cache, source, &repositories, &gav).await;
                (gav, raw)
            }
        })
        .buffered(parallelism.max(1))
        .collect()
        .await
}

async fn prefetch_one<C, S>(cache: &Mutex<C>, source: Arc<S>, repositories: &[Repository], gav: &Gav) -> Option<RawPom>
where
    C: MavenCache,
    S: DescriptorSource + 'static,
{
    let version = MavenVersion::parse(&gav.version);
    for repository in repositories.iter().filter(|r| r.accepts(&version)) {
        let known = cache.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .lookup_pom(repository, gav);
        match known {
            Some(CacheResult::Cached(raw)) | Some(CacheResult::Updated(raw)) => return Some(raw),
            Some(CacheResult::Unavailable) => continue,
            None => {}
        }

        let fetched = {
            let source = source.clone();
            let repository = repository.clone();
            let gav = gav.clone();
            tokio::task::spawn_blocking(move || source.fetch_pom(&repository, &gav)).await
        };
        let fetched = fetched.unwrap_or_else(|e| Err(anyhow::anyhow!("fetch task failed: {}", e)));

        let recorded = cache.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_pom(repository, gav, fetched);
        match recorded {
            Ok(result) => {
                if let Some(raw) = result.value() {
                    return Some(raw);
                }
            }
            Err(e) => warn!("failed to prefetch {} from {}: {:#}", gav, repository.url, e),
        }
    }
    None
}
