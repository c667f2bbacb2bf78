use std::collections::{HashMap, HashSet};

use crate::cache::unresolvable;
use crate::cache::{CacheEntry, CacheStore, MavenCache};
use crate::maven::coordinates::Gav;
use crate::maven::metadata::MavenMetadata;
use crate::maven::raw_pom::RawPom;
use crate::maven::repository::Repository;

pub struct MemoryStore<V> {
    entries: HashMap<String, CacheEntry<V>>,
}
impl<V> MemoryStore<V> {
    pub fn new() -> MemoryStore<V> {
        MemoryStore {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl<V: Clone> CacheStore<V> for MemoryStore<V> {
    fn get(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, entry: CacheEntry<V>) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }
}

/// Process-lifetime cache, pre-seeded with the bundled list of unresolvable coordinates
pub struct InMemoryCache {
    poms: MemoryStore<RawPom>,
    metadata: MemoryStore<MavenMetadata>,
    repositories: MemoryStore<Repository>,
    unresolvable: HashSet<Gav>,
}
impl InMemoryCache {
    pub fn new() -> InMemoryCache {
        InMemoryCache::with_unresolvable(unresolvable::bundled().iter().cloned())
    }

    pub fn with_unresolvable(unresolvable: impl IntoIterator<Item = Gav>) -> InMemoryCache {
        InMemoryCache {
            poms: MemoryStore::new(),
            metadata: MemoryStore::new(),
            repositories: MemoryStore::new(),
            unresolvable: unresolvable.into_iter().collect(),
        }
    }
}
impl Default for InMemoryCache {
    fn default() -> Self {
        InMemoryCache::new()
    }
}

impl MavenCache for InMemoryCache {
    fn poms(&mut self) -> &mut dyn CacheStore<RawPom> {
        &mut self.poms
    }

    fn metadata(&mut self) -> &mut dyn CacheStore<MavenMetadata> {
        &mut self.metadata
    }

    fn repositories(&mut self) -> &mut dyn CacheStore<Repository> {
        &mut self.repositories
    }

    fn is_unresolvable(&self, gav: &Gav) -> bool {
        self.unresolvable.contains(gav)
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;
    use crate::cache::CacheResult;

    #[test]
    fn test_contract() {
        crate::cache::test::check_contract(&mut InMemoryCache::new());
    }

    #[test]
    fn test_pre_seeded_negatives_never_invoke_the_factory() {
        let mut cache = InMemoryCache::new();
        let invoked = Cell::new(false);

        let result = cache.compute_pom(&Repository::maven_central(), &Gav::new("com.sun.jmx", "jmxri", "1.2.1"), || {
            invoked.set(true);
            Ok(RawPom::default())
        }).unwrap();

        assert_eq!(result, CacheResult::Unavailable);
        assert!(!invoked.get());
        assert!(cache.poms.is_empty());
    }

    #[test]
    fn test_custom_unresolvable_list() {
        let mut cache = InMemoryCache::with_unresolvable(vec![Gav::new("org.a", "gone", "1")]);
        let gone = cache.compute_pom(&Repository::maven_central(), &Gav::new("org.a", "gone", "1"), || Ok(RawPom::default())).unwrap();
        assert!(gone.is_unavailable());

        // the bundled list is not used when a custom one is given
        let jms = cache.compute_pom(&Repository::maven_central(), &Gav::new("javax.jms", "jms", "1.1"), || Ok(RawPom::default())).unwrap();
        assert!(!jms.is_unavailable());
    }
}
