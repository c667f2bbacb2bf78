use crate::cache::{CacheEntry, CacheStore, MavenCache};
use crate::maven::metadata::MavenMetadata;
use crate::maven::raw_pom::RawPom;
use crate::maven::repository::Repository;

/// A store that forgets everything it is given
pub struct NoopStore;

impl<V> CacheStore<V> for NoopStore {
    fn get(&mut self, _key: &str) -> Option<CacheEntry<V>> {
        None
    }

    fn put(&mut self, _key: &str, _entry: CacheEntry<V>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Calls the factory on every lookup, for tests or when caching would give wrong results
pub struct NoopCache {
    store: NoopStore,
}
impl NoopCache {
    pub fn new() -> NoopCache {
        NoopCache { store: NoopStore }
    }
}
impl Default for NoopCache {
    fn default() -> Self {
        NoopCache::new()
    }
}

impl MavenCache for NoopCache {
    fn poms(&mut self) -> &mut dyn CacheStore<RawPom> {
        &mut self.store
    }

    fn metadata(&mut self) -> &mut dyn CacheStore<MavenMetadata> {
        &mut self.store
    }

    fn repositories(&mut self) -> &mut dyn CacheStore<Repository> {
        &mut self.store
    }
}
