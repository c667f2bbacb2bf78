pub mod disk;
pub mod in_memory;
pub mod noop;
pub mod unresolvable;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::maven::coordinates::Gav;
use crate::maven::metadata::MavenMetadata;
use crate::maven::raw_pom::RawPom;
use crate::maven::repository::Repository;

/// The outcome of a cache lookup: a value that was known before, a value that was just
///  computed, or a memoized failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResult<T> {
    Cached(T),
    Updated(T),
    Unavailable,
}

impl<T> CacheResult<T> {
    pub fn value(self) -> Option<T> {
        match self {
            CacheResult::Cached(v) | CacheResult::Updated(v) => Some(v),
            CacheResult::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheResult::Unavailable)
    }
}

/// What a store holds for a key: a value, or the memoized fact that computing it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEntry<V> {
    Present(V),
    Unavailable,
}

/// A single key / value collection of a cache backend.
pub trait CacheStore<V> {
    /// `&mut self` since looking up may update the store's bookkeeping (e.g. LRU order)
    fn get(&mut self, key: &str) -> Option<CacheEntry<V>>;

    fn put(&mut self, key: &str, entry: CacheEntry<V>) -> anyhow::Result<()>;
}

/// The descriptor cache of a resolution session. Backends provide the three collections; the
///  fetch-or-compute contract lives in the provided methods:
///
/// * a memoized failure for the key short-circuits to [CacheResult::Unavailable] without
///   calling the factory
/// * a known value is returned as [CacheResult::Cached]
/// * otherwise the factory is called; its value is stored and returned as
///   [CacheResult::Updated], while a failure is memoized and returned to this caller only
///
/// Implementations are not synchronized; share them between threads behind a lock.
pub trait MavenCache {
    fn poms(&mut self) -> &mut dyn CacheStore<RawPom>;
    fn metadata(&mut self) -> &mut dyn CacheStore<MavenMetadata>;
    fn repositories(&mut self) -> &mut dyn CacheStore<Repository>;

    /// coordinates that are known not to exist anywhere
    fn is_unresolvable(&self, _gav: &Gav) -> bool {
        false
    }

    /// Flushes and releases whatever the backend holds on to (files, locks).
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn lookup_pom(&mut self, repository: &Repository, gav: &Gav) -> Option<CacheResult<RawPom>> {
        if self.is_unresolvable(gav) {
            trace!("{} is known to be unresolvable", gav);
            return Some(CacheResult::Unavailable);
        }
        lookup(self.poms(), &pom_key(repository, gav))
    }

    fn record_pom(&mut self, repository: &Repository, gav: &Gav, fetched: anyhow::Result<RawPom>) -> anyhow::Result<CacheResult<RawPom>> {
        record(self.poms(), &pom_key(repository, gav), fetched)
    }

    fn compute_pom<F>(&mut self, repository: &Repository, gav: &Gav, fetch: F) -> anyhow::Result<CacheResult<RawPom>>
    where
        F: FnOnce() -> anyhow::Result<RawPom>,
        Self: Sized,
    {
        if let Some(hit) = self.lookup_pom(repository, gav) {
            return Ok(hit);
        }
        self.record_pom(repository, gav, fetch())
    }

    fn compute_metadata<F>(&mut self, repository: &Repository, group_id: &str, artifact_id: &str, fetch: F) -> anyhow::Result<CacheResult<MavenMetadata>>
    where
        F: FnOnce() -> anyhow::Result<MavenMetadata>,
        Self: Sized,
    {
        compute(self.metadata(), &metadata_key(repository, group_id, artifact_id), fetch)
    }

    fn compute_repository<F>(&mut self, repository: &Repository, normalize: F) -> anyhow::Result<CacheResult<Repository>>
    where
        F: FnOnce() -> anyhow::Result<Repository>,
        Self: Sized,
    {
        compute(self.repositories(), &repository.url, normalize)
    }
}

pub fn pom_key(repository: &Repository, gav: &Gav) -> String {
    format!("{}|{}", repository.url, gav)
}

pub fn metadata_key(repository: &Repository, group_id: &str, artifact_id: &str) -> String {
    format!("{}|{}:{}", repository.url, group_id, artifact_id)
}

/// the fetch-or-compute contract for a single store
pub fn compute<V, F>(store: &mut dyn CacheStore<V>, key: &str, fetch: F) -> anyhow::Result<CacheResult<V>>
where
    V: Clone,
    F: FnOnce() -> anyhow::Result<V>,
{
    if let Some(hit) = lookup(store, key) {
        return Ok(hit);
    }
    record(store, key, fetch())
}

fn lookup<V>(store: &mut dyn CacheStore<V>, key: &str) -> Option<CacheResult<V>> {
    match store.get(key)? {
        CacheEntry::Present(v) => {
            trace!("cache hit for {}", key);
            Some(CacheResult::Cached(v))
        }
        CacheEntry::Unavailable => {
            trace!("memoized failure for {}", key);
            Some(CacheResult::Unavailable)
        }
    }
}

fn record<V: Clone>(store: &mut dyn CacheStore<V>, key: &str, fetched: anyhow::Result<V>) -> anyhow::Result<CacheResult<V>> {
    match fetched {
        Ok(value) => {
            match store.put(key, CacheEntry::Present(value.clone())) {
                Ok(()) => trace!("cached {}", key),
                Err(e) => warn!("not caching {}: {:#}", key, e),
            }
            Ok(CacheResult::Updated(value))
        }
        Err(e) => {
            debug!("memoizing failure for {}: {:#}", key, e);
            if let Err(store_error) = store.put(key, CacheEntry::Unavailable) {
                warn!("failed to memoize failure for {}: {:#}", key, store_error);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;

    /// Exercises the fetch-or-compute contract against any backend that stores entries.
    pub(crate) fn check_contract(cache: &mut impl MavenCache) {
        crate::init_test_logging();
        let repo = Repository::new("https://repo.example.com/");
        let gav = Gav::new("org.a", "b", "1.0");
        let calls = Cell::new(0);

        let first = cache.compute_pom(&repo, &gav, || {
            calls.set(calls.get() + 1);
            Ok(RawPom::new("org.a", "b", "1.0"))
        }).unwrap();
        assert_eq!(first, CacheResult::Updated(RawPom::new("org.a", "b", "1.0")));

        let second = cache.compute_pom(&repo, &gav, || {
            calls.set(calls.get() + 1);
            Ok(RawPom::default())
        }).unwrap();
        assert_eq!(second, CacheResult::Cached(RawPom::new("org.a", "b", "1.0")));
        assert_eq!(calls.get(), 1);

        // negative memoization: the first caller sees the failure, later callers don't
        let missing = Gav::new("org.a", "missing", "1.0");
        let failed = cache.compute_pom(&repo, &missing, || {
            calls.set(calls.get() + 1);
            Err(anyhow!("not found"))
        });
        assert_eq!(failed.unwrap_err().to_string(), "not found");

        let memoized = cache.compute_pom(&repo, &missing, || {
            calls.set(calls.get() + 1);
            Err(anyhow!("not found again"))
        }).unwrap();
        assert_eq!(memoized, CacheResult::Unavailable);
        assert_eq!(calls.get(), 2);

        // the same coordinate in another repository is a different key
        let other_repo = Repository::new("https://other.example.com/");
        let elsewhere = cache.compute_pom(&other_repo, &missing, || Ok(RawPom::new("org.a", "missing", "1.0"))).unwrap();
        assert!(matches!(elsewhere, CacheResult::Updated(_)));

        let metadata = cache.compute_metadata(&repo, "org.a", "b", || Ok(MavenMetadata::default())).unwrap();
        assert_eq!(metadata, CacheResult::Updated(MavenMetadata::default()));
        let metadata = cache.compute_metadata(&repo, "org.a", "b", || Err(anyhow!("unexpected"))).unwrap();
        assert_eq!(metadata, CacheResult::Cached(MavenMetadata::default()));

        let normalized = cache.compute_repository(&repo, || Ok(repo.normalized())).unwrap();
        assert_eq!(normalized.value().map(|r| r.url), Some("https://repo.example.com/".to_string()));
    }

    #[test]
    fn test_cache_result_value() {
        assert_eq!(CacheResult::Cached(1).value(), Some(1));
        assert_eq!(CacheResult::Updated(2).value(), Some(2));
        assert_eq!(CacheResult::<i32>::Unavailable.value(), None);
        assert!(CacheResult::<i32>::Unavailable.is_unavailable());
    }

    #[test]
    fn test_keys() {
        let repo = Repository::new("https://repo.example.com/");
        assert_eq!(pom_key(&repo, &Gav::new("org.a", "b", "1")), "https://repo.example.com/|org.a:b:1");
        assert_eq!(metadata_key(&repo, "org.a", "b"), "https://repo.example.com/|org.a:b");
    }
}
