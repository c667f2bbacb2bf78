use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use fs2::FileExt;
use lru::LruCache;
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::cache::unresolvable;
use crate::cache::{CacheEntry, CacheStore, MavenCache};
use crate::maven::coordinates::Gav;
use crate::maven::metadata::MavenMetadata;
use crate::maven::raw_pom::RawPom;
use crate::maven::repository::Repository;

/// bumped whenever the layout of a cached type changes; files with another version are discarded
const SCHEMA_VERSION: u32 = 1;

const LOCK_FILE: &str = "cache.lock";

#[derive(Serialize, Deserialize)]
struct TableFile<V> {
    schema: u32,
    entries: HashMap<String, CacheEntry<V>>,
}

enum Backing<V> {
    Durable {
        path: PathBuf,
        entries: HashMap<String, CacheEntry<V>>,
        dirty: bool,
    },
    /// entries are kept bincode-encoded so the budget is an actual byte count
    Heap {
        entries: LruCache<String, Vec<u8>>,
        used_bytes: usize,
        max_bytes: usize,
    },
}

pub struct DiskStore<V> {
    backing: Backing<V>,
}

impl<V: Serialize + DeserializeOwned> DiskStore<V> {
    fn durable(workspace: &Path, name: &str) -> DiskStore<V> {
        let path = workspace.join(format!("{}.bin", name));
        let entries = match read_table(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("discarding unreadable cache table {:?}: {:#}", path, e);
                HashMap::new()
            }
        };
        debug!("opened cache table {:?} with {} entries", path, entries.len());

        DiskStore {
            backing: Backing::Durable { path, entries, dirty: false },
        }
    }

    fn heap(max_bytes: usize) -> DiskStore<V> {
        DiskStore {
            backing: Backing::Heap {
                entries: LruCache::unbounded(),
                used_bytes: 0,
                max_bytes,
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Durable { entries, .. } => entries.len(),
            Backing::Heap { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if let Backing::Durable { path, entries, dirty } = &mut self.backing {
            if *dirty {
                write_table(path, entries)?;
                *dirty = false;
            }
        }
        Ok(())
    }
}

impl<V: Clone + Serialize + DeserializeOwned> CacheStore<V> for DiskStore<V> {
    fn get(&mut self, key: &str) -> Option<CacheEntry<V>> {
        match &mut self.backing {
            Backing::Durable { entries, .. } => entries.get(key).cloned(),
            Backing::Heap { entries, .. } => {
                let raw = entries.get(key)?;
                match bincode::deserialize(raw) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("dropping undecodable cache entry {}: {}", key, e);
                        entries.pop(key);
                        None
                    }
                }
            }
        }
    }

    fn put(&mut self, key: &str, entry: CacheEntry<V>) -> anyhow::Result<()> {
        match &mut self.backing {
            Backing::Durable { entries, dirty, .. } => {
                entries.insert(key.to_string(), entry);
                *dirty = true;
            }
            Backing::Heap { entries, used_bytes, max_bytes } => {
                let raw = bincode::serialize(&entry)?;
                let size = key.len() + raw.len();
                if size > *max_bytes {
                    return Err(anyhow!("cache entry {} ({} bytes) exceeds the budget of {} bytes", key, size, max_bytes));
                }

                if let Some(old) = entries.put(key.to_string(), raw) {
                    *used_bytes -= key.len() + old.len();
                }
                *used_bytes += size;

                while *used_bytes > *max_bytes {
                    match entries.pop_lru() {
                        Some((k, v)) => {
                            trace!("evicting {} from heap cache", k);
                            *used_bytes -= k.len() + v.len();
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
}

fn read_table<V: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<HashMap<String, CacheEntry<V>>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }

    // the file is only read while the workspace lock is held, so nobody truncates it under us
    let table: TableFile<V> = match unsafe { Mmap::map(&file) } {
        Ok(mmap) => bincode::deserialize(&mmap[..])?,
        Err(_) => bincode::deserialize(&fs::read(path)?)?,
    };

    if table.schema != SCHEMA_VERSION {
        return Err(anyhow!("schema version {} does not match {}", table.schema, SCHEMA_VERSION));
    }
    Ok(Some(table.entries))
}

fn write_table<V: Serialize>(path: &Path, entries: &HashMap<String, CacheEntry<V>>) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct TableFileRef<'a, V> {
        schema: u32,
        entries: &'a HashMap<String, CacheEntry<V>>,
    }

    let dir = path.parent().ok_or_else(|| anyhow!("cache table {:?} has no parent directory", path))?;
    let encoded = bincode::serialize(&TableFileRef { schema: SCHEMA_VERSION, entries })?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&encoded)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("replacing cache table {:?}", path))?;
    Ok(())
}

/// A cache that either persists into a workspace directory across sessions, or lives on the heap
///  with a byte budget. Both modes are pre-seeded with the bundled list of unresolvable coordinates.
pub struct DiskCache {
    poms: DiskStore<RawPom>,
    metadata: DiskStore<MavenMetadata>,
    repositories: DiskStore<Repository>,
    unresolvable: HashSet<Gav>,
    lock: Option<File>,
    closed: bool,
}

impl DiskCache {
    /// Opens (or creates) a durable cache in `workspace`. Only one process may have a workspace
    ///  open at a time.
    pub fn open(workspace: &Path) -> anyhow::Result<DiskCache> {
        fs::create_dir_all(workspace)
            .with_context(|| format!("creating cache workspace {:?}", workspace))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(workspace.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .with_context(|| format!("cache workspace {:?} is in use by another process", workspace))?;

        info!("opened durable cache in {:?}", workspace);
        Ok(DiskCache {
            poms: DiskStore::durable(workspace, "poms"),
            metadata: DiskStore::durable(workspace, "metadata"),
            repositories: DiskStore::durable(workspace, "repositories"),
            unresolvable: unresolvable::bundled().clone(),
            lock: Some(lock),
            closed: false,
        })
    }

    /// A non-persistent cache whose stores each hold at most `max_bytes` of encoded entries,
    ///  evicting the least recently used ones first.
    pub fn in_memory(max_bytes: usize) -> DiskCache {
        DiskCache {
            poms: DiskStore::heap(max_bytes),
            metadata: DiskStore::heap(max_bytes),
            repositories: DiskStore::heap(max_bytes),
            unresolvable: unresolvable::bundled().clone(),
            lock: None,
            closed: false,
        }
    }

    pub fn is_durable(&self) -> bool {
        self.lock.is_some()
    }
}

impl MavenCache for DiskCache {
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

    fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.poms.flush()?;
        self.metadata.flush()?;
        self.repositories.flush()?;

        if let Some(lock) = self.lock.take() {
            lock.unlock()?;
            debug!("released cache workspace lock");
        }
        Ok(())
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error closing cache: {:#}", e);
        }
    }
}
