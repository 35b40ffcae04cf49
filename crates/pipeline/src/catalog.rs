//! Abstract scene catalogs with LRU read caching
//!
//! The tile/scene store is an external collaborator: the pipeline only
//! needs a read-only source addressed by collection id + band selection +
//! filter. [`MemoryCatalog`] backs tests and local runs;
//! [`CachingCatalog`] wraps any catalog with an LRU cache keyed by
//! (collection id, band list) and bounded by byte footprint; upstream
//! scenes are immutable once published, so cached reads never go stale.

use crate::collection::{RasterCollection, SceneFilter};
use log::debug;
use lru::LruCache;
use marisma_core::{Error, Raster, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Read-only scene source.
///
/// Implementations surface their own failures as [`Error::External`]
/// with the failing operation and identifier; the pipeline never retries
/// on their behalf.
pub trait RasterCatalog {
    /// Load a collection, optionally restricted to a band selection,
    /// filtered by the given predicates.
    fn load(
        &self,
        collection_id: &str,
        bands: Option<&[&str]>,
        filter: &SceneFilter,
    ) -> Result<RasterCollection>;
}

/// In-process catalog over preloaded collections
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    collections: HashMap<String, RasterCollection>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, collection: RasterCollection) {
        self.collections.insert(id.into(), collection);
    }

    pub fn from_scenes(id: impl Into<String>, scenes: Vec<Raster>) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.insert(id, RasterCollection::from_scenes(scenes)?);
        Ok(catalog)
    }
}

impl RasterCatalog for MemoryCatalog {
    fn load(
        &self,
        collection_id: &str,
        bands: Option<&[&str]>,
        filter: &SceneFilter,
    ) -> Result<RasterCollection> {
        let collection =
            self.collections
                .get(collection_id)
                .ok_or_else(|| Error::External {
                    operation: "load".to_string(),
                    id: collection_id.to_string(),
                    detail: "unknown collection id".to_string(),
                })?;
        let selected = match bands {
            Some(names) => collection.map(|scene| scene.select(names))?,
            None => collection.clone(),
        };
        Ok(selected.filter(filter))
    }
}

struct CacheState {
    entries: LruCache<String, Arc<RasterCollection>>,
    bytes: usize,
}

/// LRU caching wrapper around any catalog.
///
/// Cache entries are content-addressed by (collection id, band list) and
/// hold the *unfiltered* band-selected collection; filters apply on the
/// way out, so one upstream read serves every date range and cloud
/// ceiling. Eviction is least-recently-used by byte footprint; a
/// collection larger than the whole budget is served but never cached.
pub struct CachingCatalog<C> {
    inner: C,
    state: Mutex<CacheState>,
    max_bytes: usize,
}

impl<C: RasterCatalog> CachingCatalog<C> {
    pub fn new(inner: C, max_bytes: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Number of cached collections
    pub fn cached_entries(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").entries.len()
    }

    /// Bytes currently held by the cache
    pub fn cached_bytes(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").bytes
    }

    fn cache_key(collection_id: &str, bands: Option<&[&str]>) -> String {
        match bands {
            Some(names) => format!("{}|{}", collection_id, names.join(",")),
            None => format!("{}|*", collection_id),
        }
    }
}

impl<C: RasterCatalog> RasterCatalog for CachingCatalog<C> {
    fn load(
        &self,
        collection_id: &str,
        bands: Option<&[&str]>,
        filter: &SceneFilter,
    ) -> Result<RasterCollection> {
        let key = Self::cache_key(collection_id, bands);

        {
            let mut state = self.state.lock().expect("cache lock poisoned");
            if let Some(cached) = state.entries.get(&key) {
                debug!("catalog cache hit for {}", key);
                let collection = Arc::clone(cached);
                drop(state);
                return Ok(collection.filter(filter));
            }
        }

        let loaded = Arc::new(self.inner.load(collection_id, bands, &SceneFilter::new())?);
        let size = loaded.byte_size();

        if size <= self.max_bytes {
            let mut state = self.state.lock().expect("cache lock poisoned");
            if let Some((_, replaced)) = state.entries.push(key.clone(), Arc::clone(&loaded)) {
                state.bytes -= replaced.byte_size();
            }
            state.bytes += size;
            while state.bytes > self.max_bytes {
                match state.entries.pop_lru() {
                    Some((evicted_key, evicted)) => {
                        debug!("catalog cache evicting {}", evicted_key);
                        state.bytes -= evicted.byte_size();
                    }
                    None => break,
                }
            }
        } else {
            debug!(
                "collection {} ({} bytes) exceeds cache budget {}; not cached",
                key, size, self.max_bytes
            );
        }

        Ok(loaded.filter(filter))
    }
}
