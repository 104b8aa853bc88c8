//! Price cache with staleness-aware refresh
//!
//! Entries are keyed by `coin:currency` and persisted as a JSON map so they
//! survive restarts. A lookup younger than `max_age` never touches the
//! network. When a refresh fails and an older entry exists, that entry is
//! returned flagged [`Freshness::Stale`]; without one the fetch error
//! propagates.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::PriceSource;
use crate::models::{CacheEntry, CachedPrice, Freshness, PriceData, QueryKey};
use crate::utils::{CacheError, FetchError};

pub struct PriceCache<S> {
    source: S,
    path: Option<PathBuf>,
    entries: HashMap<QueryKey, CacheEntry>,
}

impl<S: PriceSource> PriceCache<S> {
    /// Cache backed by a file; a missing or unreadable file starts empty
    pub fn open(source: S, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        info!("Loaded {} cached price(s) from {}", entries.len(), path.display());
        Self {
            source,
            path: Some(path),
            entries,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Return the price for `key`, refreshing from the source when the cached
    /// entry is missing or older than `max_age`
    pub async fn get(
        &mut self,
        key: &QueryKey,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<CachedPrice, FetchError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(max_age, now) {
                debug!("Cache hit for {} (age {:?})", key, entry.age(now));
                return Ok(CachedPrice {
                    entry: entry.clone(),
                    freshness: Freshness::Fresh,
                });
            }
        }

        debug!("Cache miss for {}, fetching", key);
        match self.source.fetch_price(key).await {
            Ok(value) => {
                let entry = self.store(key, value, now);
                if let Err(e) = self.save() {
                    warn!("Failed to persist price cache: {}", e);
                }
                info!("Refreshed {} at {}", key, entry.value.price);
                Ok(CachedPrice {
                    entry,
                    freshness: Freshness::Refreshed,
                })
            }
            Err(e) => match self.entries.get(key) {
                Some(stale) => {
                    let age = stale.age(now);
                    warn!(
                        "Fetch for {} failed, using cached data from {:?} ago. Error: {}",
                        key, age, e
                    );
                    Ok(CachedPrice {
                        entry: stale.clone(),
                        freshness: Freshness::Stale { age },
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Store a value fetched elsewhere (e.g. a bulk market listing).
    /// Not persisted until [`PriceCache::save`] is called.
    pub fn record(&mut self, key: &QueryKey, value: PriceData, now: DateTime<Utc>) -> &CacheEntry {
        self.store(key, value, now);
        &self.entries[key]
    }

    /// Replace the entry for `key`; `fetched_at` never moves backwards
    fn store(&mut self, key: &QueryKey, value: PriceData, now: DateTime<Utc>) -> CacheEntry {
        let fetched_at = match self.entries.get(key) {
            Some(previous) if previous.fetched_at > now => previous.fetched_at,
            _ => now,
        };
        let entry = CacheEntry {
            key: key.clone(),
            value,
            fetched_at,
        };
        self.entries.insert(key.clone(), entry.clone());
        entry
    }

    /// Write all entries to the cache file, if this cache has one
    pub fn save(&self) -> Result<(), CacheError> {
        match &self.path {
            Some(path) => save_entries(path, &self.entries),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
impl<S> PriceCache<S> {
    /// Cache that is never written to disk
    pub fn in_memory(source: S) -> Self {
        Self {
            source,
            path: None,
            entries: HashMap::new(),
        }
    }

    pub fn peek(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn load_entries(path: &Path) -> HashMap<QueryKey, CacheEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!("Failed to read price cache {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&content) {
        Ok(map) => map
            .into_values()
            .map(|entry| (entry.key.clone(), entry))
            .collect(),
        Err(e) => {
            warn!("Ignoring corrupt price cache {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

/// Write through a temp file so a crash never leaves a half-written cache
fn save_entries(path: &Path, entries: &HashMap<QueryKey, CacheEntry>) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let map: BTreeMap<String, &CacheEntry> = entries
        .iter()
        .map(|(key, entry)| (key.to_string(), entry))
        .collect();
    let json = serde_json::to_string_pretty(&map)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
