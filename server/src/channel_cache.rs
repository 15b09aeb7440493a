use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use log::debug;

use replicant_shared::{ChangeSetMessage, ChannelAddress};

use crate::{data_source::ChannelLink, ServerError};

/// Content of a cacheable channel computed for one dataset generation
#[derive(Debug, Clone, PartialEq)]
pub struct CachedChannel {
    pub cache_key: String,
    /// The channel's add action and entity changes; carries no sequence,
    /// request id or etag
    pub change_set: ChangeSetMessage,
    pub links: Vec<ChannelLink>,
}

struct ChannelCacheEntry {
    content: RwLock<Option<Arc<CachedChannel>>>,
}

impl ChannelCacheEntry {
    fn new() -> Self {
        Self {
            content: RwLock::new(None),
        }
    }

    fn current(&self, cache_key: &str) -> Option<Arc<CachedChannel>> {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|content| content.cache_key == cache_key)
            .cloned()
    }

    fn ensure<F>(&self, cache_key: &str, populate: F) -> Result<Arc<CachedChannel>, ServerError>
    where
        F: FnOnce() -> Result<CachedChannel, ServerError>,
    {
        if let Some(content) = self.current(cache_key) {
            return Ok(content);
        }
        let mut guard = self.content.write().unwrap_or_else(PoisonError::into_inner);
        // Another subscriber may have populated it while we waited
        if let Some(content) = guard.as_ref().filter(|content| content.cache_key == cache_key) {
            return Ok(content.clone());
        }
        let content = Arc::new(populate()?);
        *guard = Some(content.clone());
        Ok(content)
    }

    fn clear(&self) -> bool {
        self.content
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

/// Channel payloads shared by every session. Each address is populated under
/// its own lock: concurrent subscribers to a cold channel wait for a single
/// computation while other channels stay unblocked. Failed populations are
/// not stored.
#[derive(Default)]
pub struct ChannelCache {
    entries: Mutex<HashMap<ChannelAddress, Arc<ChannelCacheEntry>>>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, address: &ChannelAddress) -> Arc<ChannelCacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*address)
            .or_insert_with(|| Arc::new(ChannelCacheEntry::new()))
            .clone()
    }

    /// Content for `address` at generation `cache_key`, computing it with
    /// `populate` if nothing current is cached
    pub fn ensure<F>(
        &self,
        address: &ChannelAddress,
        cache_key: &str,
        populate: F,
    ) -> Result<Arc<CachedChannel>, ServerError>
    where
        F: FnOnce() -> Result<CachedChannel, ServerError>,
    {
        self.entry(address).ensure(cache_key, || {
            debug!("Populating cache for {:?} at {}", address, cache_key);
            populate()
        })
    }

    pub fn get(&self, address: &ChannelAddress) -> Option<Arc<CachedChannel>> {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()?;
        let content = entry
            .content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        content
    }

    /// Drop the cached content of one channel. Returns true if any existed.
    ///
    /// The entry stays in place and is cleared under its own lock, so an
    /// invalidation waits for a population in progress instead of letting a
    /// second one start beside it.
    pub fn invalidate(&self, address: &ChannelAddress) -> bool {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned();
        entry.map_or(false, |entry| entry.clear())
    }

    pub fn clear(&self) {
        let entries: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for entry in entries {
            entry.clear();
        }
    }
}
