//! In-memory cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use epg_core::{
    Channel, ChannelId, EpgCache, ProgramDetail, ProgramId, ProgramStub, Result, SegmentKey,
    SyncWindow, segment_is_fresh,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Cache entry with the time its data was fetched.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    const fn new(data: T, fetched_at: DateTime<Utc>) -> Self {
        Self { data, fetched_at }
    }
}

/// Simple in-memory cache for testing and development.
///
/// Data is stored in `RwLock`-protected maps and is lost when the cache
/// is dropped. It follows exactly the same freshness and upsert rules as
/// [`SqliteCache`](crate::SqliteCache).
#[derive(Debug, Default)]
pub struct InMemoryCache {
    channels: RwLock<HashMap<ChannelId, Channel>>,
    segments: RwLock<BTreeMap<SegmentKey, CacheEntry<Vec<ProgramStub>>>>,
    details: RwLock<HashMap<ProgramId, CacheEntry<ProgramDetail>>>,
}

impl InMemoryCache {
    /// Create a new empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the time a segment was last fetched, if ever.
    pub async fn segment_fetched_at(&self, key: &SegmentKey) -> Option<DateTime<Utc>> {
        self.segments.read().await.get(key).map(|e| e.fetched_at)
    }
}

#[async_trait]
impl EpgCache for InMemoryCache {
    async fn get_channels(&self) -> Result<Vec<Channel>> {
        let cache = self.channels.read().await;
        let mut channels: Vec<Channel> = cache.values().cloned().collect();
        channels.sort_by(|a, b| {
            (a.number.is_none(), a.number, &a.id).cmp(&(b.number.is_none(), b.number, &b.id))
        });
        Ok(channels)
    }

    #[instrument(skip(self, channels), fields(count = channels.len()))]
    async fn put_channels(&self, channels: &[Channel]) -> Result<()> {
        let mut cache = self.channels.write().await;
        for channel in channels {
            cache.insert(channel.id.clone(), channel.clone());
        }
        debug!("Cached {} channels", channels.len());
        Ok(())
    }

    async fn is_segment_fresh(&self, key: &SegmentKey, now: DateTime<Utc>) -> Result<bool> {
        let fetched_at = self.segment_fetched_at(key).await;
        Ok(segment_is_fresh(fetched_at, key.start, now))
    }

    #[instrument(skip(self, programs), fields(segment = %key, count = programs.len()))]
    async fn put_segment(
        &self,
        key: &SegmentKey,
        programs: &[ProgramStub],
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut cache = self.segments.write().await;

        let existing = cache.get(key).map(|e| e.fetched_at);
        if segment_is_fresh(existing, key.start, fetched_at) {
            debug!("Segment already fresh, keeping cached programs");
            return Ok(());
        }

        cache.insert(key.clone(), CacheEntry::new(programs.to_vec(), fetched_at));
        debug!("Cached {} programs", programs.len());
        Ok(())
    }

    async fn get_programs(
        &self,
        channel_id: &ChannelId,
        window: &SyncWindow,
    ) -> Result<Vec<ProgramStub>> {
        let cache = self.segments.read().await;

        // BTreeMap iteration yields segments in start order, so a stable sort
        // keeps the same tie order as the SQLite store.
        let mut programs: Vec<ProgramStub> = cache
            .iter()
            .filter(|(key, _)| &key.channel_id == channel_id && window.contains(key.start))
            .flat_map(|(_, entry)| entry.data.iter().cloned())
            .collect();
        programs.sort_by_key(|p| p.start);

        let mut seen = HashSet::new();
        programs.retain(|p| seen.insert(p.id.clone()));
        Ok(programs)
    }

    async fn has_detail(&self, program_id: &ProgramId) -> Result<bool> {
        Ok(self.details.read().await.contains_key(program_id))
    }

    async fn put_detail(
        &self,
        program_id: &ProgramId,
        detail: &ProgramDetail,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut cache = self.details.write().await;
        cache
            .entry(program_id.clone())
            .or_insert_with(|| CacheEntry::new(detail.clone(), fetched_at));
        Ok(())
    }

    async fn get_detail(&self, program_id: &ProgramId) -> Result<Option<ProgramDetail>> {
        let cache = self.details.read().await;
        match cache.get(program_id) {
            Some(entry) => {
                debug!("Cache hit for detail");
                Ok(Some(entry.data.clone()))
            }
            None => {
                debug!("Cache miss for detail");
                Ok(None)
            }
        }
    }

    async fn evict_detail(&self, program_id: &ProgramId) -> Result<bool> {
        Ok(self.details.write().await.remove(program_id).is_some())
    }

    #[instrument(skip(self))]
    async fn prune(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut total_removed = 0usize;

        let referenced: HashSet<ProgramId> = {
            let mut cache = self.segments.write().await;
            let before_len = cache.len();
            cache.retain(|key, _| key.start >= before);
            total_removed += before_len - cache.len();
            cache
                .values()
                .flat_map(|entry| entry.data.iter().map(|p| p.id.clone()))
                .collect()
        };

        {
            let mut cache = self.details.write().await;
            let before_len = cache.len();
            cache.retain(|id, _| referenced.contains(id));
            total_removed += before_len - cache.len();
        }

        if total_removed > 0 {
            debug!("Pruned {} cache entries", total_removed);
        }
        Ok(total_removed)
    }
}
