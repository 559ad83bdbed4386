//! Scripted provider and cache doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use epg_cache::InMemoryCache;
use epg_core::{
    Channel, ChannelId, EpgCache, EpgError, EpgProvider, ProgramDetail, ProgramId, ProgramStub,
    Result, SegmentKey, SyncWindow,
};

pub(crate) fn day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
}

pub(crate) fn at(hours: i64) -> DateTime<Utc> {
    day() + TimeDelta::hours(hours)
}

/// Provider serving scripted segments and details, counting every call.
#[derive(Debug, Default)]
pub(crate) struct MockProvider {
    channels: Mutex<Vec<Channel>>,
    segments: Mutex<HashMap<SegmentKey, Vec<ProgramStub>>>,
    details: Mutex<HashMap<ProgramId, ProgramDetail>>,
    broken_segments: Mutex<HashSet<SegmentKey>>,
    broken_details: Mutex<HashSet<ProgramId>>,
    channel_calls: AtomicUsize,
    segment_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl MockProvider {
    /// Two channels with one day of 6 hour segments, two 3 hour programs per
    /// segment and a detail for every program.
    pub(crate) fn two_channel_day() -> Self {
        let provider = Self::default();
        provider.set_channels(vec![
            Channel::new("NL_1", "NPO 1 HD").with_number(1),
            Channel::new("NL_2", "NPO 2").with_number(2),
        ]);
        for channel in ["NL_1", "NL_2"] {
            for segment in [0, 6, 12, 18] {
                let programs = [segment, segment + 3]
                    .into_iter()
                    .map(|h| {
                        ProgramStub::new(
                            format!("{}-{:02}", channel, h),
                            channel,
                            format!("Show {:02}", h),
                            at(h),
                            Some(at(h + 3)),
                        )
                    })
                    .collect::<Vec<_>>();
                for program in &programs {
                    let detail = ProgramDetail::new(program.title.clone())
                        .with_description(format!("About {}", program.id));
                    provider.set_detail(program.id.clone(), detail);
                }
                provider.set_segment(channel, at(segment), programs);
            }
        }
        provider
    }

    pub(crate) fn set_channels(&self, channels: Vec<Channel>) {
        *self.channels.lock().unwrap() = channels;
    }

    pub(crate) fn set_segment(&self, channel: &str, start: DateTime<Utc>, programs: Vec<ProgramStub>) {
        self.segments
            .lock()
            .unwrap()
            .insert(SegmentKey::new(ChannelId::new(channel), start), programs);
    }

    pub(crate) fn set_detail(&self, id: ProgramId, detail: ProgramDetail) {
        self.details.lock().unwrap().insert(id, detail);
    }

    pub(crate) fn break_segment(&self, channel: &str, start: DateTime<Utc>) {
        self.broken_segments
            .lock()
            .unwrap()
            .insert(SegmentKey::new(ChannelId::new(channel), start));
    }

    pub(crate) fn break_detail(&self, id: &str) {
        self.broken_details.lock().unwrap().insert(ProgramId::new(id));
    }

    pub(crate) fn channel_calls(&self) -> usize {
        self.channel_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn segment_calls(&self) -> usize {
        self.segment_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.channel_calls() + self.segment_calls() + self.detail_calls()
    }
}

#[async_trait]
impl EpgProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        self.channel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn fetch_segment(
        &self,
        channel_id: &ChannelId,
        segment_start: DateTime<Utc>,
    ) -> Result<Vec<ProgramStub>> {
        self.segment_calls.fetch_add(1, Ordering::SeqCst);
        let key = SegmentKey::new(channel_id.clone(), segment_start);
        if self.broken_segments.lock().unwrap().contains(&key) {
            return Err(EpgError::Transport("connection reset".to_string()));
        }
        self.segments
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| EpgError::NotFound(key.to_string()))
    }

    async fn fetch_detail(&self, program_id: &ProgramId) -> Result<ProgramDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_details.lock().unwrap().contains(program_id) {
            return Err(EpgError::MalformedData("truncated body".to_string()));
        }
        self.details
            .lock()
            .unwrap()
            .get(program_id)
            .cloned()
            .ok_or_else(|| EpgError::NotFound(program_id.to_string()))
    }
}

/// Cache whose segment writes always fail.
#[derive(Debug, Default)]
pub(crate) struct ReadOnlyCache {
    inner: InMemoryCache,
}

#[async_trait]
impl EpgCache for ReadOnlyCache {
    async fn get_channels(&self) -> Result<Vec<Channel>> {
        self.inner.get_channels().await
    }

    async fn put_channels(&self, channels: &[Channel]) -> Result<()> {
        self.inner.put_channels(channels).await
    }

    async fn is_segment_fresh(&self, key: &SegmentKey, now: DateTime<Utc>) -> Result<bool> {
        self.inner.is_segment_fresh(key, now).await
    }

    async fn put_segment(&self, _: &SegmentKey, _: &[ProgramStub], _: DateTime<Utc>) -> Result<()> {
        Err(EpgError::Cache("attempt to write a readonly database".to_string()))
    }

    async fn get_programs(&self, channel_id: &ChannelId, window: &SyncWindow) -> Result<Vec<ProgramStub>> {
        self.inner.get_programs(channel_id, window).await
    }

    async fn has_detail(&self, program_id: &ProgramId) -> Result<bool> {
        self.inner.has_detail(program_id).await
    }

    async fn put_detail(&self, program_id: &ProgramId, detail: &ProgramDetail, fetched_at: DateTime<Utc>) -> Result<()> {
        self.inner.put_detail(program_id, detail, fetched_at).await
    }

    async fn get_detail(&self, program_id: &ProgramId) -> Result<Option<ProgramDetail>> {
        self.inner.get_detail(program_id).await
    }

    async fn evict_detail(&self, program_id: &ProgramId) -> Result<bool> {
        self.inner.evict_detail(program_id).await
    }

    async fn prune(&self, before: DateTime<Utc>) -> Result<usize> {
        self.inner.prune(before).await
    }
}
