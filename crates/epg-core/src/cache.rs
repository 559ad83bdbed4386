//! Cache trait for storing fetched guide data.
//!
//! This module defines the [`EpgCache`] trait, the sole owner of persisted
//! state: channels, segments with their program stubs, and program details.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    types::{Channel, ChannelId, ProgramDetail, ProgramId, ProgramStub, SegmentKey},
    window::SyncWindow,
};

/// Persistent store for guide data.
///
/// All writes are upserts keyed by natural identity. Each write is its own
/// transaction, so a run interrupted half way leaves every completed write
/// usable. Any storage failure is reported as
/// [`EpgError::Cache`](crate::EpgError::Cache).
#[async_trait]
pub trait EpgCache: Send + Sync {
    /// Returns all known channels, ordered by logical number then id.
    async fn get_channels(&self) -> Result<Vec<Channel>>;

    /// Upserts channels by id.
    async fn put_channels(&self, channels: &[Channel]) -> Result<()>;

    /// Returns true if the segment has been fetched and may be reused at `now`.
    ///
    /// See [`segment_is_fresh`](crate::window::segment_is_fresh).
    async fn is_segment_fresh(&self, key: &SegmentKey, now: DateTime<Utc>) -> Result<bool>;

    /// Replaces the programs of a segment.
    ///
    /// A no-op if the segment is already fresh relative to `fetched_at`, so
    /// aired listings are never overwritten.
    async fn put_segment(
        &self,
        key: &SegmentKey,
        programs: &[ProgramStub],
        fetched_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns the programs of a channel from segments starting inside `window`,
    /// in chronological order, each program id at most once.
    async fn get_programs(
        &self,
        channel_id: &ChannelId,
        window: &SyncWindow,
    ) -> Result<Vec<ProgramStub>>;

    /// Returns true if a detail record exists for the program.
    async fn has_detail(&self, program_id: &ProgramId) -> Result<bool>;

    /// Stores a program detail. Existing details are never overwritten.
    async fn put_detail(
        &self,
        program_id: &ProgramId,
        detail: &ProgramDetail,
        fetched_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Retrieves a program detail.
    ///
    /// Returns `Ok(Some(detail))` if cached, `Ok(None)` if not cached.
    async fn get_detail(&self, program_id: &ProgramId) -> Result<Option<ProgramDetail>>;

    /// Removes a program detail so the next sync fetches it again.
    ///
    /// Returns true if a detail was removed.
    async fn evict_detail(&self, program_id: &ProgramId) -> Result<bool>;

    /// Removes segments starting before `before` together with their programs,
    /// and details no longer referenced by any cached program.
    ///
    /// Returns the number of segments and details removed.
    async fn prune(&self, before: DateTime<Utc>) -> Result<usize>;
}
