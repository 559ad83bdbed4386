//! Sync orchestrator reconciling the cache against the remote provider.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use epg_core::{
    Channel, ChannelId, EpgCache, EpgError, EpgProvider, ProgramDetail, ProgramId, ProgramStub,
    Result, SegmentGrid, SegmentKey, SyncWindow,
};

use crate::retry::{RetryPolicy, with_retry};

/// Default number of fetches in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How a run treats the remote provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Fetch stale segments and missing details before rendering.
    #[default]
    Incremental,
    /// Render from the cache only, without any network access.
    GenerateOnly,
}

/// Tuning knobs for [`SyncOrchestrator`].
#[derive(Clone, Debug, PartialEq)]
pub struct SyncOptions {
    /// Segment grid of the provider.
    pub grid: SegmentGrid,
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            grid: SegmentGrid::default(),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

/// The item a recorded failure relates to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureTarget {
    /// A requested channel id that is not in the channel list.
    Channel(ChannelId),
    /// A segment listing.
    Segment(SegmentKey),
    /// A program detail.
    Detail(ProgramId),
}

impl fmt::Display for FailureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel {}", id),
            Self::Segment(key) => write!(f, "segment {}", key),
            Self::Detail(id) => write!(f, "detail {}", id),
        }
    }
}

/// A per-item failure that did not abort the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncFailure {
    /// What failed.
    pub target: FailureTarget,
    /// The last error seen for it.
    pub error: EpgError,
}

/// Outcome of one [`SyncOrchestrator::synchronize`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Segments fetched and written to the cache.
    pub segments_fetched: usize,
    /// Segments skipped because the cached copy is fresh.
    pub segments_skipped: usize,
    /// Segments the provider has no data for yet.
    pub segments_unavailable: usize,
    /// Details fetched and written to the cache.
    pub details_fetched: usize,
    /// Programs whose detail was already cached.
    pub details_skipped: usize,
    /// Failed items, in the order they were observed.
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    /// Total number of successful fetches.
    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.segments_fetched + self.details_fetched
    }

    /// Total number of items served from the cache.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.segments_skipped + self.details_skipped
    }

    /// Number of failed items.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record(&mut self, target: FailureTarget, error: EpgError) {
        warn!(%target, error = %error, "Sync item failed");
        self.failures.push(SyncFailure { target, error });
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} segments fetched ({} fresh, {} unavailable), {} details fetched ({} cached), {} failures",
            self.segments_fetched,
            self.segments_skipped,
            self.segments_unavailable,
            self.details_fetched,
            self.details_skipped,
            self.failures.len()
        )
    }
}

/// Drives the provider to bring the cache up to date for a set of channels.
///
/// Fetches run concurrently up to [`SyncOptions::concurrency`]; every cache
/// write happens on the calling task, one at a time. A failing fetch is
/// retried per [`SyncOptions::retry`] and then recorded in the
/// [`SyncSummary`]. Cache errors and cancellation abort the run, leaving all
/// completed writes in place.
pub struct SyncOrchestrator {
    provider: Arc<dyn EpgProvider>,
    cache: Arc<dyn EpgCache>,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator with default options.
    #[must_use]
    pub fn new(provider: Arc<dyn EpgProvider>, cache: Arc<dyn EpgCache>) -> Self {
        Self {
            provider,
            cache,
            options: SyncOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the sync options.
    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the token that cancels a running sync.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the options in use.
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Fetch the channel list and store it in the cache.
    ///
    /// # Errors
    /// Returns the provider error once retries are exhausted, or a cache error.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn refresh_channels(&self) -> Result<Vec<Channel>> {
        let provider = &self.provider;
        let channels = self
            .cancellable(with_retry(
                &self.options.retry,
                || provider.list_channels(),
                "list channels",
            ))
            .await??;

        self.cache.put_channels(&channels).await?;
        info!("Refreshed {} channels", channels.len());
        Ok(channels)
    }

    /// Bring the cache up to date for `channel_ids` within `window`.
    ///
    /// # Errors
    /// Returns [`EpgError::Cache`] if the cache fails and
    /// [`EpgError::Cancelled`] if the run was cancelled. Fetch failures are
    /// reported in the summary instead.
    pub async fn synchronize(
        &self,
        channel_ids: &[ChannelId],
        window: &SyncWindow,
    ) -> Result<SyncSummary> {
        self.synchronize_at(channel_ids, window, Utc::now()).await
    }

    /// Like [`synchronize`](Self::synchronize), with an explicit notion of "now"
    /// for the freshness rule and as fetch timestamp.
    ///
    /// # Errors
    /// See [`synchronize`](Self::synchronize).
    #[instrument(skip(self, channel_ids), fields(channels = channel_ids.len(), start = %window.start(), end = %window.end()))]
    pub async fn synchronize_at(
        &self,
        channel_ids: &[ChannelId],
        window: &SyncWindow,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let known: HashSet<ChannelId> = self
            .cache
            .get_channels()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let mut channels = Vec::new();
        let mut seen = HashSet::new();
        for id in channel_ids {
            if !seen.insert(id) {
                continue;
            }
            if known.contains(id) {
                channels.push(id.clone());
            } else {
                summary.record(
                    FailureTarget::Channel(id.clone()),
                    EpgError::NotFound(format!("channel {} is not in the channel list", id)),
                );
            }
        }

        self.sync_segments(&channels, window, now, &mut summary)
            .await?;
        self.sync_details(&channels, window, now, &mut summary)
            .await?;

        info!("Sync finished: {}", summary);
        Ok(summary)
    }

    async fn sync_segments(
        &self,
        channels: &[ChannelId],
        window: &SyncWindow,
        now: DateTime<Utc>,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let starts = self.options.grid.segments(window);
        let mut pending = Vec::new();

        // Segment-major, so the channels of one segment are fetched together
        for start in &starts {
            for channel_id in channels {
                let key = SegmentKey::new(channel_id.clone(), *start);
                if self.cache.is_segment_fresh(&key, now).await? {
                    summary.segments_skipped += 1;
                } else {
                    pending.push(key);
                }
            }
        }

        info!(
            "Fetching {} segments, {} already fresh",
            pending.len(),
            summary.segments_skipped
        );

        let mut fetches = stream::iter(pending)
            .map(|key| self.fetch_segment(key))
            .buffer_unordered(self.concurrency());

        while let Some((key, result)) = self.cancellable(fetches.next()).await? {
            match result {
                Ok(programs) => {
                    self.cache.put_segment(&key, &programs, now).await?;
                    summary.segments_fetched += 1;
                }
                Err(EpgError::NotFound(_)) => {
                    debug!(segment = %key, "Segment not available");
                    summary.segments_unavailable += 1;
                }
                Err(e) => summary.record(FailureTarget::Segment(key), e),
            }
        }

        Ok(())
    }

    async fn sync_details(
        &self,
        channels: &[ChannelId],
        window: &SyncWindow,
        now: DateTime<Utc>,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        for channel_id in channels {
            for program in self.cache.get_programs(channel_id, window).await? {
                if !seen.insert(program.id.clone()) {
                    continue;
                }
                if self.cache.has_detail(&program.id).await? {
                    summary.details_skipped += 1;
                } else {
                    missing.push(program.id);
                }
            }
        }

        info!(
            "Fetching {} details, {} already cached",
            missing.len(),
            summary.details_skipped
        );

        let mut fetches = stream::iter(missing)
            .map(|id| self.fetch_detail(id))
            .buffer_unordered(self.concurrency());

        while let Some((id, result)) = self.cancellable(fetches.next()).await? {
            match result {
                Ok(detail) => {
                    self.cache.put_detail(&id, &detail, now).await?;
                    summary.details_fetched += 1;
                }
                Err(e) => summary.record(FailureTarget::Detail(id), e),
            }
        }

        Ok(())
    }

    async fn fetch_segment(&self, key: SegmentKey) -> (SegmentKey, Result<Vec<ProgramStub>>) {
        let provider = &self.provider;
        let name = format!("fetch segment {}", key);
        let result = with_retry(
            &self.options.retry,
            || provider.fetch_segment(&key.channel_id, key.start),
            &name,
        )
        .await;
        (key, result)
    }

    async fn fetch_detail(&self, id: ProgramId) -> (ProgramId, Result<ProgramDetail>) {
        let provider = &self.provider;
        let name = format!("fetch detail {}", id);
        let result = with_retry(&self.options.retry, || provider.fetch_detail(&id), &name).await;
        (id, result)
    }

    fn concurrency(&self) -> usize {
        self.options.concurrency.max(1)
    }

    /// Await `fut` unless the run is cancelled first.
    async fn cancellable<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                warn!("Sync cancelled");
                Err(EpgError::Cancelled)
            }
            value = fut => Ok(value),
        }
    }
}
