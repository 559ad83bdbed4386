//! The complete grab pipeline: match, synchronize, render, write.

use std::collections::HashSet;
use std::fmt;
#[cfg(feature = "cache-sqlite")]
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(feature = "cache-sqlite")]
use epg_cache::SqliteCache;
use epg_core::{Channel, ChannelId, EpgCache, EpgError, EpgProvider, Result, SyncWindow};
#[cfg(feature = "cache-sqlite")]
use epg_ziggo::ZiggoProvider;

use crate::config::GrabberConfig;
use crate::matcher::{ChannelMatch, ChannelMatcher};
use crate::render::XmltvRenderer;
use crate::sync::{SyncMode, SyncOrchestrator, SyncSummary};
use crate::xmltv::XmltvWriter;

/// File name of the cache database inside the database directory.
pub const CACHE_FILE_NAME: &str = "ziggogoepg_cache.sqlite3";

/// Result of one grab.
#[derive(Clone, Debug)]
pub struct GrabOutcome {
    /// Match result for every requested channel name, in request order.
    pub matches: Vec<ChannelMatch>,
    /// Sync summary, absent for generate-only runs.
    pub summary: Option<SyncSummary>,
    /// Number of programmes written.
    pub programmes: usize,
    /// The XMLTV document.
    pub xmltv: String,
}

impl GrabOutcome {
    /// Requested names that did not match any remote channel.
    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.matches
            .iter()
            .filter(|m| !m.is_matched())
            .map(|m| m.requested.as_str())
    }
}

/// Runs grabs against one provider and cache.
pub struct Grabber {
    config: GrabberConfig,
    provider: Arc<dyn EpgProvider>,
    cache: Arc<dyn EpgCache>,
    cancel: CancellationToken,
}

impl fmt::Debug for Grabber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grabber")
            .field("provider", &self.provider.name())
            .field("timezone", &self.config.timezone)
            .field("sync", &self.config.sync)
            .finish_non_exhaustive()
    }
}

impl Grabber {
    /// Create a grabber from its parts.
    #[must_use]
    pub fn new(
        config: GrabberConfig,
        provider: Arc<dyn EpgProvider>,
        cache: Arc<dyn EpgCache>,
    ) -> Self {
        Self {
            config,
            provider,
            cache,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a grabber using the ZiggoGo provider and an on-disk cache in
    /// `database_dir`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the cache cannot be
    /// opened.
    #[cfg(feature = "cache-sqlite")]
    pub fn open(config: GrabberConfig, database_dir: impl AsRef<Path>) -> Result<Self> {
        config.validate()?;
        let provider = ZiggoProvider::new(config.provider.clone())?;
        let cache = SqliteCache::new(database_dir.as_ref().join(CACHE_FILE_NAME))?;
        Ok(Self::new(config, Arc::new(provider), Arc::new(cache)))
    }

    /// Set the token that cancels a running grab.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &GrabberConfig {
        &self.config
    }

    fn orchestrator(&self) -> Result<SyncOrchestrator> {
        Ok(
            SyncOrchestrator::new(self.provider.clone(), self.cache.clone())
                .with_options(self.config.sync_options()?)
                .with_cancellation(self.cancel.clone()),
        )
    }

    /// Fetch and cache the remote channel list.
    ///
    /// # Errors
    /// Returns the provider error once retries are exhausted, or a cache error.
    pub async fn channel_list(&self) -> Result<Vec<Channel>> {
        self.orchestrator()?.refresh_channels().await
    }

    /// Grab the guide for `requested` channel names.
    ///
    /// # Errors
    /// See [`run_at`](Self::run_at).
    pub async fn run<S: AsRef<str>>(&self, requested: &[S], mode: SyncMode) -> Result<GrabOutcome> {
        self.run_at(requested, mode, Utc::now()).await
    }

    /// Grab the guide for `requested` channel names as of `now`.
    ///
    /// In [`SyncMode::Incremental`] the channel list is refreshed, stale data
    /// fetched and old data pruned before rendering. In
    /// [`SyncMode::GenerateOnly`] only the cache is read.
    ///
    /// # Errors
    /// Returns an error for cache failures, cancellation, a failed channel list
    /// fetch, or a generate-only run on an empty cache.
    pub async fn run_at<S: AsRef<str>>(
        &self,
        requested: &[S],
        mode: SyncMode,
        now: DateTime<Utc>,
    ) -> Result<GrabOutcome> {
        let window = SyncWindow::for_days(now, self.config.sync.scan_days)?;
        let orchestrator = self.orchestrator()?;

        let remote = match mode {
            SyncMode::Incremental => orchestrator.refresh_channels().await?,
            SyncMode::GenerateOnly => {
                let cached = self.cache.get_channels().await?;
                if cached.is_empty() {
                    return Err(EpgError::Other(
                        "The cache holds no channels, run a grab without generate-only first"
                            .to_string(),
                    ));
                }
                cached
            }
        };

        let matcher = ChannelMatcher::new(self.config.sync.match_threshold);
        let matches = matcher.resolve(requested, &remote);
        for m in matches.iter().filter(|m| !m.is_matched()) {
            warn!(
                requested = %m.requested,
                best_score = m.score,
                "No confident match for channel"
            );
        }

        let mut seen = HashSet::new();
        let channels: Vec<Channel> = matches
            .iter()
            .filter_map(|m| m.channel.clone())
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
        let ids: Vec<ChannelId> = channels.iter().map(|c| c.id.clone()).collect();
        info!(
            "Matched {} of {} requested channels",
            ids.len(),
            matches.len()
        );

        let summary = match mode {
            SyncMode::Incremental => {
                let summary = orchestrator.synchronize_at(&ids, &window, now).await?;
                if self.config.sync.prune {
                    let removed = self.cache.prune(window.start()).await?;
                    info!("Pruned {} cache entries before {}", removed, window.start());
                }
                Some(summary)
            }
            SyncMode::GenerateOnly => None,
        };

        let renderer = XmltvRenderer::new(self.cache.clone(), self.config.tz()?);
        let records = renderer.render_all(&ids, &window).await?;
        let xmltv = XmltvWriter::new(self.config.xmltv.clone()).write_document(&channels, &records);
        info!(
            "Rendered {} programmes for {} channels",
            records.len(),
            channels.len()
        );

        Ok(GrabOutcome {
            matches,
            summary,
            programmes: records.len(),
            xmltv,
        })
    }
}
