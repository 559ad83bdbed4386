//! Reconstruction of programme records from the cache.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::debug;

use epg_core::{ChannelId, EpgCache, ProgramDetail, ProgramId, ProgramStub, Result, SyncWindow};

/// One programme ready to be written as XMLTV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgrammeRecord {
    /// Channel broadcasting the programme.
    pub channel_id: ChannelId,
    /// Provider program id.
    pub program_id: ProgramId,
    /// Start, in the output timezone.
    pub start: DateTime<Tz>,
    /// Stop, in the output timezone. Always after `start`.
    pub stop: DateTime<Tz>,
    /// Title.
    pub title: String,
    /// Extended metadata, if it was fetched.
    pub detail: Option<ProgramDetail>,
}

/// Reads the cache and yields [`ProgrammeRecord`]s.
///
/// Never touches the network, which is what makes generate-only runs work.
pub struct XmltvRenderer {
    cache: Arc<dyn EpgCache>,
    timezone: Tz,
}

impl fmt::Debug for XmltvRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmltvRenderer")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl XmltvRenderer {
    /// Create a renderer converting times to `timezone`.
    #[must_use]
    pub fn new(cache: Arc<dyn EpgCache>, timezone: Tz) -> Self {
        Self { cache, timezone }
    }

    /// Returns the output timezone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Lazily renders `channel_ids` in the given order, each channel in
    /// chronological order.
    ///
    /// Channels are read from the cache one at a time as the stream is polled.
    pub fn render<'a>(
        &'a self,
        channel_ids: &'a [ChannelId],
        window: &'a SyncWindow,
    ) -> impl Stream<Item = Result<ProgrammeRecord>> + Send + 'a {
        stream::iter(channel_ids)
            .then(move |channel_id| self.render_channel(channel_id, window))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
            .try_flatten()
    }

    /// Renders everything into a vector.
    ///
    /// # Errors
    /// Returns the first cache error encountered.
    pub async fn render_all(
        &self,
        channel_ids: &[ChannelId],
        window: &SyncWindow,
    ) -> Result<Vec<ProgrammeRecord>> {
        self.render(channel_ids, window).try_collect().await
    }

    async fn render_channel(
        &self,
        channel_id: &ChannelId,
        window: &SyncWindow,
    ) -> Result<Vec<ProgrammeRecord>> {
        let stubs = self.cache.get_programs(channel_id, window).await?;
        let total = stubs.len();

        let mut records = Vec::with_capacity(total);
        for (stub, stop) in repair_stops(stubs) {
            let detail = self.cache.get_detail(&stub.id).await?;
            let title = detail
                .as_ref()
                .map(|d| d.title.as_str())
                .filter(|t| !t.is_empty())
                .map_or(stub.title, str::to_string);

            records.push(ProgrammeRecord {
                channel_id: stub.channel_id,
                program_id: stub.id,
                start: stub.start.with_timezone(&self.timezone),
                stop: stop.with_timezone(&self.timezone),
                title,
                detail,
            });
        }

        if records.len() < total {
            debug!(
                channel = %channel_id,
                dropped = total - records.len(),
                "Dropped programmes without a usable stop time"
            );
        }
        Ok(records)
    }
}

/// Pairs each chronologically ordered stub with a stop time after its start.
///
/// A missing stop, or one not after the start, is replaced by the start of the
/// next programme when that lies later. Programmes where neither works are
/// dropped.
fn repair_stops(stubs: Vec<ProgramStub>) -> Vec<(ProgramStub, DateTime<Utc>)> {
    let next_starts: Vec<Option<DateTime<Utc>>> = stubs
        .iter()
        .skip(1)
        .map(|s| Some(s.start))
        .chain(std::iter::once(None))
        .collect();

    stubs
        .into_iter()
        .zip(next_starts)
        .filter_map(|(stub, next_start)| {
            let stop = stub
                .stop
                .filter(|stop| *stop > stub.start)
                .or_else(|| next_start.filter(|next| *next > stub.start))?;
            Some((stub, stop))
        })
        .collect()
}
