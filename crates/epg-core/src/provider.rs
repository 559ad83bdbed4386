//! Provider trait for fetching guide data.
//!
//! [`EpgProvider`] is the thin, typed surface over the remote service's three
//! endpoints. Implementations own HTTP transport and response parsing and
//! nothing else: caching and freshness are decided by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{Channel, ChannelId, ProgramDetail, ProgramId, ProgramStub},
};

/// Remote guide data source.
///
/// Errors follow a fixed contract so the orchestrator can classify them:
/// [`EpgError::NotFound`](crate::EpgError::NotFound) for a resource the
/// provider does not have, [`EpgError::MalformedData`](crate::EpgError::MalformedData)
/// for payloads that do not parse, and transport/HTTP variants otherwise.
#[async_trait]
pub trait EpgProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "ZiggoGo").
    fn name(&self) -> &str;

    /// Fetches the full remote channel list.
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    /// Fetches the programs listed for one channel in the segment starting at
    /// `segment_start`.
    async fn fetch_segment(
        &self,
        channel_id: &ChannelId,
        segment_start: DateTime<Utc>,
    ) -> Result<Vec<ProgramStub>>;

    /// Fetches extended metadata for one program.
    async fn fetch_detail(&self, program_id: &ProgramId) -> Result<ProgramDetail>;
}
