//! Core data types for guide data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`ChannelId`] / [`ProgramId`] - Provider-assigned identifiers
//! - [`Channel`] - A remote channel
//! - [`SegmentKey`] - Identity of one cached segment
//! - [`ProgramStub`] - A program as listed in a segment
//! - [`ProgramDetail`] - Extended program metadata, fetched lazily

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A provider-assigned channel identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a new channel id.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A provider-assigned program identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(String);

impl ProgramId {
    /// Creates a new program id.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProgramId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProgramId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A channel as known by the remote provider.
///
/// Identity is [`Channel::id`]; the display name may change between fetches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable provider-assigned id.
    pub id: ChannelId,
    /// Display name.
    pub name: String,
    /// Logical channel number, if the provider publishes one.
    pub number: Option<u32>,
    /// Logo URL.
    pub logo: Option<String>,
}

impl Channel {
    /// Creates a new channel with required fields.
    #[must_use]
    pub fn new(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            number: None,
            logo: None,
        }
    }

    /// Sets the logical channel number.
    #[must_use]
    pub const fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    /// Sets the logo URL.
    #[must_use]
    pub fn with_logo(mut self, logo: impl Into<String>) -> Self {
        self.logo = Some(logo.into());
        self
    }
}

/// Identity of one segment: a fixed-period listing window for one channel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    /// The channel the segment belongs to.
    pub channel_id: ChannelId,
    /// Aligned start of the segment.
    pub start: DateTime<Utc>,
}

impl SegmentKey {
    /// Creates a new segment key.
    #[must_use]
    pub const fn new(channel_id: ChannelId, start: DateTime<Utc>) -> Self {
        Self { channel_id, start }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.channel_id, self.start.format("%Y%m%d%H%M%S"))
    }
}

/// A program as listed in a segment.
///
/// `stop` is optional because providers occasionally omit it; the renderer
/// repairs missing stops from the following program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStub {
    /// Provider program id, also the key of its [`ProgramDetail`].
    pub id: ProgramId,
    /// Channel broadcasting the program.
    pub channel_id: ChannelId,
    /// Title as listed in the segment.
    pub title: String,
    /// Start time.
    pub start: DateTime<Utc>,
    /// Stop time, if known.
    pub stop: Option<DateTime<Utc>>,
}

impl ProgramStub {
    /// Creates a new program stub.
    #[must_use]
    pub fn new(
        id: impl Into<ProgramId>,
        channel_id: impl Into<ChannelId>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        stop: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            title: title.into(),
            start,
            stop,
        }
    }
}

/// People credited for a program.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credits {
    /// Directors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directors: Vec<String>,
    /// Actors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<String>,
    /// Producers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub producers: Vec<String>,
}

impl Credits {
    /// Returns true if nobody is credited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directors.is_empty() && self.actors.is_empty() && self.producers.is_empty()
    }
}

/// Season and episode numbers as published by the provider (one based).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeNumber {
    /// Season number.
    pub season: Option<u32>,
    /// Episode number within the season.
    pub episode: Option<u32>,
}

/// Extended program metadata.
///
/// At most one detail exists per [`ProgramId`]; once stored it is never
/// overwritten.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDetail {
    /// Title.
    pub title: String,
    /// Episode name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Credited people.
    #[serde(default, skip_serializing_if = "Credits::is_empty")]
    pub credits: Credits,
    /// Production date, as published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Provider genres.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Country of origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Season/episode numbering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<EpisodeNumber>,
    /// Minimum age rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
}

impl ProgramDetail {
    /// Creates a new detail with only a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the genres.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Sets the season/episode numbering.
    #[must_use]
    pub const fn with_episode(mut self, season: Option<u32>, episode: Option<u32>) -> Self {
        self.episode = Some(EpisodeNumber { season, episode });
        self
    }
}
