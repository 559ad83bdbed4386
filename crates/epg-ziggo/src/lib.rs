#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/jbogers/ziggogo-epg/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! ZiggoGo guide data provider.
//!
//! This crate provides a provider for the guide service behind ziggogo.tv that
//! implements the [`EpgProvider`] trait from `epg-core`.
//!
//! # Features
//!
//! - Channel list, segment listing and program detail endpoints from URL templates
//! - Request spacing (100ms between requests by default)
//! - One request per segment for all channels when the segment endpoint is not per channel
//! - Typed response schemas, rejecting payloads that do not have the expected shape
//!
//! # Example
//!
//! ```no_run
//! use epg_ziggo::{ZiggoConfig, ZiggoProvider};
//! use epg_core::{EpgProvider, ChannelId};
//! use chrono::Utc;
//!
//! # async fn example() -> epg_core::Result<()> {
//! let config = ZiggoConfig::new(
//!     "https://example.com/channels",
//!     "https://example.com/segments/{segment}",
//!     "https://example.com/events/{program}",
//! );
//! let provider = ZiggoProvider::new(config)?;
//!
//! let channels = provider.list_channels().await?;
//! println!("Found {} channels", channels.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use epg_core::{
    Channel, ChannelId, Credits, EpgError, EpgProvider, EpisodeNumber, ProgramDetail, ProgramId,
    ProgramStub, Result,
};
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Placeholder for the segment start (`%Y%m%d%H%M%S`, UTC) in the segment URL.
pub const SEGMENT_PLACEHOLDER: &str = "{segment}";

/// Optional placeholder for the channel id in the segment URL.
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Placeholder for the program id in the detail URL.
pub const PROGRAM_PLACEHOLDER: &str = "{program}";

/// Default delay between two requests in milliseconds.
const DEFAULT_REQUEST_INTERVAL_MS: u64 = 100;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// How long a shared segment payload is reused across channels.
const DEFAULT_SEGMENT_MEMO_SECS: u64 = 120;

/// User agent for HTTP requests.
const USER_AGENT: &str = concat!("ziggogo-epg/", env!("CARGO_PKG_VERSION"));

fn default_name() -> String {
    "ZiggoGo".to_string()
}

const fn default_request_interval_ms() -> u64 {
    DEFAULT_REQUEST_INTERVAL_MS
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_segment_memo_secs() -> u64 {
    DEFAULT_SEGMENT_MEMO_SECS
}

fn default_user_agent() -> String {
    USER_AGENT.to_string()
}

/// Endpoint and transport settings for [`ZiggoProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ZiggoConfig {
    /// Provider name used in logs and as XMLTV source name.
    #[serde(default = "default_name")]
    pub name: String,
    /// URL of the channel list.
    pub channel_list_url: String,
    /// URL template of a segment listing; must contain `{segment}`.
    pub segment_url: String,
    /// URL template of a program detail; must contain `{program}`.
    pub detail_url: String,
    /// Minimum delay between two requests, in milliseconds.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long a fetched segment payload is shared between channels, in seconds.
    #[serde(default = "default_segment_memo_secs")]
    pub segment_memo_secs: u64,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ZiggoConfig {
    /// Create a configuration with default transport settings.
    #[must_use]
    pub fn new(
        channel_list_url: impl Into<String>,
        segment_url: impl Into<String>,
        detail_url: impl Into<String>,
    ) -> Self {
        Self {
            name: default_name(),
            channel_list_url: channel_list_url.into(),
            segment_url: segment_url.into(),
            detail_url: detail_url.into(),
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            segment_memo_secs: DEFAULT_SEGMENT_MEMO_SECS,
            user_agent: default_user_agent(),
        }
    }

    /// Checks that the URL templates contain their placeholders.
    ///
    /// # Errors
    /// Returns [`EpgError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.channel_list_url.is_empty() {
            return Err(EpgError::Config("channel_list_url is empty".to_string()));
        }
        if !self.segment_url.contains(SEGMENT_PLACEHOLDER) {
            return Err(EpgError::Config(format!(
                "segment_url must contain {}",
                SEGMENT_PLACEHOLDER
            )));
        }
        if !self.detail_url.contains(PROGRAM_PLACEHOLDER) {
            return Err(EpgError::Config(format!(
                "detail_url must contain {}",
                PROGRAM_PLACEHOLDER
            )));
        }
        if self.timeout_secs == 0 {
            return Err(EpgError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns true if every segment request covers a single channel.
    #[must_use]
    pub fn per_channel_segments(&self) -> bool {
        self.segment_url.contains(CHANNEL_PLACEHOLDER)
    }
}

/// Outcome of one whole-segment request, payload or error.
type SegmentOutcome = Result<Arc<SegmentResponse>>;

/// A segment outcome shared by all channels requesting the same segment.
#[derive(Debug)]
struct MemoEntry {
    created: Instant,
    cell: Arc<OnceCell<SegmentOutcome>>,
}

/// ZiggoGo guide data provider.
///
/// Implements [`EpgProvider`].
pub struct ZiggoProvider {
    config: ZiggoConfig,
    client: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
    segment_memo: Mutex<HashMap<i64, MemoEntry>>,
}

impl fmt::Debug for ZiggoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZiggoProvider")
            .field("name", &self.config.name)
            .field("segment_url", &self.config.segment_url)
            .field("request_interval_ms", &self.config.request_interval_ms)
            .finish_non_exhaustive()
    }
}

impl ZiggoProvider {
    /// Create a new provider from its configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ZiggoConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EpgError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(config, client))
    }

    /// Create a new provider with a custom HTTP client.
    ///
    /// Uses the provided client for all HTTP requests. Request spacing
    /// is still applied.
    #[must_use]
    pub fn with_client(config: ZiggoConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            last_request: Mutex::new(None),
            segment_memo: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the provider configuration.
    #[must_use]
    pub const fn config(&self) -> &ZiggoConfig {
        &self.config
    }

    /// Wait until the configured interval since the previous request has passed.
    async fn apply_rate_limit(&self) {
        let interval = Duration::from_millis(self.config.request_interval_ms);
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                let wait_time = interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Build the segment URL for a segment start and channel.
    fn build_segment_url(&self, channel_id: &ChannelId, segment_start: DateTime<Utc>) -> String {
        self.config
            .segment_url
            .replace(
                SEGMENT_PLACEHOLDER,
                &segment_start.format("%Y%m%d%H%M%S").to_string(),
            )
            .replace(CHANNEL_PLACEHOLDER, channel_id.as_str())
    }

    /// Build the detail URL for a program.
    fn build_detail_url(&self, program_id: &ProgramId) -> String {
        self.config
            .detail_url
            .replace(PROGRAM_PLACEHOLDER, program_id.as_str())
    }

    /// GET a URL and return the body of a successful response.
    async fn get_text(&self, url: &str) -> Result<String> {
        self.apply_rate_limit().await;
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EpgError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EpgError::RateLimited {
                provider: self.config.name.clone(),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EpgError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            return Err(EpgError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| EpgError::Transport(e.to_string()))
    }

    async fn request_segment(&self, url: &str) -> SegmentOutcome {
        let body = self.get_text(url).await?;
        parse_segment(&body).map(Arc::new)
    }

    /// Fetch a whole segment once and share the outcome between channels for
    /// a short time.
    ///
    /// Payloads and permanent errors such as a 404 are shared for the memo
    /// period. A retryable error is shared only with the callers waiting on
    /// that request; the next caller sends a new one.
    async fn shared_segment(&self, segment_start: DateTime<Utc>) -> SegmentOutcome {
        let ttl = Duration::from_secs(self.config.segment_memo_secs);
        let key = segment_start.timestamp();
        let cell = {
            let mut memo = self.segment_memo.lock().await;
            memo.retain(|_, entry| entry.created.elapsed() < ttl);
            memo.entry(key)
                .or_insert_with(|| MemoEntry {
                    created: Instant::now(),
                    cell: Arc::new(OnceCell::new()),
                })
                .cell
                .clone()
        };

        // Every channel id is ignored by the URL here, any value will do
        let url = self.build_segment_url(&ChannelId::default(), segment_start);
        let outcome = cell.get_or_init(|| self.request_segment(&url)).await.clone();

        if let Err(e) = &outcome {
            if e.is_retryable() {
                let mut memo = self.segment_memo.lock().await;
                if memo
                    .get(&key)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.cell, &cell))
                {
                    debug!(segment = %segment_start, "Dropping failed shared segment: {}", e);
                    memo.remove(&key);
                }
            }
        }

        outcome
    }
}

#[async_trait]
impl EpgProvider for ZiggoProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let body = self.get_text(&self.config.channel_list_url).await?;
        parse_channels(&body)
    }

    async fn fetch_segment(
        &self,
        channel_id: &ChannelId,
        segment_start: DateTime<Utc>,
    ) -> Result<Vec<ProgramStub>> {
        let segment = if self.config.per_channel_segments() {
            let url = self.build_segment_url(channel_id, segment_start);
            self.request_segment(&url).await?
        } else {
            self.shared_segment(segment_start).await?
        };

        Ok(segment.programs_for(channel_id))
    }

    async fn fetch_detail(&self, program_id: &ProgramId) -> Result<ProgramDetail> {
        let url = self.build_detail_url(program_id);
        let body = self.get_text(&url).await?;
        parse_detail(&body)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn malformed(what: &str, e: serde_json::Error) -> EpgError {
    EpgError::MalformedData(format!("{} response: {}", what, e))
}

/// Parse the channel list. Entries without an id or name are skipped.
fn parse_channels(body: &str) -> Result<Vec<Channel>> {
    let entries: Vec<ChannelEntry> =
        serde_json::from_str(body).map_err(|e| malformed("channel list", e))?;

    let mut channels = Vec::with_capacity(entries.len());
    for entry in entries {
        let (Some(id), Some(name)) = (entry.id, entry.name) else {
            debug!("Skipping channel entry without id or name");
            continue;
        };

        let mut channel = Channel::new(id, name);
        channel.number = entry.logical_channel_number;
        channel.logo = entry.logo.and_then(|logo| logo.focused);
        channels.push(channel);
    }

    Ok(channels)
}

/// Parse a segment listing. A listing without `entries` is malformed.
fn parse_segment(body: &str) -> Result<SegmentResponse> {
    let segment: SegmentResponse =
        serde_json::from_str(body).map_err(|e| malformed("segment", e))?;

    if let Some(duration) = segment.duration {
        if duration <= 0 {
            warn!("Segment duration {} is not properly encoded", duration);
        }
    }

    Ok(segment)
}

/// Parse a program detail. A detail without a title is malformed.
fn parse_detail(body: &str) -> Result<ProgramDetail> {
    let raw: DetailResponse = serde_json::from_str(body).map_err(|e| malformed("detail", e))?;

    let title = raw
        .title
        .ok_or_else(|| EpgError::MalformedData("detail response has no title".to_string()))?;

    let episode = EpisodeNumber {
        season: raw.season_number.as_ref().and_then(Scalar::as_u32),
        episode: raw.episode_number.as_ref().and_then(Scalar::as_u32),
    };

    Ok(ProgramDetail {
        title,
        sub_title: raw.episode_name,
        description: raw.long_description.or(raw.short_description),
        credits: Credits {
            directors: raw.directors.unwrap_or_default(),
            actors: raw.actors.unwrap_or_default(),
            producers: raw.producers.unwrap_or_default(),
        },
        date: raw.production_date.map(|d| d.to_string()),
        categories: raw.genres.unwrap_or_default(),
        country: raw.country_of_origin,
        episode: (episode.season.is_some() || episode.episode.is_some()).then_some(episode),
        rating: raw.minimum_age.map(|age| age.to_string()),
    })
}

// ============================================================================
// ZiggoGo API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelEntry {
    id: Option<String>,
    name: Option<String>,
    logo: Option<LogoSet>,
    logical_channel_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LogoSet {
    focused: Option<String>,
}

/// Segment listing response, covering one or all channels.
#[derive(Debug, Deserialize)]
struct SegmentResponse {
    duration: Option<i64>,
    entries: Vec<SegmentEntry>,
}

impl SegmentResponse {
    /// Extract the programs of one channel. Events missing required fields are skipped.
    fn programs_for(&self, channel_id: &ChannelId) -> Vec<ProgramStub> {
        self.entries
            .iter()
            .filter(|entry| entry.channel_id == channel_id.as_str())
            .flat_map(|entry| entry.events.iter().flatten())
            .filter_map(|event| event.to_stub(channel_id))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentEntry {
    channel_id: String,
    events: Option<Vec<SegmentEvent>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentEvent {
    id: Option<String>,
    title: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
}

impl SegmentEvent {
    fn to_stub(&self, channel_id: &ChannelId) -> Option<ProgramStub> {
        let start = DateTime::from_timestamp(self.start_time?, 0)?;
        let stop = self.end_time.and_then(|ts| DateTime::from_timestamp(ts, 0));
        Some(ProgramStub::new(
            self.id.clone()?,
            channel_id.clone(),
            self.title.clone()?,
            start,
            stop,
        ))
    }
}

/// A JSON value published either as a number or as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Int(n) => u32::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailResponse {
    title: Option<String>,
    episode_name: Option<String>,
    long_description: Option<String>,
    short_description: Option<String>,
    actors: Option<Vec<String>>,
    directors: Option<Vec<String>>,
    producers: Option<Vec<String>>,
    production_date: Option<Scalar>,
    genres: Option<Vec<String>>,
    country_of_origin: Option<String>,
    season_number: Option<Scalar>,
    episode_number: Option<Scalar>,
    minimum_age: Option<Scalar>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> ZiggoConfig {
        ZiggoConfig::new(
            "https://example.com/channels",
            "https://example.com/segments/{segment}",
            "https://example.com/events/{program}?lang=nl",
        )
    }

    #[test]
    fn test_build_urls() {
        let provider = ZiggoProvider::new(config()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();

        let url = provider.build_segment_url(&ChannelId::new("NL_1"), start);
        assert_eq!(url, "https://example.com/segments/20240510060000");

        let url = provider.build_detail_url(&ProgramId::new("crid:~~2F~~2Fabc"));
        assert_eq!(url, "https://example.com/events/crid:~~2F~~2Fabc?lang=nl");
    }

    #[test]
    fn test_per_channel_segment_template() {
        let mut config = config();
        assert!(!config.per_channel_segments());

        config.segment_url = "https://example.com/{channel}/{segment}".to_string();
        assert!(config.per_channel_segments());

        let provider = ZiggoProvider::new(config).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
        let url = provider.build_segment_url(&ChannelId::new("NL_1"), start);
        assert_eq!(url, "https://example.com/NL_1/20240510180000");
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());

        let mut missing_segment = config();
        missing_segment.segment_url = "https://example.com/segments".to_string();
        assert!(matches!(missing_segment.validate(), Err(EpgError::Config(_))));

        let mut missing_program = config();
        missing_program.detail_url = "https://example.com/events".to_string();
        assert!(ZiggoProvider::new(missing_program).is_err());
    }

    #[test]
    fn test_provider_info() {
        let provider = ZiggoProvider::new(config()).unwrap();
        assert_eq!(provider.name(), "ZiggoGo");
    }

    #[test]
    fn test_parse_channels() {
        let body = r#"[
            {"id": "NL_000001_019401", "name": "NPO 1 HD", "logicalChannelNumber": 1,
             "logo": {"focused": "https://example.com/npo1.png"}},
            {"id": "NL_000002_019402", "name": "NPO 2"},
            {"name": "No id"}
        ]"#;

        let channels = parse_channels(body).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "NPO 1 HD");
        assert_eq!(channels[0].number, Some(1));
        assert_eq!(channels[0].logo.as_deref(), Some("https://example.com/npo1.png"));
        assert_eq!(channels[1].logo, None);
    }

    #[test]
    fn test_parse_channels_rejects_wrong_shape() {
        let err = parse_channels(r#"{"channels": []}"#).unwrap_err();
        assert!(matches!(err, EpgError::MalformedData(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_segment_filters_channel() {
        let body = r#"{
            "duration": 21600,
            "entries": [
                {"channelId": "NL_1", "events": [
                    {"id": "e1", "title": "Journaal", "startTime": 1715320800, "endTime": 1715322600},
                    {"id": "e2", "title": "No stop", "startTime": 1715322600},
                    {"id": "e3", "startTime": 1715324400, "endTime": 1715328000}
                ]},
                {"channelId": "NL_2", "events": [
                    {"id": "x1", "title": "Other", "startTime": 1715320800, "endTime": 1715324400}
                ]},
                {"channelId": "NL_3"}
            ]
        }"#;

        let segment = parse_segment(body).unwrap();
        let programs = segment.programs_for(&ChannelId::new("NL_1"));
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].id.as_str(), "e1");
        assert_eq!(
            programs[0].start,
            Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap()
        );
        assert!(programs[1].stop.is_none());

        assert!(segment.programs_for(&ChannelId::new("NL_3")).is_empty());
        assert!(segment.programs_for(&ChannelId::new("missing")).is_empty());
    }

    #[test]
    fn test_parse_segment_without_entries_is_malformed() {
        let err = parse_segment(r#"{"duration": 21600}"#).unwrap_err();
        assert!(matches!(err, EpgError::MalformedData(_)));
    }

    #[test]
    fn test_parse_detail() {
        let body = r#"{
            "title": "Flikken Maastricht",
            "episodeName": "Dubbelspel",
            "shortDescription": "Kort",
            "longDescription": "Lang verhaal",
            "actors": ["Angela Schijf", "Victor Reinier"],
            "directors": ["Jaap van Eyck"],
            "productionDate": "2023",
            "genres": ["Drama", "Misdaad"],
            "countryOfOrigin": "NL",
            "seasonNumber": 17,
            "episodeNumber": "4",
            "minimumAge": 12
        }"#;

        let detail = parse_detail(body).unwrap();
        assert_eq!(detail.title, "Flikken Maastricht");
        assert_eq!(detail.sub_title.as_deref(), Some("Dubbelspel"));
        assert_eq!(detail.description.as_deref(), Some("Lang verhaal"));
        assert_eq!(detail.credits.actors.len(), 2);
        assert!(detail.credits.producers.is_empty());
        assert_eq!(detail.date.as_deref(), Some("2023"));
        assert_eq!(detail.categories, vec!["Drama", "Misdaad"]);
        assert_eq!(
            detail.episode,
            Some(EpisodeNumber {
                season: Some(17),
                episode: Some(4)
            })
        );
        assert_eq!(detail.rating.as_deref(), Some("12"));
    }

    #[test]
    fn test_parse_detail_falls_back_to_short_description() {
        let detail = parse_detail(r#"{"title": "Nieuws", "shortDescription": "Kort"}"#).unwrap();
        assert_eq!(detail.description.as_deref(), Some("Kort"));
        assert!(detail.episode.is_none());
    }

    #[test]
    fn test_parse_detail_requires_title() {
        let err = parse_detail(r#"{"episodeName": "Pilot"}"#).unwrap_err();
        assert!(matches!(err, EpgError::MalformedData(_)));
    }

    mod http {
        use super::*;
        use std::net::SocketAddr;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        type Responder = dyn Fn(&str, usize) -> (u16, String) + Send + Sync;

        const SEGMENT_BODY: &str = r#"{
            "duration": 21600,
            "entries": [
                {"channelId": "NL_1", "events": [
                    {"id": "e1", "title": "Journaal", "startTime": 1715320800, "endTime": 1715322600}
                ]},
                {"channelId": "NL_2", "events": [
                    {"id": "x1", "title": "Other", "startTime": 1715320800, "endTime": 1715324400}
                ]}
            ]
        }"#;

        /// Local HTTP/1.1 server answering one request per connection.
        struct StubServer {
            addr: SocketAddr,
            hits: Arc<AtomicUsize>,
            paths: Arc<std::sync::Mutex<Vec<String>>>,
        }

        impl StubServer {
            async fn start(
                respond: impl Fn(&str, usize) -> (u16, String) + Send + Sync + 'static,
            ) -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                let hits = Arc::new(AtomicUsize::new(0));
                let paths = Arc::new(std::sync::Mutex::new(Vec::new()));
                let respond: Arc<Responder> = Arc::new(respond);

                let (server_hits, server_paths) = (hits.clone(), paths.clone());
                tokio::spawn(async move {
                    loop {
                        let Ok((mut stream, _)) = listener.accept().await else {
                            return;
                        };
                        let (hits, paths, respond) =
                            (server_hits.clone(), server_paths.clone(), respond.clone());
                        tokio::spawn(async move {
                            let mut request = Vec::new();
                            let mut buf = [0u8; 1024];
                            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                                match stream.read(&mut buf).await {
                                    Ok(0) | Err(_) => break,
                                    Ok(n) => request.extend_from_slice(&buf[..n]),
                                }
                            }
                            let text = String::from_utf8_lossy(&request);
                            let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();

                            let hit = hits.fetch_add(1, Ordering::SeqCst);
                            paths.lock().unwrap().push(path.clone());
                            let (status, body) = respond(&path, hit);

                            let response = format!(
                                "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                status,
                                body.len(),
                                body
                            );
                            let _ = stream.write_all(response.as_bytes()).await;
                            let _ = stream.shutdown().await;
                        });
                    }
                });

                Self { addr, hits, paths }
            }

            fn url(&self, path: &str) -> String {
                format!("http://{}{}", self.addr, path)
            }

            fn hits(&self) -> usize {
                self.hits.load(Ordering::SeqCst)
            }

            fn paths(&self) -> Vec<String> {
                self.paths.lock().unwrap().clone()
            }
        }

        fn provider(server: &StubServer, segment_path: &str) -> ZiggoProvider {
            let mut config = ZiggoConfig::new(
                server.url("/channels"),
                server.url(segment_path),
                server.url("/events/{program}"),
            );
            config.request_interval_ms = 0;
            ZiggoProvider::new(config).unwrap()
        }

        fn segment_start() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap()
        }

        #[tokio::test]
        async fn test_status_codes_map_to_errors() {
            let server = StubServer::start(|path, _| match path {
                "/missing" => (404, String::new()),
                "/busy" => (429, String::new()),
                "/broken" => (503, String::new()),
                "/forbidden" => (403, String::new()),
                _ => (200, r#"[{"id": "NL_1", "name": "NPO 1 HD"}]"#.to_string()),
            })
            .await;
            let provider = provider(&server, "/segments/{segment}");

            let err = provider.get_text(&server.url("/missing")).await.unwrap_err();
            assert!(matches!(err, EpgError::NotFound(_)));
            assert!(!err.is_retryable());

            let err = provider.get_text(&server.url("/busy")).await.unwrap_err();
            assert!(matches!(err, EpgError::RateLimited { .. }));
            assert!(err.is_retryable());

            let err = provider.get_text(&server.url("/broken")).await.unwrap_err();
            assert!(matches!(err, EpgError::Http { status: 503, .. }));
            assert!(err.is_retryable());

            let err = provider.get_text(&server.url("/forbidden")).await.unwrap_err();
            assert!(matches!(err, EpgError::Http { status: 403, .. }));
            assert!(!err.is_retryable());

            let channels = provider.list_channels().await.unwrap();
            assert_eq!(channels[0].name, "NPO 1 HD");
            assert_eq!(server.hits(), 5);
        }

        #[tokio::test]
        async fn test_connection_refused_is_transport_error() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let mut config = ZiggoConfig::new(
                format!("http://{}/channels", addr),
                format!("http://{}/segments/{{segment}}", addr),
                format!("http://{}/events/{{program}}", addr),
            );
            config.request_interval_ms = 0;
            let provider = ZiggoProvider::new(config).unwrap();

            let err = provider.list_channels().await.unwrap_err();
            assert!(matches!(err, EpgError::Transport(_)));
        }

        #[tokio::test]
        async fn test_shared_segment_is_requested_once() {
            let server = StubServer::start(|_, _| (200, SEGMENT_BODY.to_string())).await;
            let provider = provider(&server, "/segments/{segment}");

            let nl_1 = ChannelId::new("NL_1");
            let nl_2 = ChannelId::new("NL_2");
            let (first, second) = tokio::join!(
                provider.fetch_segment(&nl_1, segment_start()),
                provider.fetch_segment(&nl_2, segment_start()),
            );
            let third = provider
                .fetch_segment(&ChannelId::new("NL_3"), segment_start())
                .await
                .unwrap();

            assert_eq!(first.unwrap()[0].id.as_str(), "e1");
            assert_eq!(second.unwrap()[0].id.as_str(), "x1");
            assert!(third.is_empty());
            assert_eq!(server.hits(), 1);
            assert_eq!(server.paths(), vec!["/segments/20240510060000"]);
        }

        #[tokio::test]
        async fn test_missing_shared_segment_is_requested_once() {
            let server = StubServer::start(|_, _| (404, String::new())).await;
            let provider = provider(&server, "/segments/{segment}");

            for n in 1..=5 {
                let channel = ChannelId::new(format!("NL_{}", n));
                let err = provider
                    .fetch_segment(&channel, segment_start())
                    .await
                    .unwrap_err();
                assert!(matches!(err, EpgError::NotFound(_)));
            }

            assert_eq!(server.hits(), 1);
        }

        #[tokio::test]
        async fn test_failed_shared_segment_is_requested_again() {
            let server = StubServer::start(|_, hit| {
                if hit == 0 {
                    (503, String::new())
                } else {
                    (200, SEGMENT_BODY.to_string())
                }
            })
            .await;
            let provider = provider(&server, "/segments/{segment}");
            let channel = ChannelId::new("NL_1");

            let err = provider
                .fetch_segment(&channel, segment_start())
                .await
                .unwrap_err();
            assert!(matches!(err, EpgError::Http { status: 503, .. }));

            let programs = provider.fetch_segment(&channel, segment_start()).await.unwrap();
            assert_eq!(programs.len(), 1);
            provider
                .fetch_segment(&ChannelId::new("NL_2"), segment_start())
                .await
                .unwrap();

            assert_eq!(server.hits(), 2);
        }

        #[tokio::test]
        async fn test_shared_segment_memo_expires() {
            let server = StubServer::start(|_, _| (200, SEGMENT_BODY.to_string())).await;
            let mut config = ZiggoConfig::new(
                server.url("/channels"),
                server.url("/segments/{segment}"),
                server.url("/events/{program}"),
            );
            config.request_interval_ms = 0;
            config.segment_memo_secs = 0;
            let provider = ZiggoProvider::new(config).unwrap();

            provider
                .fetch_segment(&ChannelId::new("NL_1"), segment_start())
                .await
                .unwrap();
            provider
                .fetch_segment(&ChannelId::new("NL_2"), segment_start())
                .await
                .unwrap();

            assert_eq!(server.hits(), 2);
        }

        #[tokio::test]
        async fn test_per_channel_segments_are_not_shared() {
            let server = StubServer::start(|_, _| (200, SEGMENT_BODY.to_string())).await;
            let provider = provider(&server, "/segments/{channel}/{segment}");

            provider
                .fetch_segment(&ChannelId::new("NL_1"), segment_start())
                .await
                .unwrap();
            provider
                .fetch_segment(&ChannelId::new("NL_2"), segment_start())
                .await
                .unwrap();

            assert_eq!(server.hits(), 2);
            assert_eq!(
                server.paths(),
                vec![
                    "/segments/NL_1/20240510060000",
                    "/segments/NL_2/20240510060000"
                ]
            );
        }

        #[tokio::test]
        async fn test_detail_request() {
            let server = StubServer::start(|path, _| match path {
                "/events/e1" => (200, r#"{"title": "Journaal"}"#.to_string()),
                _ => (404, String::new()),
            })
            .await;
            let provider = provider(&server, "/segments/{segment}");

            let detail = provider.fetch_detail(&ProgramId::new("e1")).await.unwrap();
            assert_eq!(detail.title, "Journaal");

            let err = provider.fetch_detail(&ProgramId::new("gone")).await.unwrap_err();
            assert!(matches!(err, EpgError::NotFound(_)));
        }

        #[tokio::test]
        async fn test_requests_are_spaced() {
            let server =
                StubServer::start(|_, _| (200, r#"[{"id": "NL_1", "name": "NPO 1"}]"#.to_string()))
                    .await;
            let mut config = ZiggoConfig::new(
                server.url("/channels"),
                server.url("/segments/{segment}"),
                server.url("/events/{program}"),
            );
            config.request_interval_ms = 60;
            let provider = ZiggoProvider::new(config).unwrap();

            let started = std::time::Instant::now();
            for _ in 0..3 {
                provider.list_channels().await.unwrap();
            }

            assert!(started.elapsed() >= Duration::from_millis(120));
            assert_eq!(server.hits(), 3);
        }
    }
}
