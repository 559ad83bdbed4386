#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/jbogers/ziggogo-epg/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the EPG grabber.
//!
//! This crate provides the foundational abstractions shared by every other crate:
//!
//! - [`EpgProvider`](provider::EpgProvider) - The remote channel/segment/detail fetch surface
//! - [`EpgCache`](cache::EpgCache) - Persistent store of channels, segments and details
//! - [`SyncWindow`](window::SyncWindow) and [`SegmentGrid`](window::SegmentGrid) - Time bounds
//! - [`segment_is_fresh`](window::segment_is_fresh) - The freshness rule

/// Cache trait for storing fetched guide data.
pub mod cache;
/// Error types for guide operations.
pub mod error;
/// Provider trait for fetching guide data.
pub mod provider;
/// Core data types (Channel, ProgramStub, ProgramDetail, etc.).
pub mod types;
/// Sync window, segment grid and freshness definitions.
pub mod window;

// Re-export commonly used items at crate root
pub use cache::EpgCache;
pub use error::{EpgError, Result};
pub use provider::EpgProvider;
pub use types::{
    Channel, ChannelId, Credits, EpisodeNumber, ProgramDetail, ProgramId, ProgramStub, SegmentKey,
};
pub use window::{DEFAULT_SEGMENT_HOURS, SegmentGrid, SyncWindow, segment_is_fresh};
