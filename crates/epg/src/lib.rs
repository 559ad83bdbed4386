#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/jbogers/ziggogo-epg/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Incremental EPG synchronisation engine.
//!
//! This crate re-exports the core types, the cache implementations and the
//! ZiggoGo provider, and adds the components that turn them into a grabber.
//!
//! # Features
//!
//! - `cache-sqlite` - SQLite-based caching and [`Grabber::open`]
//!
//! # Example
//!
//! ```rust,ignore
//! use epg::{Grabber, GrabberConfig, SyncMode};
//!
//! #[tokio::main]
//! async fn main() -> epg::Result<()> {
//!     let config = GrabberConfig::load("config/ziggo-nl.toml")?;
//!     let grabber = Grabber::open(config, ".")?;
//!
//!     let outcome = grabber.run(&["NPO 1", "RTL 4"], SyncMode::Incremental).await?;
//!     std::fs::write("ziggogo.xml", outcome.xmltv).map_err(|e| epg::EpgError::Backend(e.to_string()))?;
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use epg_core::*;

// Cache implementations
#[cfg(feature = "cache-sqlite")]
pub use epg_cache::SqliteCache;
pub use epg_cache::InMemoryCache;

// Provider
pub use epg_ziggo::{ZiggoConfig, ZiggoProvider};

pub mod categories;
pub mod config;
pub mod grabber;
pub mod matcher;
pub mod render;
pub mod retry;
pub mod sync;
pub mod xmltv;

#[cfg(test)]
mod test_support;

pub use config::{GrabberConfig, SyncConfig};
pub use grabber::{GrabOutcome, Grabber};
pub use matcher::{ChannelMatch, ChannelMatcher, DEFAULT_MATCH_THRESHOLD};
pub use render::{ProgrammeRecord, XmltvRenderer};
pub use retry::RetryPolicy;
pub use sync::{FailureTarget, SyncFailure, SyncMode, SyncOptions, SyncOrchestrator, SyncSummary};
pub use xmltv::{XmltvOptions, XmltvWriter};
