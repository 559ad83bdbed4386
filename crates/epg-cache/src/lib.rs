#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/jbogers/ziggogo-epg/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache store implementations for the EPG grabber.
//!
//! This crate provides implementations of the [`EpgCache`] trait from `epg-core`:
//!
//! - [`SqliteCache`] - Persistent SQLite-based store (default, requires `sqlite` feature)
//! - [`InMemoryCache`] - Simple in-memory store for testing

/// In-memory cache implementation.
pub mod memory;

/// SQLite-based cache implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use epg_core::EpgCache;

// Re-export implementations
pub use memory::InMemoryCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCache;
