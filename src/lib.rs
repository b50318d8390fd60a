//! Personal feed-reading service core.
//!
//! Organizes content sources ("collections") into a per-owner tree, tracks
//! read/unread state, and periodically refreshes each collection's RSS/Atom
//! feed. This crate owns the collection hierarchy and the refresh engine; it
//! defines the operations an API layer invokes synchronously and implements
//! no HTTP itself.
//!
//! Entry point: construct a [`storage::Database`], a `reqwest::Client`, and
//! a [`Config`], then call operations on [`Service`].

pub mod config;
pub mod error;
pub mod feed;
pub mod refresh;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod tree;
pub mod util;

pub use config::Config;
pub use error::{Error, Result};
pub use service::{NewCollection, Service, UpdateCollection};
