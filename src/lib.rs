//! Periodic news feed ingestion with asynchronous page enrichment.
//!
//! The ingestion scheduler polls a feed, stores unseen items and publishes
//! their links to a queue; the enrichment worker consumes those links and
//! scrapes a description and preview image from each page. Stored items are
//! served newest-first through a paginated read API.

pub mod api;
pub mod config;
pub mod content;
pub mod feed;
pub mod pipeline;
pub mod queue;
pub mod storage;
