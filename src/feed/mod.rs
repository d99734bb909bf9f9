//! Feed retrieval and decoding.
//!
//! - `fetcher` - bounded HTTP GET with a browser-like identification header
//! - `parser` - RSS / RDF / Atom / JSON Feed decoding into title+link entries
//!
//! Neither step retries; retry and backoff belong to the ingestion scheduler.
//!
//! # Example
//!
//! ```ignore
//! use newsline::feed::{build_client, fetch, decode};
//!
//! let client = build_client()?;
//! let body = fetch(&client, "https://feeds.bbci.co.uk/news/world/rss.xml").await?;
//! let entries = decode(&body)?;
//! ```

mod fetcher;
mod parser;

pub use fetcher::{
    build_client, fetch, FeedSource, FetchError, HttpFeedSource, BROWSER_USER_AGENT, FETCH_TIMEOUT,
};
pub use parser::{decode, DecodeError, FeedEntry};
