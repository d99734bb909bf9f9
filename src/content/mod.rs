//! Page enrichment: fetch the page an item links to and scrape a fixed set
//! of named fields out of its HTML.
//!
//! Extraction is best-effort. A page that cannot be fetched is an error for
//! the caller to log; a page without the expected markup is just an empty
//! [`Enrichment`].

mod enricher;
mod extractor;

pub use enricher::{Enricher, HttpEnricher};
pub use extractor::{
    extract_description, extract_image, Enrichment, ExtractFn, ExtractorRegistry, DESCRIPTION,
    IMAGE,
};
