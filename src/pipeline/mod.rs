//! Scrape pipeline
//!
//! This module contains the per-page scraping flow, including:
//! - HTTP transport and the rate-limited fetcher on top of it
//! - Record extraction from list page HTML
//! - Cover downloads with a per-page quota
//! - The coordinator that runs pages in order and checkpoints after each

mod coordinator;
mod covers;
mod extractor;
mod fetcher;
mod transport;

pub use coordinator::{Coordinator, RunReport};
pub use covers::{CoverDownloader, CoverOutcome, CoverTally};
pub use extractor::{Extraction, RecordError, RecordExtractor};
pub use fetcher::{pause, FetchError, FetchStats, RateLimitedFetcher, RequestKind};
pub use transport::{
    build_http_client, HttpTransport, RawResponse, Transport, TransportError, TransportErrorKind,
};
