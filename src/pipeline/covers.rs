//! Cover image downloads
//!
//! Covers are stored as `<covers dir>/<book id>.<ext>`. A file that already
//! exists is reused without touching the network, and each list page has its
//! own download quota.

use crate::config::ScraperConfig;
use crate::pipeline::fetcher::{pause, FetchError, RateLimitedFetcher, RequestKind};
use crate::pipeline::transport::Transport;
use crate::storage::BookRecord;
use crate::url::cover_file_name;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// What happened to one record's cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverOutcome {
    /// The record has no cover URL
    NoUrl,

    /// The record already names a cover file, or the file was on disk
    AlreadyPresent,

    /// The page's quota was used up
    QuotaExhausted,

    /// The image was fetched and stored
    Downloaded,

    /// The fetch or the write failed
    Failed,

    /// Cancellation arrived during the fetch
    Interrupted,
}

impl CoverOutcome {
    /// Quota units this outcome used up
    pub fn quota_consumed(&self) -> u32 {
        match self {
            Self::Downloaded => 1,
            _ => 0,
        }
    }
}

/// Cover totals for one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverTally {
    pub downloaded: usize,
    pub reused: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Downloads cover images into the covers directory
pub struct CoverDownloader {
    directory: PathBuf,
    delay: Duration,
}

impl CoverDownloader {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            directory: config.covers.directory.clone(),
            delay: config.cover_delay(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the covers directory if needed
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.directory)
    }

    /// Processes the covers of one page's records in page order
    ///
    /// Stops early on cancellation; records not reached keep their cover
    /// fields unset.
    pub async fn download_page<T: Transport>(
        &self,
        fetcher: &mut RateLimitedFetcher<T>,
        records: &mut [BookRecord],
        quota: u32,
    ) -> CoverTally {
        let mut tally = CoverTally::default();
        let mut remaining = quota;

        for record in records.iter_mut() {
            if fetcher.cancel_token().is_cancelled() {
                tally.interrupted = true;
                break;
            }

            let outcome = self.maybe_download(fetcher, record, remaining).await;
            remaining = remaining.saturating_sub(outcome.quota_consumed());

            match outcome {
                CoverOutcome::Downloaded => tally.downloaded += 1,
                CoverOutcome::AlreadyPresent => tally.reused += 1,
                CoverOutcome::Failed => tally.failed += 1,
                CoverOutcome::Interrupted => {
                    tally.interrupted = true;
                    break;
                }
                CoverOutcome::NoUrl | CoverOutcome::QuotaExhausted => {}
            }
        }

        tally
    }

    /// Downloads one record's cover unless it is absent, known, on disk or over quota
    ///
    /// On success the record's `cover_id` is set and the inter-cover delay is
    /// observed before returning.
    pub async fn maybe_download<T: Transport>(
        &self,
        fetcher: &mut RateLimitedFetcher<T>,
        record: &mut BookRecord,
        quota_remaining: u32,
    ) -> CoverOutcome {
        if let Some(cover_id) = &record.cover_id {
            tracing::debug!("Cover for {} already recorded as {}", record.book_id, cover_id);
            return CoverOutcome::AlreadyPresent;
        }

        let Some(cover_url) = record.cover_url.clone() else {
            return CoverOutcome::NoUrl;
        };

        let file_name = cover_file_name(&record.book_id, &cover_url);
        let destination = self.directory.join(&file_name);

        if destination.exists() {
            tracing::debug!("Cover for {} already at {}", record.book_id, destination.display());
            record.cover_id = Some(file_name);
            return CoverOutcome::AlreadyPresent;
        }

        if quota_remaining == 0 {
            return CoverOutcome::QuotaExhausted;
        }

        let response = match fetcher.fetch(&cover_url, RequestKind::Cover).await {
            Ok(response) => response,
            Err(FetchError::Interrupted) => return CoverOutcome::Interrupted,
            Err(e) => {
                tracing::warn!("Cover for {} not downloaded: {}", record.book_id, e);
                return CoverOutcome::Failed;
            }
        };

        if response.body.is_empty() {
            tracing::warn!("Cover for {} was empty", record.book_id);
            return CoverOutcome::Failed;
        }

        if let Err(e) = self.store(&destination, &response.body) {
            tracing::warn!("Could not save cover {}: {}", destination.display(), e);
            return CoverOutcome::Failed;
        }

        tracing::debug!("Saved cover {}", destination.display());
        record.cover_id = Some(file_name);

        // Cancellation here is picked up by the caller's next check
        let _ = pause(fetcher.cancel_token(), self.delay).await;

        CoverOutcome::Downloaded
    }

    /// Writes to a temporary file next to `destination`, then renames it
    fn store(&self, destination: &Path, bytes: &[u8]) -> std::io::Result<()> {
        self.prepare()?;
        let mut tmp = NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(destination).map_err(|e| e.error)?;
        Ok(())
    }
}
