//! Scrape coordinator - main run orchestration logic
//!
//! This module contains the page loop that coordinates a run:
//! - Checking the output location and loading the previous checkpoint
//! - Choosing the first page (resume after the last stored page)
//! - Fetching, extracting, downloading covers and merging page by page
//! - Persisting after every page
//! - Handling interrupts and producing the final report

use crate::config::ScraperConfig;
use crate::pipeline::covers::CoverDownloader;
use crate::pipeline::extractor::RecordExtractor;
use crate::pipeline::fetcher::{pause, FetchError, FetchStats, RateLimitedFetcher, RequestKind};
use crate::pipeline::transport::{HttpTransport, Transport};
use crate::state::{RunCounts, RunPhase, RunState};
use crate::storage::{CsvStore, RecordSet, RecordStore};
use crate::ScrapeError;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// How the page loop ended: completed, interrupted or failed
    pub outcome: RunPhase,

    pub counts: RunCounts,

    /// Records in the output file after the run
    pub records_total: usize,

    /// Records in the output file with a stored cover
    pub covers_total: usize,

    /// First and last page the run attempted, if it attempted any
    pub pages: Option<(u32, u32)>,

    pub output: PathBuf,
    pub covers_dir: Option<PathBuf>,
    pub fetch: FetchStats,
    pub elapsed: Duration,

    /// Storage failure that made the run fatal
    pub error: Option<String>,
}

impl RunReport {
    /// False when storage failed; interrupted runs still count as clean
    pub fn is_success(&self) -> bool {
        self.outcome != RunPhase::Failed && self.error.is_none()
    }
}

/// What the loop should do after a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStep {
    Next,
    LastPage,
    Interrupted,
}

/// Main scrape coordinator
pub struct Coordinator<T: Transport = HttpTransport> {
    config: ScraperConfig,
    fetcher: RateLimitedFetcher<T>,
    extractor: RecordExtractor,
    covers: CoverDownloader,
    store: CsvStore,
    cancel: CancellationToken,
    fresh: bool,
}

impl Coordinator<HttpTransport> {
    /// Creates a coordinator that talks HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The validated run configuration
    /// * `cancel` - Token that requests a graceful stop when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(ScrapeError)` - The HTTP client or base URL was unusable
    pub fn new(config: ScraperConfig, cancel: CancellationToken) -> Result<Self, ScrapeError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, transport, cancel)
    }
}

impl<T: Transport> Coordinator<T> {
    /// Creates a coordinator over any transport
    pub fn with_transport(
        config: ScraperConfig,
        transport: T,
        cancel: CancellationToken,
    ) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(&config.list.base_url)?;
        let extractor = RecordExtractor::new(base_url)?;
        let fetcher = RateLimitedFetcher::new(transport, &config, cancel.clone());
        let covers = CoverDownloader::new(&config);
        let store = CsvStore::new(config.csv_path());

        Ok(Self {
            config,
            fetcher,
            extractor,
            covers,
            store,
            cancel,
            fresh: false,
        })
    }

    /// Ignore the existing output file and start from an empty record set
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn transport(&self) -> &T {
        self.fetcher.transport()
    }

    /// Runs the page loop and finalizes
    ///
    /// Page-level problems (failed fetches, dropped rows, failed covers) are
    /// counted and the loop moves on. A storage failure ends the loop as
    /// `Failed`; the report carries the error and one last persist is still
    /// attempted. When the output cannot be opened at all the run goes
    /// straight from `Idle` to `Failed` and nothing is written.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - The run reached `Done`, whatever its outcome
    /// * `Err(ScrapeError)` - The run state machine was driven out of order
    pub async fn run(&mut self) -> Result<RunReport, ScrapeError> {
        let started = Instant::now();

        let records = match self.open_output() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Cannot use output {}: {}", self.store.location().display(), e);
                return self.abort(started, e);
            }
        };

        let mut state = RunState::new(records);
        state.transition(RunPhase::Running)?;

        let first = self.first_page(&state.records);
        let last = self.config.list.end_page;
        let mut error = None;
        let mut attempted = None;

        let outcome = if first > last {
            tracing::info!(
                "Pages {}-{} are already stored in {}",
                self.config.list.start_page,
                last,
                self.store.location().display()
            );
            RunPhase::Completed
        } else {
            tracing::info!(
                "Scraping list {} pages {}-{} into {}",
                self.config.list.id,
                first,
                last,
                self.store.location().display()
            );

            let mut outcome = RunPhase::Completed;
            for page in first..=last {
                if self.cancel.is_cancelled() {
                    outcome = RunPhase::Interrupted;
                    break;
                }
                attempted = Some((first, page));

                match self.process_page(page, &mut state).await {
                    Ok(PageStep::Next) => {}
                    Ok(PageStep::LastPage) => {
                        tracing::info!("Page {} has no next page, list finished", page);
                        break;
                    }
                    Ok(PageStep::Interrupted) => {
                        outcome = RunPhase::Interrupted;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Stopping on page {}: {}", page, e);
                        error = Some(e.to_string());
                        outcome = RunPhase::Failed;
                        break;
                    }
                }

                if page < last && pause(&self.cancel, self.config.page_delay()).await.is_err() {
                    outcome = RunPhase::Interrupted;
                    break;
                }
            }
            outcome
        };

        if outcome == RunPhase::Interrupted {
            tracing::warn!("Interrupted, saving progress");
        }
        state.transition(outcome)?;
        state.current_page = None;

        state.transition(RunPhase::Finalizing)?;
        if let Err(e) = self.store.persist(&state.records) {
            tracing::error!("Final save to {} failed: {}", self.store.location().display(), e);
            if error.is_none() {
                error = Some(e.to_string());
            }
        }
        state.transition(RunPhase::Done)?;

        Ok(self.report(&state, outcome, attempted, started, error))
    }

    /// Checks the output location and loads the previous checkpoint
    fn open_output(&self) -> Result<RecordSet, ScrapeError> {
        self.store.ensure_writable()?;
        if self.config.covers.enabled {
            self.covers.prepare()?;
        }

        if self.fresh {
            tracing::info!("Ignoring existing output at {}", self.store.location().display());
            return Ok(RecordSet::new());
        }
        Ok(self.store.load()?)
    }

    /// Ends a run whose output could not be opened; the file is left untouched
    fn abort(&self, started: Instant, error: ScrapeError) -> Result<RunReport, ScrapeError> {
        let mut state = RunState::new(RecordSet::new());
        state.transition(RunPhase::Failed)?;
        state.transition(RunPhase::Finalizing)?;
        state.transition(RunPhase::Done)?;

        Ok(self.report(&state, RunPhase::Failed, None, started, Some(error.to_string())))
    }

    fn report(
        &self,
        state: &RunState,
        outcome: RunPhase,
        pages: Option<(u32, u32)>,
        started: Instant,
        error: Option<String>,
    ) -> RunReport {
        RunReport {
            outcome,
            counts: state.counts,
            records_total: state.records.len(),
            covers_total: state.records.with_covers(),
            pages,
            output: self.store.location().to_path_buf(),
            covers_dir: self
                .config
                .covers
                .enabled
                .then(|| self.covers.directory().to_path_buf()),
            fetch: self.fetcher.stats(),
            elapsed: started.elapsed(),
            error,
        }
    }

    /// Start page after taking stored progress into account
    fn first_page(&self, records: &RecordSet) -> u32 {
        let start = self.config.list.start_page;
        if self.fresh || !self.config.list.resume_after_last_page {
            return start;
        }

        match records.max_page() {
            Some(stored) if stored >= start => {
                tracing::info!("Output already holds pages up to {}, resuming after it", stored);
                stored.saturating_add(1)
            }
            _ => start,
        }
    }

    /// Fetch, extract, covers, merge and persist for one page
    async fn process_page(&mut self, page: u32, state: &mut RunState) -> Result<PageStep, ScrapeError> {
        state.current_page = Some(page);
        let url = self.config.list_page_url(page)?;
        tracing::info!("Page {}/{}: {}", page, self.config.list.end_page, url);

        let response = match self.fetcher.fetch(url.as_str(), RequestKind::Page).await {
            Ok(response) => response,
            Err(FetchError::Interrupted) => return Ok(PageStep::Interrupted),
            Err(e) => {
                tracing::warn!("Page {} skipped: {}", page, e);
                state.counts.pages_failed += 1;
                return Ok(PageStep::Next);
            }
        };

        let html = String::from_utf8_lossy(&response.body);
        let mut extraction = self.extractor.extract(&html, page);

        if self.config.covers.enabled {
            for record in extraction.records.iter_mut() {
                if record.cover_id.is_none() {
                    record.cover_id = state
                        .records
                        .get(&record.book_id)
                        .and_then(|stored| stored.cover_id.clone());
                }
            }

            let tally = self
                .covers
                .download_page(
                    &mut self.fetcher,
                    &mut extraction.records,
                    self.config.covers.max_per_page,
                )
                .await;
            state.counts.covers_downloaded += tally.downloaded;
            state.counts.covers_failed += tally.failed;
            tracing::debug!(
                "Page {} covers: {} downloaded, {} already on disk, {} failed",
                page,
                tally.downloaded,
                tally.reused,
                tally.failed
            );

            // Covers already on disk are picked up again when the page is redone
            if tally.interrupted {
                tracing::warn!("Page {} interrupted during cover downloads, not saved", page);
                return Ok(PageStep::Interrupted);
            }
        }

        state.counts.records_dropped += extraction.dropped.len();
        let extracted = extraction.records.len();
        let merged = state.records.merge(extraction.records);
        state.counts.add_merge(merged);
        self.store.persist(&state.records)?;
        state.counts.pages_completed += 1;

        tracing::info!(
            "Page {}: {} records ({} new, {} updated, {} dropped), {} total",
            page,
            extracted,
            merged.inserted,
            merged.updated,
            extraction.dropped.len(),
            state.records.len()
        );

        if extraction.has_next_page {
            Ok(PageStep::Next)
        } else {
            Ok(PageStep::LastPage)
        }
    }
}
