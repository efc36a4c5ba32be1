use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Shelf-Scrape
///
/// Every key has a default, so an empty (or absent) config file yields a
/// runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScraperConfig {
    pub list: ListConfig,
    pub covers: CoverConfig,
    pub network: NetworkConfig,
    pub output: OutputConfig,

    /// Extra logging detail; equivalent to one `-v`
    pub verbose: bool,
}

/// Which list to scrape and which pages of it
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ListConfig {
    /// List identifier as it appears in the list URL (e.g. `1.Best_Books_Ever`)
    pub id: String,

    /// First page to fetch (1-based)
    pub start_page: u32,

    /// Last page to fetch, inclusive
    pub end_page: u32,

    /// Site root that list, book and author links are resolved against
    pub base_url: String,

    /// Continue after the highest page already present in the output file
    pub resume_after_last_page: bool,
}

/// Cover image download behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CoverConfig {
    pub enabled: bool,

    /// Maximum number of covers fetched from the network per list page
    pub max_per_page: u32,

    /// Seconds to wait after each downloaded cover
    pub delay: f64,

    /// Directory the cover files are written to
    pub directory: PathBuf,
}

/// Request pacing and retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Seconds between two list page requests
    pub delay_between_pages: f64,

    /// Per-request timeout in seconds
    pub request_timeout: u64,

    /// Total attempts for a request hitting 429 or a transient network failure
    pub retry_attempts: u32,

    /// Cooldown in seconds before retrying a rate-limited or failed request
    pub rate_limit_wait: f64,

    /// Value sent in the `User-Agent` header
    pub user_agent: String,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the CSV file; derived from the list id when unset
    pub csv_path: Option<PathBuf>,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            id: "1.Best_Books_Ever".to_string(),
            start_page: 1,
            end_page: 50,
            base_url: "https://www.goodreads.com".to_string(),
            resume_after_last_page: true,
        }
    }
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_page: 3,
            delay: 2.0,
            directory: PathBuf::from("covers"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            delay_between_pages: 15.0,
            request_timeout: 10,
            retry_attempts: 3,
            rate_limit_wait: 120.0,
            user_agent: concat!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) ",
                "AppleWebKit/537.36 (KHTML, like Gecko) ",
                "Chrome/91.0.4472.124 Safari/537.36"
            )
            .to_string(),
        }
    }
}

impl ScraperConfig {
    /// URL of one page of the configured list
    ///
    /// The page number is always sent explicitly, including for page 1.
    pub fn list_page_url(&self, page: u32) -> Result<url::Url, url::ParseError> {
        let mut url = url::Url::parse(&self.list.base_url)?
            .join(&format!("/list/show/{}", self.list.id))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    /// The CSV path, falling back to `dataset/goodreads_<list id>.csv`
    pub fn csv_path(&self) -> PathBuf {
        self.output.csv_path.clone().unwrap_or_else(|| {
            PathBuf::from("dataset").join(format!("goodreads_{}.csv", self.list.id.replace('.', "_")))
        })
    }

    pub fn page_delay(&self) -> Duration {
        seconds(self.network.delay_between_pages)
    }

    pub fn cover_delay(&self) -> Duration {
        seconds(self.covers.delay)
    }

    pub fn rate_limit_wait(&self) -> Duration {
        seconds(self.network.rate_limit_wait)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout)
    }
}

/// Converts validated (finite, non-negative) seconds into a Duration
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub list_id: Option<String>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    pub no_covers: bool,
    pub max_covers_per_page: Option<u32>,
    pub delay_pages: Option<f64>,
    pub delay_covers: Option<f64>,
    pub output: Option<PathBuf>,
    pub covers_dir: Option<PathBuf>,
    pub rescrape: bool,
    pub verbose: bool,
}

impl ConfigOverrides {
    /// Applies every set override onto `config`
    pub fn apply(&self, config: &mut ScraperConfig) {
        if let Some(id) = &self.list_id {
            config.list.id = id.clone();
        }
        if let Some(start) = self.start_page {
            config.list.start_page = start;
        }
        if let Some(end) = self.end_page {
            config.list.end_page = end;
        }
        if self.no_covers {
            config.covers.enabled = false;
        }
        if let Some(max) = self.max_covers_per_page {
            config.covers.max_per_page = max;
        }
        if let Some(delay) = self.delay_pages {
            config.network.delay_between_pages = delay;
        }
        if let Some(delay) = self.delay_covers {
            config.covers.delay = delay;
        }
        if let Some(path) = &self.output {
            config.output.csv_path = Some(path.clone());
        }
        if let Some(dir) = &self.covers_dir {
            config.covers.directory = dir.clone();
        }
        if self.rescrape {
            config.list.resume_after_last_page = false;
        }
        if self.verbose {
            config.verbose = true;
        }
    }
}
