//! CSV layout of the output file
//!
//! The output file has a fixed column order. Rows are read permissively so
//! that files written by older versions of the tool (different headers,
//! `N/A` placeholders, naive timestamps, no `book_id` column) still load.

use crate::storage::BookRecord;
use crate::url::book_id_from_str;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Header row of the output file, in column order
pub const COLUMNS: [&str; 15] = [
    "book_id",
    "title",
    "author",
    "average_rating",
    "ratings_count",
    "reviews_count",
    "list_score",
    "published_year",
    "rank",
    "page",
    "cover_url",
    "cover_id",
    "book_url",
    "author_url",
    "scraped_at",
];

/// Placeholder older files used for a missing value
const MISSING: &str = "N/A";

/// Naive timestamp format written by older files
const LEGACY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// One CSV row as text; field order matches [`COLUMNS`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvRow {
    pub book_id: String,
    pub title: String,
    pub author: String,
    #[serde(alias = "avg_rating")]
    pub average_rating: String,
    pub ratings_count: String,
    pub reviews_count: String,
    pub list_score: String,
    pub published_year: String,
    pub rank: String,
    pub page: String,
    pub cover_url: String,
    pub cover_id: String,
    pub book_url: String,
    pub author_url: String,
    pub scraped_at: String,
}

impl From<&BookRecord> for CsvRow {
    fn from(record: &BookRecord) -> Self {
        Self {
            book_id: record.book_id.clone(),
            title: record.title.clone(),
            author: record.author.clone(),
            average_rating: optional(&record.average_rating),
            ratings_count: optional(&record.ratings_count),
            reviews_count: optional(&record.reviews_count),
            list_score: optional(&record.list_score),
            published_year: optional(&record.published_year),
            rank: record.rank.to_string(),
            page: record.page.to_string(),
            cover_url: record.cover_url.clone().unwrap_or_default(),
            cover_id: record.cover_id.clone().unwrap_or_default(),
            book_url: record.book_url.clone(),
            author_url: record.author_url.clone().unwrap_or_default(),
            scraped_at: record.scraped_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl CsvRow {
    /// Converts the row back into a record
    ///
    /// `fallback_rank` is used when the row has no usable rank (older files
    /// did not store one); callers pass the row's position in the file.
    ///
    /// # Returns
    ///
    /// * `Ok(BookRecord)` - The row was usable
    /// * `Err(String)` - Why the row had to be skipped
    pub fn into_record(self, fallback_rank: u32) -> Result<BookRecord, String> {
        let book_url = present(&self.book_url).ok_or("missing book_url")?;

        let book_id = match present(&self.book_id) {
            Some(id) => id,
            None => book_id_from_str(&book_url)
                .ok_or_else(|| format!("cannot derive book_id from '{}'", book_url))?,
        };

        let page = parsed::<u32>(&self.page)
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("invalid page '{}'", self.page))?;

        let rank = parsed::<u32>(&self.rank)
            .filter(|r| *r > 0)
            .unwrap_or(fallback_rank);

        Ok(BookRecord {
            book_id,
            title: present(&self.title).unwrap_or_default(),
            author: present(&self.author).unwrap_or_default(),
            average_rating: parsed(&self.average_rating),
            ratings_count: parsed(&self.ratings_count),
            reviews_count: parsed(&self.reviews_count),
            list_score: parsed(&self.list_score),
            published_year: parsed(&self.published_year),
            rank,
            page,
            cover_url: present(&self.cover_url),
            cover_id: present(&self.cover_id),
            book_url,
            author_url: present(&self.author_url),
            scraped_at: parse_timestamp(&self.scraped_at),
        })
    }
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Treats empty strings and the legacy placeholder as absent
fn present(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == MISSING {
        None
    } else {
        Some(value.to_string())
    }
}

fn parsed<T: std::str::FromStr>(value: &str) -> Option<T> {
    present(value)?.replace(',', "").parse().ok()
}

/// RFC 3339 first, then the legacy naive format; the epoch when neither fits
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return ts.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(value, LEGACY_TIMESTAMP)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}
