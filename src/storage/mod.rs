//! Storage module for persisting scraped records
//!
//! This module handles everything that touches the output file:
//! - The `BookRecord` model and its field-filling merge
//! - The keyed `RecordSet` that deduplicates records by `book_id`
//! - The CSV column layout and permissive row conversion
//! - The atomic, whole-file CSV store that doubles as the resume checkpoint

mod csv_store;
mod record_set;
mod schema;
mod traits;

pub use csv_store::CsvStore;
pub use record_set::{MergeStats, RecordSet};
pub use schema::{CsvRow, COLUMNS};
pub use traits::{RecordStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// One book entry extracted from a list page
#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    /// Stable key derived from the book URL
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<u64>,
    pub reviews_count: Option<u64>,
    pub list_score: Option<u64>,
    pub published_year: Option<i32>,
    /// Position within the source page (or the rank the page states)
    pub rank: u32,
    /// Page of the list the record came from
    pub page: u32,
    pub cover_url: Option<String>,
    /// File name of the downloaded cover inside the covers directory
    pub cover_id: Option<String>,
    pub book_url: String,
    pub author_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl BookRecord {
    /// Fills every empty optional field from `other`
    ///
    /// Populated fields are never overwritten and identity fields (id, title,
    /// author, URLs of the book, page, rank, timestamp) are left alone.
    ///
    /// # Returns
    ///
    /// `true` if at least one field was filled
    pub fn fill_missing_from(&mut self, other: &BookRecord) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.average_rating, &other.average_rating);
        changed |= fill(&mut self.ratings_count, &other.ratings_count);
        changed |= fill(&mut self.reviews_count, &other.reviews_count);
        changed |= fill(&mut self.list_score, &other.list_score);
        changed |= fill(&mut self.published_year, &other.published_year);
        changed |= fill(&mut self.cover_url, &other.cover_url);
        changed |= fill(&mut self.cover_id, &other.cover_id);
        changed |= fill(&mut self.author_url, &other.author_url);
        changed
    }

    /// Returns true once a cover file has been stored for this record
    pub fn has_cover(&self) -> bool {
        self.cover_id.is_some()
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) -> bool {
    if slot.is_none() && incoming.is_some() {
        slot.clone_from(incoming);
        true
    } else {
        false
    }
}
