//! Keyed record set and the merge that deduplicates by `book_id`

use crate::storage::BookRecord;
use std::collections::HashMap;

/// Result of merging one batch of records into a set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records whose `book_id` was new
    pub inserted: usize,

    /// Existing records that gained at least one field
    pub updated: usize,
}

/// Records keyed by `book_id`; at most one record per id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: HashMap<String, BookRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, book_id: &str) -> Option<&BookRecord> {
        self.records.get(book_id)
    }

    pub fn contains(&self, book_id: &str) -> bool {
        self.records.contains_key(book_id)
    }

    /// Records in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &BookRecord> {
        self.records.values()
    }

    /// Merges incoming records into the set
    ///
    /// New ids are inserted. Known ids only have their empty fields filled
    /// from the incoming record (see [`BookRecord::fill_missing_from`]), so
    /// merging the same batch twice leaves the set unchanged the second time.
    pub fn merge<I>(&mut self, incoming: I) -> MergeStats
    where
        I: IntoIterator<Item = BookRecord>,
    {
        let mut stats = MergeStats::default();

        for record in incoming {
            match self.records.get_mut(&record.book_id) {
                Some(existing) => {
                    if existing.fill_missing_from(&record) {
                        stats.updated += 1;
                    }
                }
                None => {
                    self.records.insert(record.book_id.clone(), record);
                    stats.inserted += 1;
                }
            }
        }

        stats
    }

    /// Records in output order: page, then rank, then id
    pub fn sorted(&self) -> Vec<&BookRecord> {
        let mut records: Vec<&BookRecord> = self.records.values().collect();
        records.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(a.rank.cmp(&b.rank))
                .then_with(|| a.book_id.cmp(&b.book_id))
        });
        records
    }

    /// Highest page any stored record came from
    pub fn max_page(&self) -> Option<u32> {
        self.records.values().map(|r| r.page).max()
    }

    /// Number of records with a stored cover
    pub fn with_covers(&self) -> usize {
        self.records.values().filter(|r| r.has_cover()).count()
    }
}

impl FromIterator<BookRecord> for RecordSet {
    fn from_iter<T: IntoIterator<Item = BookRecord>>(iter: T) -> Self {
        let mut set = RecordSet::new();
        set.merge(iter);
        set
    }
}
