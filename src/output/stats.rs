//! Statistics generation from the output file
//!
//! This module provides functionality for extracting and displaying
//! collection statistics from a stored record set.

use crate::storage::{RecordSet, RecordStore};
use crate::ScrapeError;
use std::collections::{BTreeMap, HashMap};

/// Number of authors listed in the statistics
const TOP_AUTHORS: usize = 5;

/// Collection statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStatistics {
    /// Total number of stored records
    pub total_records: usize,

    /// Records with a stored cover
    pub with_covers: usize,

    /// Records per list page
    pub records_by_page: BTreeMap<u32, usize>,

    /// Pages below the highest stored page with no records
    pub missing_pages: Vec<u32>,

    /// Mean of the average ratings that are present
    pub mean_rating: Option<f64>,

    /// Authors with the most records, most first
    pub top_authors: Vec<(String, usize)>,
}

impl CollectionStatistics {
    /// Computes statistics over a record set
    pub fn from_records(records: &RecordSet) -> Self {
        let mut records_by_page = BTreeMap::new();
        let mut authors: HashMap<&str, usize> = HashMap::new();
        let mut rating_sum = 0.0;
        let mut rated = 0usize;

        for record in records.iter() {
            *records_by_page.entry(record.page).or_insert(0) += 1;
            *authors.entry(record.author.as_str()).or_insert(0) += 1;
            if let Some(rating) = record.average_rating {
                rating_sum += rating;
                rated += 1;
            }
        }

        let missing_pages = match records.max_page() {
            Some(max) => (1..max).filter(|p| !records_by_page.contains_key(p)).collect(),
            None => Vec::new(),
        };

        let mut top_authors: Vec<(String, usize)> = authors
            .into_iter()
            .map(|(author, count)| (author.to_string(), count))
            .collect();
        top_authors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_authors.truncate(TOP_AUTHORS);

        Self {
            total_records: records.len(),
            with_covers: records.with_covers(),
            records_by_page,
            missing_pages,
            mean_rating: (rated > 0).then(|| rating_sum / rated as f64),
            top_authors,
        }
    }

    /// Highest page with stored records
    pub fn highest_page(&self) -> Option<u32> {
        self.records_by_page.keys().next_back().copied()
    }
}

/// Loads statistics from a record store
///
/// # Arguments
///
/// * `store` - The store holding the collected records
///
/// # Returns
///
/// * `Ok(CollectionStatistics)` - Successfully loaded statistics
/// * `Err(ScrapeError)` - Failed to read the store
pub fn load_statistics(store: &dyn RecordStore) -> Result<CollectionStatistics, ScrapeError> {
    let records = store.load()?;
    Ok(CollectionStatistics::from_records(&records))
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CollectionStatistics) {
    println!("=== Collection Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    let cover_share = if stats.total_records > 0 {
        (stats.with_covers as f64 / stats.total_records as f64) * 100.0
    } else {
        0.0
    };
    println!("  With covers: {} ({:.1}%)", stats.with_covers, cover_share);
    match stats.mean_rating {
        Some(rating) => println!("  Mean rating: {:.2}", rating),
        None => println!("  Mean rating: n/a"),
    }
    println!();

    println!("Pages:");
    match stats.highest_page() {
        Some(highest) => {
            println!("  Pages with records: {}", stats.records_by_page.len());
            println!("  Highest page: {}", highest);
        }
        None => println!("  No pages stored"),
    }
    if !stats.missing_pages.is_empty() {
        let missing: Vec<String> = stats.missing_pages.iter().map(u32::to_string).collect();
        println!("  Missing pages: {}", missing.join(", "));
    }
    println!();

    if !stats.top_authors.is_empty() {
        println!("Top Authors:");
        for (author, count) in &stats.top_authors {
            println!("  {}: {}", author, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::book;
    use crate::storage::{BookRecord, CsvStore};
    use tempfile::TempDir;

    fn by(author: &str, id: &str, page: u32) -> BookRecord {
        let mut record = book(id, page, 1);
        record.author = author.to_string();
        record
    }

    #[test]
    fn test_statistics_from_records() {
        let mut rated = by("Austen", "1", 1);
        rated.average_rating = Some(4.0);
        rated.cover_id = Some("1.jpg".to_string());
        let mut other = by("Austen", "2", 1);
        other.average_rating = Some(3.0);
        let records: RecordSet = vec![rated, other, by("Bronte", "3", 4)].into_iter().collect();

        let stats = CollectionStatistics::from_records(&records);

        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.with_covers, 1);
        assert_eq!(stats.highest_page(), Some(4));
        assert_eq!(stats.records_by_page.get(&1), Some(&2));
        assert_eq!(stats.missing_pages, vec![2, 3]);
        assert_eq!(stats.mean_rating, Some(3.5));
        assert_eq!(
            stats.top_authors,
            vec![("Austen".to_string(), 2), ("Bronte".to_string(), 1)]
        );
    }

    #[test]
    fn test_statistics_empty() {
        let stats = CollectionStatistics::from_records(&RecordSet::new());
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.highest_page(), None);
        assert!(stats.missing_pages.is_empty());
        assert_eq!(stats.mean_rating, None);
    }

    #[test]
    fn test_load_statistics_from_store() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("books.csv"));
        let records: RecordSet = vec![book("1", 1, 1), book("2", 2, 1)].into_iter().collect();
        store.persist(&records).unwrap();

        let stats = load_statistics(&store).unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.highest_page(), Some(2));
    }
}
