//! Record extraction from list pages
//!
//! This module turns the HTML of one list page into book records:
//! - One candidate row per `tr[itemtype="http://schema.org/Book"]`
//! - Required fields (title, author, book URL) decide whether a row is kept
//! - Optional fields are parsed permissively and left empty when unreadable
//! - The pagination control decides whether another page exists

use crate::storage::BookRecord;
use crate::url::{book_id_from_url, canonical_url, upscale_cover_url};
use crate::ScrapeError;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

const ROW: &str = r#"tr[itemtype="http://schema.org/Book"]"#;
const TITLE: &str = "a.bookTitle";
const AUTHOR: &str = "a.authorName";
const RANK: &str = "td.number";
const RATING: &str = "span.minirating";
const COVER: &str = "img.bookCover";
const NEXT_PAGE: &str = "a.next_page";

/// Why a row was dropped
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("row {position}: missing {field}")]
    MissingField {
        position: usize,
        field: &'static str,
    },

    #[error("row {position}: unusable book URL '{href}'")]
    InvalidBookUrl { position: usize, href: String },
}

/// Everything extracted from one list page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Records in page order
    pub records: Vec<BookRecord>,

    /// True if the page links to a following page
    pub has_next_page: bool,

    /// Rows that were dropped, with the reason
    pub dropped: Vec<RecordError>,
}

struct Selectors {
    row: Selector,
    title: Selector,
    author: Selector,
    rank: Selector,
    rating: Selector,
    cover: Selector,
    next_page: Selector,
}

/// Extracts book records from list page HTML
pub struct RecordExtractor {
    base_url: Url,
    selectors: Selectors,
}

impl RecordExtractor {
    /// Creates an extractor that resolves relative links against `base_url`
    pub fn new(base_url: Url) -> Result<Self, ScrapeError> {
        let selectors = Selectors {
            row: selector(ROW)?,
            title: selector(TITLE)?,
            author: selector(AUTHOR)?,
            rank: selector(RANK)?,
            rating: selector(RATING)?,
            cover: selector(COVER)?,
            next_page: selector(NEXT_PAGE)?,
        };

        Ok(Self {
            base_url,
            selectors,
        })
    }

    /// Extracts every usable record from one list page
    ///
    /// # Arguments
    ///
    /// * `html` - The page body
    /// * `page` - The page number, stored on each record
    ///
    /// # Returns
    ///
    /// The kept records, the dropped rows and the next-page flag. A page
    /// without any book rows yields an empty extraction, not an error.
    pub fn extract(&self, html: &str, page: u32) -> Extraction {
        let document = Html::parse_document(html);
        let scraped_at = Utc::now();
        let mut extraction = Extraction {
            has_next_page: self.has_next_page(&document),
            ..Default::default()
        };

        for (index, element) in document.select(&self.selectors.row).enumerate() {
            let row = BookRow {
                element,
                selectors: &self.selectors,
                base_url: &self.base_url,
                position: index + 1,
            };

            match row.to_record(page, scraped_at) {
                Ok(record) => extraction.records.push(record),
                Err(e) => {
                    tracing::warn!("Page {}: dropped {}", page, e);
                    extraction.dropped.push(e);
                }
            }
        }

        extraction
    }

    /// An enabled `a.next_page` link means more pages follow
    fn has_next_page(&self, document: &Html) -> bool {
        document
            .select(&self.selectors.next_page)
            .any(|link| !link.value().classes().any(|class| class == "disabled"))
    }
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::HtmlParse(format!("invalid selector '{}': {:?}", css, e)))
}

/// One book row with typed accessors for its fields
struct BookRow<'a> {
    element: ElementRef<'a>,
    selectors: &'a Selectors,
    base_url: &'a Url,
    position: usize,
}

impl<'a> BookRow<'a> {
    fn to_record(&self, page: u32, scraped_at: DateTime<Utc>) -> Result<BookRecord, RecordError> {
        let title = self.title().ok_or_else(|| self.missing("title"))?;
        let author = self.author().ok_or_else(|| self.missing("author"))?;

        let href = self
            .first(&self.selectors.title)
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| self.missing("book URL"))?;
        let book_url = canonical_url(href, self.base_url).ok_or_else(|| self.invalid_url(href))?;
        let book_id = book_id_from_url(&book_url).ok_or_else(|| self.invalid_url(href))?;

        let rating_text = self.text_of(&self.selectors.rating).unwrap_or_default();
        let row_text = collapse(self.element.text());

        Ok(BookRecord {
            book_id,
            published_year: published_year(&row_text).or_else(|| year_in_title(&title)),
            title,
            author,
            average_rating: average_rating(&rating_text),
            ratings_count: count_before(&rating_text, "rating"),
            reviews_count: count_before(&rating_text, "review"),
            list_score: count_after(&row_text, "score:"),
            rank: self.rank().unwrap_or(self.position as u32),
            page,
            cover_url: self.cover_url(),
            cover_id: None,
            book_url: book_url.to_string(),
            author_url: self.author_url(),
            scraped_at,
        })
    }

    fn title(&self) -> Option<String> {
        self.text_of(&self.selectors.title)
    }

    fn author(&self) -> Option<String> {
        self.text_of(&self.selectors.author)
    }

    fn author_url(&self) -> Option<String> {
        let href = self.first(&self.selectors.author)?.value().attr("href")?;
        canonical_url(href, self.base_url).map(|url| url.to_string())
    }

    /// Explicit rank cell, when it holds a positive number
    fn rank(&self) -> Option<u32> {
        self.text_of(&self.selectors.rank)?
            .trim_end_matches('.')
            .parse()
            .ok()
            .filter(|rank| *rank > 0)
    }

    fn cover_url(&self) -> Option<String> {
        let src = self.first(&self.selectors.cover)?.value().attr("src")?;
        canonical_url(src, self.base_url).map(|url| upscale_cover_url(url.as_str()))
    }

    fn first(&self, selector: &Selector) -> Option<ElementRef<'a>> {
        self.element.select(selector).next()
    }

    /// Whitespace-collapsed text of the first match, if non-empty
    fn text_of(&self, selector: &Selector) -> Option<String> {
        let text = collapse(self.first(selector)?.text());
        (!text.is_empty()).then_some(text)
    }

    fn missing(&self, field: &'static str) -> RecordError {
        RecordError::MissingField {
            position: self.position,
            field,
        }
    }

    fn invalid_url(&self, href: &str) -> RecordError {
        RecordError::InvalidBookUrl {
            position: self.position,
            href: href.to_string(),
        }
    }
}

fn collapse<'t>(parts: impl Iterator<Item = &'t str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digits of a token such as `9,001,234` or `1,234,`; `None` for non-integers
fn parse_count(token: &str) -> Option<u64> {
    let digits = token
        .trim_matches(|c: char| !c.is_ascii_digit())
        .replace(',', "");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The number just before a word starting with `label`, e.g. `12 ratings`
fn count_before(text: &str, label: &str) -> Option<u64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens
        .windows(2)
        .find_map(|w| if w[1].starts_with(label) { parse_count(w[0]) } else { None })
}

/// The number following `label`, either in the same token or the next one
fn count_after(text: &str, label: &str) -> Option<u64> {
    let start = text.find(label)? + label.len();
    text[start..].split_whitespace().next().and_then(parse_count)
}

/// `4.34 avg rating`; otherwise the first decimal number in the text.
/// Ratings outside 0-5 are never accepted.
fn average_rating(text: &str) -> Option<f64> {
    let is_rating = |r: &f64| (0.0..=5.0).contains(r);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let before_avg: Option<f64> = tokens
        .windows(2)
        .find_map(|w| if w[1] == "avg" { w[0].parse().ok() } else { None })
        .filter(is_rating);

    before_avg.or_else(|| {
        tokens
            .iter()
            .filter(|t| t.contains('.'))
            .filter_map(|t| t.parse().ok())
            .find(is_rating)
    })
}

/// `published 2008` anywhere in the row
fn published_year(text: &str) -> Option<i32> {
    count_after(text, "published").and_then(|year| i32::try_from(year).ok())
}

/// A four-digit year in parentheses, as in `Title (1965)`
fn year_in_title(title: &str) -> Option<i32> {
    title.match_indices('(').find_map(|(start, _)| {
        let inner = title.as_bytes().get(start + 1..start + 6)?;
        if inner[4] == b')' && inner[..4].iter().all(u8::is_ascii_digit) {
            title[start + 1..start + 5].parse().ok()
        } else {
            None
        }
    })
}
