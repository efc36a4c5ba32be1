//! URL handling module for Shelf-Scrape
//!
//! This module resolves links found on list pages, derives the stable book
//! identifier from a book URL, and maps cover URLs onto local file names.

mod normalize;

use url::Url;

pub use normalize::{canonical_url, upscale_cover_url};

/// Image extensions accepted for stored covers
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Derives the stable book identifier from a canonical book URL
///
/// Book pages live at `/book/show/<id>-<slug>` or `/book/show/<id>.<slug>`.
/// The numeric `<id>` survives title edits, so it is the identifier when
/// present; otherwise the whole last path segment is used.
///
/// # Examples
///
/// ```
/// use shelf_scrape::url::book_id_from_url;
/// use url::Url;
///
/// let url = Url::parse("https://www.goodreads.com/book/show/2767052-the-hunger-games").unwrap();
/// assert_eq!(book_id_from_url(&url), Some("2767052".to_string()));
/// ```
pub fn book_id_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();

    let numeric: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
    if numeric.is_empty() {
        Some(segment)
    } else {
        Some(numeric)
    }
}

/// Same as [`book_id_from_url`] but starting from a string
pub fn book_id_from_str(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(book_id_from_url)
}

/// Builds the deterministic local file name for a book's cover
///
/// The stem is the book id restricted to `[A-Za-z0-9_-]`; the extension comes
/// from the cover URL path when it is a known image type and defaults to
/// `jpg`. The same inputs always give the same name, which is what makes the
/// on-disk existence check a reliable skip.
pub fn cover_file_name(book_id: &str, cover_url: &str) -> String {
    let stem: String = book_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let extension = Url::parse(cover_url)
        .ok()
        .and_then(|url| {
            let last = url.path_segments()?.last()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            let ext = ext.to_ascii_lowercase();
            COVER_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
        })
        .unwrap_or_else(|| "jpg".to_string());

    format!("{}.{}", stem, extension)
}
