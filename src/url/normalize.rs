use url::Url;

/// Size markers that the list pages append to thumbnail cover URLs
const THUMBNAIL_MARKERS: &[&str] = &["._SX50_", "._SY75_", "._SX98_"];

/// Resolves an `href` found on a list page into a canonical absolute URL
///
/// # Normalization Steps
///
/// 1. Reject empty, fragment-only and non-navigational hrefs
///    (`javascript:`, `mailto:`, `tel:`, `data:`)
/// 2. Resolve relative hrefs against the site base URL
/// 3. Accept only HTTP and HTTPS results
/// 4. Remove the fragment and the query string
///
/// # Arguments
///
/// * `href` - The raw attribute value
/// * `base_url` - The site root used for relative links
///
/// # Returns
///
/// * `Some(Url)` - The canonical URL
/// * `None` - The href does not point at a page
///
/// # Examples
///
/// ```
/// use shelf_scrape::url::canonical_url;
/// use url::Url;
///
/// let base = Url::parse("https://www.goodreads.com").unwrap();
/// let url = canonical_url("/book/show/2767052-the-hunger-games?from_search=true", &base).unwrap();
/// assert_eq!(url.as_str(), "https://www.goodreads.com/book/show/2767052-the-hunger-games");
/// ```
pub fn canonical_url(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    url.set_fragment(None);
    url.set_query(None);
    Some(url)
}

/// Rewrites a thumbnail cover URL so it points at a larger rendition
///
/// The list pages serve tiny thumbnails; dropping the size marker (or
/// bumping a 200px one to 400px) returns the full-size image from the same
/// host.
pub fn upscale_cover_url(cover_url: &str) -> String {
    let mut upscaled = cover_url.to_string();
    for marker in THUMBNAIL_MARKERS {
        upscaled = upscaled.replace(marker, "");
    }

    if upscaled.contains("_SX") {
        upscaled = upscaled.replace("._SX200_", "._SX400_");
    }

    upscaled
}
