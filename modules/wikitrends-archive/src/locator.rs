use wikitrends_common::{Result, TrendsError};

/// Turn a topic's source locator into a fetchable URL.
///
/// `http(s)://` locators pass through; anything else is an article title,
/// resolved against `wiki_base_url` with spaces as underscores.
pub fn resolve_locator(locator: &str, wiki_base_url: &str) -> Result<String> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(TrendsError::fetch(locator, "empty source locator"));
    }

    if locator.contains("://") {
        let parsed = url::Url::parse(locator)
            .map_err(|e| TrendsError::fetch(locator, format!("invalid URL: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TrendsError::fetch(
                locator,
                format!("only http/https URLs allowed, got: {}", parsed.scheme()),
            ));
        }
        return Ok(parsed.to_string());
    }

    let title = locator
        .replace(' ', "_")
        .replace('%', "%25")
        .replace('?', "%3F")
        .replace('#', "%23");
    let joined = format!("{wiki_base_url}{title}");
    let parsed = url::Url::parse(&joined)
        .map_err(|e| TrendsError::fetch(&joined, format!("invalid URL: {e}")))?;
    Ok(parsed.to_string())
}
