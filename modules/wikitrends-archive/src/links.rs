use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

const FALLBACK_ORIGIN: &str = "https://en.wikipedia.org/";

/// An article link is a `/wiki/` path with no namespace (no `:` anywhere),
/// so `File:`, `Category:`, `Special:` and `Help:` pages are skipped.
fn is_article_href(raw: &str) -> bool {
    raw.starts_with("/wiki/") && !raw.contains(':') && raw.len() > "/wiki/".len()
}

/// Extract internal article links from raw HTML.
/// Resolves against the page origin, strips fragments, deduplicates in first-seen order.
pub fn extract_wiki_links(html: &str, page_url: &str) -> Vec<String> {
    wiki_links(&Html::parse_document(html), page_url)
}

pub(crate) fn wiki_links(document: &Html, page_url: &str) -> Vec<String> {
    let base = Url::parse(page_url)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(FALLBACK_ORIGIN).ok());
    let Some(base) = base else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if !is_article_href(href) {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    links
}
