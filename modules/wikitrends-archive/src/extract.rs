// MediaWiki article HTML -> PagePayload.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use wikitrends_common::{content_hash, PagePayload};

use crate::links::wiki_links;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static FIRST_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1#firstHeading"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static CONTENT: LazyLock<Selector> = LazyLock::new(|| selector("#mw-content-text"));
static CATEGORY_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"#mw-normal-catlinks a[href^="/wiki/Category:"]"#));
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script"));

// wgRevisionId lives in the page's inline JS config, not in the markup.
static REVISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""wgRevisionId"\s*:\s*(\d+)"#).expect("valid regex"));

/// Subtrees never part of the article text.
const SKIPPED_TAGS: [&str; 5] = ["script", "style", "sup", "noscript", "template"];
const SKIPPED_CLASSES: [&str; 4] = ["mw-editsection", "infobox", "printfooter", "catlinks"];

const BLOCK_TAGS: [&str; 22] = [
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "th", "td",
    "table", "dl", "dd", "dt", "blockquote", "pre", "figcaption",
];

/// Build the raw payload for a fetched article.
pub fn parse_page(html: &str, url: &str, http_status: u16) -> PagePayload {
    let document = Html::parse_document(html);
    let content = extract_content(&document);
    PagePayload {
        title: extract_title(&document),
        url: url.to_string(),
        content_length: content.chars().count(),
        content_hash: content_hash(&content),
        categories: extract_categories(&document),
        links: wiki_links(&document, url),
        revision_id: extract_revision_id(&document),
        http_status,
        content,
    }
}

/// `<h1 id="firstHeading">`, then `<title>`, then "Unknown".
pub fn extract_title(document: &Html) -> String {
    [&*FIRST_HEADING, &*TITLE]
        .into_iter()
        .filter_map(|sel| document.select(sel).next())
        .map(inline_text)
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn extract_revision_id(document: &Html) -> Option<u64> {
    document.select(&SCRIPT).find_map(|script| {
        let js: String = script.text().collect();
        REVISION_RE
            .captures(&js)
            .and_then(|cap| cap[1].parse().ok())
    })
}

/// Plain text of `#mw-content-text`: one trimmed line per block, blank lines
/// dropped. Citations, edit links, infoboxes, scripts and styles are skipped.
pub fn extract_content(document: &Html) -> String {
    let Some(root) = document.select(&CONTENT).next() else {
        return String::new();
    };
    let mut text = String::new();
    collect_text(root, &mut text);

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_skipped(element: &ElementRef) -> bool {
    let el = element.value();
    SKIPPED_TAGS.contains(&el.name())
        || el.id() == Some("catlinks")
        || el.classes().any(|class| SKIPPED_CLASSES.contains(&class))
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            // Source newlines are layout, not structure.
            Node::Text(text) => out.extend(text.chars().map(|c| {
                if c.is_whitespace() {
                    ' '
                } else {
                    c
                }
            })),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_skipped(&child) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                collect_text(child, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Category names from the normal category box.
pub fn extract_categories(document: &Html) -> Vec<String> {
    document
        .select(&CATEGORY_LINKS)
        .map(inline_text)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Whitespace-collapsed text of an element. `&nbsp;` counts as whitespace.
fn inline_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    const ARTICLE: &str = r##"<!DOCTYPE html>
<html><head><title>Rust (programming language) - Wikipedia</title>
<script>RLCONF={"wgRevisionId":1187654321,"wgArticleId":29414838};</script>
</head><body>
<h1 id="firstHeading" class="firstHeading"><span class="mw-page-title-main">Rust (programming language)</span></h1>
<div id="mw-content-text" class="mw-body-content"><div class="mw-parser-output">
<table class="infobox vevent"><tr><td>Paradigms</td><td>Multi-paradigm</td></tr></table>
<p><b>Rust</b> is a general-purpose programming language<sup id="cite_ref-1" class="reference"><a href="#cite_note-1">[1]</a></sup> emphasizing
<a href="/wiki/Memory_safety" title="Memory safety">memory safety</a>.</p>
<h2 id="History">History<span class="mw-editsection"><span class="mw-editsection-bracket">[</span><a href="/w/index.php?title=Rust&amp;action=edit&amp;section=1">edit</a><span class="mw-editsection-bracket">]</span></span></h2>
<p>Started at <a href="/wiki/Mozilla">Mozilla</a> &amp; friends&#160;in 2006.</p>
<style>.mw-parser-output .x{color:red}</style>
</div></div>
<div id="catlinks" class="catlinks"><div id="mw-normal-catlinks" class="mw-normal-catlinks"><a href="/wiki/Help:Category" title="Help:Category">Categories</a>: <ul><li><a href="/wiki/Category:Programming_languages" title="Category:Programming languages">Programming languages</a></li><li><a href="/wiki/Category:Mozilla" title="Category:Mozilla">Mozilla</a></li></ul></div></div>
</body></html>"##;

    #[test]
    fn title_comes_from_first_heading() {
        assert_eq!(extract_title(&doc(ARTICLE)), "Rust (programming language)");
    }

    #[test]
    fn title_falls_back_to_title_tag_then_unknown() {
        assert_eq!(extract_title(&doc("<title>Only Title</title>")), "Only Title");
        assert_eq!(extract_title(&doc("<p>nothing</p>")), "Unknown");
    }

    #[test]
    fn content_drops_citations_infobox_edit_links_and_styles() {
        let content = extract_content(&doc(ARTICLE));
        assert!(content.contains("Rust is a general-purpose programming language emphasizing memory safety."));
        assert!(content.contains("History"));
        assert!(!content.contains("[1]"), "citation markers should be removed: {content}");
        assert!(!content.contains("edit"), "edit section links should be removed: {content}");
        assert!(!content.contains("Paradigms"), "infobox should be removed: {content}");
        assert!(!content.contains("color:red"), "styles should be removed: {content}");
        assert!(!content.contains("Programming languages"), "category box is outside content");
    }

    #[test]
    fn nested_tables_inside_an_infobox_stay_out_of_the_content() {
        let html = r#"<div id="mw-content-text">
            <table class="infobox"><tr><td>Developer</td><td>
                <table><tr><td>Inner</td></tr></table>
            </td></tr><tr><td>InfoboxLeakedValue</td></tr></table>
            <p>Body text.</p>
        </div>"#;
        assert_eq!(extract_content(&doc(html)), "Body text.");
    }

    #[test]
    fn content_decodes_named_and_numeric_entities() {
        let content = extract_content(&doc(ARTICLE));
        assert!(content.contains("Started at Mozilla & friends in 2006."), "got: {content}");

        let html = r#"<div id="mw-content-text"><p>Caf&eacute; &hellip; &copy; &#x263A; &amp;lt;</p></div>"#;
        assert_eq!(extract_content(&doc(html)), "Café … © ☺ &lt;");
    }

    #[test]
    fn content_lines_are_trimmed_and_non_empty() {
        let content = extract_content(&doc(ARTICLE));
        assert!(content.lines().all(|l| !l.is_empty() && l == l.trim()));
        assert_eq!(content.lines().next(), Some("Rust is a general-purpose programming language emphasizing memory safety."));
    }

    #[test]
    fn missing_content_region_yields_empty_text() {
        assert_eq!(extract_content(&doc("<html><body><p>Hi</p></body></html>")), "");
    }

    #[test]
    fn print_footer_inside_content_is_skipped() {
        let html = r#"<div id="mw-content-text"><p>Body.</p>
            <div class="printfooter">Retrieved from somewhere</div></div>"#;
        assert_eq!(extract_content(&doc(html)), "Body.");
    }

    #[test]
    fn categories_skip_the_help_link() {
        assert_eq!(
            extract_categories(&doc(ARTICLE)),
            vec!["Programming languages", "Mozilla"]
        );
    }

    #[test]
    fn revision_id_is_read_from_page_config() {
        assert_eq!(extract_revision_id(&doc(ARTICLE)), Some(1187654321));
        assert_eq!(extract_revision_id(&doc("<html></html>")), None);
        // Only script bodies count.
        assert_eq!(
            extract_revision_id(&doc(r#"<p>"wgRevisionId":5</p>"#)),
            None
        );
    }

    #[test]
    fn parse_page_fills_every_field() {
        let url = "https://en.wikipedia.org/wiki/Rust_(programming_language)";
        let payload = parse_page(ARTICLE, url, 200);
        assert_eq!(payload.title, "Rust (programming language)");
        assert_eq!(payload.url, url);
        assert_eq!(payload.http_status, 200);
        assert_eq!(payload.content_length, payload.content.chars().count());
        assert_eq!(payload.content_hash, content_hash(&payload.content));
        assert_eq!(payload.revision_id, Some(1187654321));
        assert_eq!(payload.categories.len(), 2);
        assert_eq!(
            payload.links,
            vec![
                "https://en.wikipedia.org/wiki/Memory_safety",
                "https://en.wikipedia.org/wiki/Mozilla",
            ]
        );
    }
}
