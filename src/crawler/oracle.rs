//! Result page oracle
//!
//! Reads the four signals the partition planner needs from a fetched search
//! result page:
//! - Whether the result set is empty
//! - How many pagination links the page renders
//! - The URL of the next page, if any
//! - The post entries shown on the page
//!
//! The returned [`ResultPage`] owns all of its data, so it can be held
//! across await points and passed between planner and driver.

use crate::SieveError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Markup that only appears on a rendered result list
const RESULT_MARKERS: &[&str] = &[
    "div.card-no-result",
    "div.card-wrap",
    "#pl_feedlist_index",
    "div.m-page",
];

/// Selector for the author block that marks an entry as a real post
const INFO_BLOCK: &str = "div.card > div.card-feed > div.content > div.info";

/// One post entry on a result page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEntry {
    /// The `mid` attribute of the entry, when present
    pub mid: Option<String>,
    /// Outer HTML of the entry's `card-wrap` element
    pub html: String,
}

/// Everything the crawler needs from one result page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPage {
    /// URL the page was fetched from
    pub url: Url,
    empty: bool,
    pagination_links: usize,
    next: Option<Url>,
    entries: Vec<PostEntry>,
}

impl ResultPage {
    /// True when the site reports no results for the query
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Number of entries in the page-jump list
    pub fn pagination_link_count(&self) -> usize {
        self.pagination_links
    }

    /// Absolute URL of the next page
    pub fn next_page_ref(&self) -> Option<&Url> {
        self.next.as_ref()
    }

    pub fn entries(&self) -> &[PostEntry] {
        &self.entries
    }
}

/// Parses a fetched result page
///
/// # Arguments
///
/// * `html` - The page body
/// * `page_url` - The URL the page was served from, used to resolve the next link
///
/// # Returns
///
/// * `Ok(ResultPage)` - The page signals
/// * `Err(SieveError::SessionInvalid)` - The page is not a result list at all,
///   which is what the site serves to a rejected session
pub fn parse_result_page(html: &str, page_url: &Url) -> Result<ResultPage, SieveError> {
    let document = Html::parse_document(html);

    if !RESULT_MARKERS.iter().any(|css| exists(&document, css)) {
        return Err(SieveError::SessionInvalid {
            url: page_url.to_string(),
            reason: "page does not contain a search result list".to_string(),
        });
    }

    let empty = exists(&document, "div.card-no-result");
    let pagination_links = count(&document, "ul.s-scroll > li");
    let next = extract_next(&document, page_url);
    let entries = if empty {
        Vec::new()
    } else {
        extract_entries(&document)
    };

    Ok(ResultPage {
        url: page_url.clone(),
        empty,
        pagination_links,
        next,
        entries,
    })
}

fn exists(document: &Html, css: &str) -> bool {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).next().is_some(),
        Err(_) => false,
    }
}

fn count(document: &Html, css: &str) -> usize {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).count(),
        Err(_) => 0,
    }
}

/// Resolves the `a.next` link against the page URL
fn extract_next(document: &Html, page_url: &Url) -> Option<Url> {
    let selector = Selector::parse("a.next[href]").ok()?;
    let href = document
        .select(&selector)
        .next()?
        .value()
        .attr("href")?
        .trim();

    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }

    match page_url.join(href) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(href = href, error = %e, "Ignoring unparseable next link");
            None
        }
    }
}

/// Collects every `card-wrap` that carries an author block
///
/// Ads and "related search" cards share the `card-wrap` class but have no
/// author block and are skipped.
fn extract_entries(document: &Html) -> Vec<PostEntry> {
    let (Ok(card), Ok(info)) = (Selector::parse("div.card-wrap"), Selector::parse(INFO_BLOCK))
    else {
        return Vec::new();
    };

    document
        .select(&card)
        .filter(|element| has_info_block(element, &info))
        .map(|element| PostEntry {
            mid: element
                .value()
                .attr("mid")
                .map(str::trim)
                .filter(|mid| !mid.is_empty())
                .map(str::to_string),
            html: element.html(),
        })
        .collect()
}

fn has_info_block(element: &ElementRef<'_>, info: &Selector) -> bool {
    element.select(info).next().is_some()
}
