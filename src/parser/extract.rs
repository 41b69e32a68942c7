use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::clean::{clean, CleanOptions};
use super::paginate::join_url;
use crate::vocab::NAME_SELECTORS;

/// Upper bound on candidates taken from one page.
pub const MAX_CANDIDATES: usize = 500;

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static NAME_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    NAME_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

pub fn element_text(el: &ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered, deduplicated candidate collector with a hard cap.
struct Collector<'a> {
    opts: &'a CleanOptions,
    seen: HashSet<String>,
    out: Vec<String>,
}

impl Collector<'_> {
    fn full(&self) -> bool {
        self.out.len() >= MAX_CANDIDATES
    }

    fn offer(&mut self, raw: &str) {
        if self.full() {
            return;
        }
        if let Some(name) = clean(raw, self.opts) {
            if self.seen.insert(name.clone()) {
                self.out.push(name);
            }
        }
    }
}

/// Pull person-name candidates out of an HTML page.
pub fn extract_names(html: &str, manual_selector: Option<&str>, opts: &CleanOptions) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut col = Collector {
        opts,
        seen: HashSet::new(),
        out: Vec::new(),
    };

    if let Some(sel) = manual_selector.map(str::trim).filter(|s| !s.is_empty()) {
        match Selector::parse(sel) {
            Ok(selector) => {
                for el in doc.select(&selector) {
                    col.offer(&element_text(&el));
                }
            }
            Err(e) => debug!(selector = sel, error = ?e, "manual name selector does not parse"),
        }
    }

    // Tables with a "Name" header: first cell of each row.
    for table in doc.select(&TABLE_SEL) {
        let has_name_header = table
            .select(&TH_SEL)
            .any(|th| element_text(&th).to_lowercase().contains("name"));
        if !has_name_header {
            continue;
        }
        for tr in table.select(&TR_SEL) {
            if let Some(td) = tr.select(&TD_SEL).next() {
                col.offer(&element_text(&td));
            }
        }
    }

    for selector in NAME_SELS.iter() {
        if col.full() {
            break;
        }
        for el in doc.select(selector) {
            col.offer(&element_text(&el));
        }
    }

    col.out
}

fn is_profile_href(href: &str) -> bool {
    let low = href.trim().to_lowercase();
    !low.is_empty()
        && !low.starts_with('#')
        && !low.starts_with("mailto:")
        && !low.starts_with("tel:")
        && !low.starts_with("javascript:")
}

/// Links whose text cleans to a person name, keyed by that name and
/// resolved against `base_url`. The first link for a name wins.
pub fn profile_links(html: &str, base_url: &str, opts: &CleanOptions) -> HashMap<String, String> {
    let doc = Html::parse_document(html);
    let mut links = HashMap::new();
    for a in doc.select(&LINK_SEL) {
        let Some(href) = a.value().attr("href").filter(|h| is_profile_href(h)) else {
            continue;
        };
        let Some(name) = clean(&element_text(&a), opts) else { continue };
        if links.contains_key(&name) {
            continue;
        }
        if let Some(url) = join_url(base_url, href) {
            links.insert(name, url);
        }
    }
    links
}
