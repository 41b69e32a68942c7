use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::extract::element_text;
use crate::request::{Method, RequestDescriptor};
use crate::vocab::{NEXT_TEXTS, PAGE_PARAMS};

static BASE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("base[href]").unwrap());
static REL_NEXT_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[rel~='next'][href], link[rel~='next'][href]").unwrap()
});
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static CONTROL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("button, input").unwrap());
static FORM_INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input[name]").unwrap());

fn is_next_label(s: &str) -> bool {
    let low = s.trim().to_lowercase();
    NEXT_TEXTS.contains(&low.as_str())
}

/// Looser test for buttons, whose labels are rarely anything but navigation.
fn looks_like_next(s: &str) -> bool {
    let low = s.trim().to_lowercase();
    is_next_label(&low) || low.contains("next") || low.contains("more")
}

/// Resolve `href` against `base`, dropping the fragment.
pub fn join_url(base: &str, href: &str) -> Option<String> {
    let mut url = Url::parse(base).ok()?.join(href.trim()).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Set `fields` on the URL's query string; existing keys keep their position,
/// new ones are appended.
pub fn merge_query(url: &str, fields: &BTreeMap<String, String>) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    for (k, v) in fields {
        match pairs.iter_mut().find(|(pk, _)| pk == k) {
            Some(slot) => slot.1 = v.clone(),
            None => pairs.push((k.clone(), v.clone())),
        }
    }
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Some(parsed.to_string())
}

fn enclosing_form<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "form")
}

/// Build the request a button/input would send by submitting its form.
pub fn form_request(el: &ElementRef, base_url: &str) -> Option<RequestDescriptor> {
    let name = el.value().name();
    if name != "button" && name != "input" {
        return None;
    }
    let form = enclosing_form(el)?;

    let method = Method::from_attr(form.value().attr("method"));
    let action = form.value().attr("action").unwrap_or(base_url);
    let url = join_url(base_url, action)?;

    let mut body = BTreeMap::new();
    for input in form.select(&FORM_INPUT_SEL) {
        if let Some(n) = input.value().attr("name") {
            body.insert(n.to_string(), input.value().attr("value").unwrap_or("").to_string());
        }
    }
    if let Some(n) = el.value().attr("name") {
        body.insert(n.to_string(), el.value().attr("value").unwrap_or("").to_string());
    }

    match method {
        Method::Get => merge_query(&url, &body).map(RequestDescriptor::get),
        Method::Post => Some(RequestDescriptor::post(url, body)),
    }
}

fn link_or_form(el: &ElementRef, base_url: &str) -> Option<RequestDescriptor> {
    match el.value().name() {
        "a" | "link" => el
            .value()
            .attr("href")
            .and_then(|href| join_url(base_url, href))
            .map(RequestDescriptor::get),
        "button" | "input" => form_request(el, base_url),
        _ => None,
    }
}

fn bump_page_param(current_url: &str) -> Option<RequestDescriptor> {
    let mut parsed = Url::parse(current_url).ok()?;
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let slot = pairs
        .iter_mut()
        .find(|(k, v)| PAGE_PARAMS.contains(&k.as_str()) && v.parse::<u64>().is_ok())?;
    let n: u64 = slot.1.parse().ok()?;
    slot.1 = n.checked_add(1)?.to_string();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    Some(RequestDescriptor::get(parsed.to_string()))
}

/// Work out the request for the page after this one, or `None` when the
/// directory has no visible way forward.
pub fn resolve_next(
    html: &str,
    current_url: &str,
    manual_selector: Option<&str>,
) -> Option<RequestDescriptor> {
    let doc = Html::parse_document(html);
    let base_url = doc
        .select(&BASE_SEL)
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| join_url(current_url, href))
        .unwrap_or_else(|| current_url.to_string());

    if let Some(sel) = manual_selector.map(str::trim).filter(|s| !s.is_empty()) {
        match Selector::parse(sel) {
            Ok(selector) => {
                if let Some(req) = doc.select(&selector).next().and_then(|el| link_or_form(&el, &base_url)) {
                    return Some(req);
                }
            }
            Err(e) => debug!(selector = sel, error = ?e, "manual next selector does not parse"),
        }
    }

    if let Some(req) = doc.select(&REL_NEXT_SEL).find_map(|el| link_or_form(&el, &base_url)) {
        return Some(req);
    }

    for a in doc.select(&LINK_SEL) {
        let text = element_text(&a);
        let aria = a.value().attr("aria-label").unwrap_or("");
        let hit = is_next_label(&text)
            || is_next_label(aria)
            || text.to_lowercase().contains("next")
            || aria.to_lowercase().contains("next");
        if hit {
            if let Some(req) = link_or_form(&a, &base_url) {
                return Some(req);
            }
        }
    }

    for ctl in doc.select(&CONTROL_SEL) {
        let v = ctl.value();
        let label = if v.name() == "button" {
            element_text(&ctl)
        } else {
            v.attr("value").unwrap_or("").to_string()
        };
        let aria = v.attr("aria-label").unwrap_or("");
        if looks_like_next(&label) || looks_like_next(aria) {
            if let Some(req) = form_request(&ctl, &base_url) {
                return Some(req);
            }
        }
    }

    bump_page_param(current_url)
}
