use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::paginate::{join_url, merge_query};
use crate::request::{Method, RequestDescriptor};
use crate::vocab::{SEARCH_ACTION_HINTS, SEARCH_PARAM_NAMES};

static FORM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input").unwrap());

/// A search form found on the start page, reusable for every query term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    pub method: Method,
    pub action_url: String,
    pub input_name: String,
    /// Hidden and submit fields sent along with every query.
    pub fixed_fields: BTreeMap<String, String>,
}

impl SearchForm {
    pub fn request_for(&self, term: &str) -> Option<RequestDescriptor> {
        let mut fields = self.fixed_fields.clone();
        fields.insert(self.input_name.clone(), term.to_string());
        match self.method {
            Method::Get => merge_query(&self.action_url, &fields).map(RequestDescriptor::get),
            Method::Post => Some(RequestDescriptor::post(self.action_url.clone(), fields)),
        }
    }
}

fn input_type(input: &ElementRef) -> String {
    input.value().attr("type").unwrap_or("").trim().to_lowercase()
}

/// Inputs a user would type a query into.
fn text_inputs<'a>(form: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    form.select(&INPUT_SEL)
        .filter(|i| {
            let t = input_type(i);
            t == "text" || t == "search" || (t.is_empty() && i.value().attr("name").is_some())
        })
        .collect()
}

fn is_preferred_name(name: &str) -> bool {
    SEARCH_PARAM_NAMES.contains(&name.to_lowercase().as_str())
}

fn score_form(form: &ElementRef) -> u32 {
    let mut score = 0;
    let action = form.value().attr("action").unwrap_or("").to_lowercase();
    if SEARCH_ACTION_HINTS.iter().any(|h| action.contains(h)) {
        score += 3;
    }
    let method = form.value().attr("method").unwrap_or("get").trim().to_lowercase();
    if method == "get" || method == "post" {
        score += 1;
    }

    let texts = text_inputs(form);
    if !texts.is_empty() {
        score += 3;
    }
    if texts.len() == 1 {
        score += 2;
    }
    score += 2 * texts
        .iter()
        .filter(|i| i.value().attr("name").is_some_and(is_preferred_name))
        .count() as u32;
    score
}

/// Pick the form most likely to be the site's people search.
pub fn detect_search_form(html: &str, base_url: &str) -> Option<SearchForm> {
    let doc = Html::parse_document(html);
    let mut best: Option<(u32, ElementRef)> = None;
    for form in doc.select(&FORM_SEL) {
        let s = score_form(&form);
        if best.as_ref().map_or(true, |(b, _)| s > *b) {
            best = Some((s, form));
        }
    }
    let (score, form) = best?;
    if score <= 2 {
        return None;
    }

    let action = form.value().attr("action").unwrap_or(base_url);
    let action_url = join_url(base_url, action)?;
    let method = Method::from_attr(form.value().attr("method"));

    let named: Vec<String> = text_inputs(&form)
        .iter()
        .filter_map(|i| i.value().attr("name"))
        .map(str::to_string)
        .collect();
    let input_name = SEARCH_PARAM_NAMES
        .iter()
        .find_map(|p| named.iter().find(|n| n.to_lowercase() == *p))
        .or_else(|| named.first())?
        .clone();

    let mut fixed_fields = BTreeMap::new();
    for input in form.select(&INPUT_SEL) {
        let t = input_type(&input);
        if let Some(name) = input.value().attr("name") {
            if t == "hidden" || t == "submit" {
                fixed_fields.insert(name.to_string(), input.value().attr("value").unwrap_or("").to_string());
            }
        }
    }

    Some(SearchForm {
        method,
        action_url,
        input_name,
        fixed_fields,
    })
}

/// Start URL variants with the term set on each candidate query parameter.
pub fn url_param_candidates(start_url: &str, term: &str, forced_param: Option<&str>) -> Vec<String> {
    let params: Vec<&str> = match forced_param.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => vec![p],
        None => SEARCH_PARAM_NAMES.to_vec(),
    };
    if Url::parse(start_url).is_err() {
        return Vec::new();
    }
    params
        .into_iter()
        .filter_map(|p| {
            let mut fields = BTreeMap::new();
            fields.insert(p.to_string(), term.to_string());
            merge_query(start_url, &fields)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.example.edu/about";

    #[test]
    fn picks_people_search_over_newsletter() {
        let html = r#"
            <form action="/newsletter" method="post">
                <input type="email" name="email"><input type="submit" value="Join">
            </form>
            <form action="/directory/search" method="get">
                <input type="hidden" name="scope" value="people">
                <input type="text" name="q">
                <input type="submit" name="go" value="Search">
            </form>"#;
        let form = detect_search_form(html, BASE).unwrap();
        assert_eq!(form.method, Method::Get);
        assert_eq!(form.action_url, "https://www.example.edu/directory/search");
        assert_eq!(form.input_name, "q");
        assert_eq!(form.fixed_fields.get("scope").map(String::as_str), Some("people"));
        assert_eq!(form.fixed_fields.get("go").map(String::as_str), Some("Search"));

        let req = form.request_for("Santos").unwrap();
        assert_eq!(
            req.url,
            "https://www.example.edu/directory/search?go=Search&q=Santos&scope=people"
        );
    }

    #[test]
    fn post_form_sends_body() {
        let html = r#"<form method="POST" action="lookup.aspx">
            <input type="hidden" name="__VIEWSTATE" value="v1">
            <input name="txtLastName">
        </form>"#;
        let form = detect_search_form(html, BASE).unwrap();
        assert_eq!(form.input_name, "txtLastName");
        let req = form.request_for("Silva").unwrap();
        assert_eq!(req.method, Method::Post);
        let body = req.body.unwrap();
        assert_eq!(body.get("txtLastName").map(String::as_str), Some("Silva"));
        assert_eq!(body.get("__VIEWSTATE").map(String::as_str), Some("v1"));
    }

    #[test]
    fn weak_forms_are_rejected() {
        let html = r#"<form method="dialog"><input type="checkbox" name="x"></form>"#;
        assert!(detect_search_form(html, BASE).is_none());
        assert!(detect_search_form("<p>no forms</p>", BASE).is_none());
    }

    #[test]
    fn url_param_variants() {
        let all = url_param_candidates("https://x.edu/people?dept=bio", "Costa", None);
        assert_eq!(all.len(), SEARCH_PARAM_NAMES.len());
        assert_eq!(all[0], "https://x.edu/people?dept=bio&q=Costa");
        let forced = url_param_candidates("https://x.edu/people", "Costa", Some("lname"));
        assert_eq!(forced, vec!["https://x.edu/people?lname=Costa"]);
    }
}
