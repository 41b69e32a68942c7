//! Drives a live search box: find the input, submit a term, wait for the
//! rendered results and pull person records out of the best text block.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, ElementHandle};
use crate::error::CrawlError;
use crate::parser::blocks::{self, contains_email, PersonRecord, TextBlock};
use crate::parser::clean::{clean, CleanOptions};
use crate::parser::extract::{extract_names, profile_links};
use crate::strategy::{to_candidates, Candidate};
use crate::vocab::{
    NON_TEXT_INPUT_TYPES, NO_RESULTS_PHRASES, PEOPLE_TAB_THRESHOLD, PEOPLE_TAB_WEIGHTS,
    SEARCH_INPUT_SELECTORS, SUBMIT_SELECTORS, TAB_SELECTORS,
};

/// Elements inspected per tab selector when looking for a people filter.
const TAB_SCAN_LIMIT: usize = 250;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub input_selector: Option<String>,
    pub button_selector: Option<String>,
    pub name_selector: Option<String>,
    pub settle_delay: Duration,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
    pub try_people_tab: bool,
    pub clean: CleanOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Records from the winning block.
    Ok(Vec<PersonRecord>),
    /// The page said there was nothing to show.
    NoResults,
    /// No block ever scored; carries the raw-page extractor candidates instead.
    NoBlock(Vec<Candidate>),
}

#[derive(Debug)]
pub enum TermResult {
    Resolved(SearchOutcome),
    /// The term was abandoned after its retry; the run goes on.
    Skipped(CrawlError),
}

fn opt_selector(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn usable_element(session: &dyn BrowserSession, el: ElementHandle) -> bool {
    session.is_visible(el) && session.is_enabled(el)
}

/// Find a visible, enabled text input to type into.
pub fn locate_input(
    session: &dyn BrowserSession,
    manual: Option<&str>,
) -> Result<ElementHandle, CrawlError> {
    let mut selectors: Vec<&str> = Vec::new();
    if let Some(m) = manual {
        selectors.push(m);
    }
    selectors.extend_from_slice(SEARCH_INPUT_SELECTORS);

    for sel in selectors {
        if let Some(el) = session.find_all(sel)?.into_iter().find(|el| usable_element(session, *el)) {
            debug!(selector = sel, "search input located");
            return Ok(el);
        }
    }

    for el in session.find_all("input")? {
        let kind = session.attr(el, "type")?.unwrap_or_default().to_lowercase();
        if NON_TEXT_INPUT_TYPES.contains(&kind.as_str()) {
            continue;
        }
        if usable_element(session, el) {
            debug!("falling back to first generic input");
            return Ok(el);
        }
    }
    Err(CrawlError::SearchInputNotFound("no visible text input".into()))
}

fn click_submit(session: &dyn BrowserSession, manual: Option<&str>) -> bool {
    let mut selectors: Vec<&str> = Vec::new();
    if let Some(m) = manual {
        selectors.push(m);
    }
    selectors.extend_from_slice(SUBMIT_SELECTORS);

    for sel in selectors {
        let Ok(found) = session.find_all(sel) else { continue };
        for el in found {
            if usable_element(session, el) && session.click(el).is_ok() {
                return true;
            }
        }
    }
    false
}

/// Clear the input, type `term` and submit it: Enter, then a submit control, then the form itself.
pub fn submit_query(
    session: &dyn BrowserSession,
    input: ElementHandle,
    term: &str,
    manual_button: Option<&str>,
) -> Result<(), CrawlError> {
    let _ = session.scroll_into_view(input);
    let _ = session.click(input);
    if let Err(e) = session.clear(input) {
        debug!(error = %e, "clearing search input failed");
    }
    session
        .type_text(input, term)
        .map_err(|e| CrawlError::SubmitFailed(format!("{term}: {e}")))?;

    if session.press_enter(input).is_ok() {
        return Ok(());
    }
    if click_submit(session, manual_button) {
        return Ok(());
    }
    session
        .submit_form(input)
        .map_err(|e| CrawlError::SubmitFailed(format!("{term}: {e}")))
}

fn tab_score(label: &str) -> u32 {
    let low = label.to_lowercase();
    PEOPLE_TAB_WEIGHTS
        .iter()
        .filter(|(word, _)| low.contains(word))
        .map(|(_, w)| *w)
        .max()
        .unwrap_or(0)
}

/// Best-effort click on a "People"/"Directory" style tab. Returns the label clicked.
pub fn click_people_tab(session: &dyn BrowserSession) -> Option<String> {
    let mut best: Option<(u32, ElementHandle, String)> = None;
    for sel in TAB_SELECTORS {
        let Ok(found) = session.find_all(sel) else { continue };
        for el in found.into_iter().take(TAB_SCAN_LIMIT) {
            let text = session.text(el).unwrap_or_default();
            let label = match text.trim() {
                "" => session.attr(el, "aria-label").ok().flatten().unwrap_or_default(),
                t => t.to_string(),
            };
            let label = label.trim().to_string();
            if label.is_empty() {
                continue;
            }
            let score = tab_score(&label);
            if score > best.as_ref().map_or(0, |b| b.0) && session.is_visible(el) {
                best = Some((score, el, label));
            }
        }
    }

    let (score, el, label) = best?;
    if score < PEOPLE_TAB_THRESHOLD {
        return None;
    }
    let _ = session.scroll_into_view(el);
    match session.click(el) {
        Ok(()) => {
            info!(tab = %label, "clicked people tab");
            Some(label)
        }
        Err(e) => {
            debug!(tab = %label, error = %e, "people tab click failed");
            None
        }
    }
}

/// Fill in profile URLs from the rendered page's anchors. Records stay as
/// they are when the page source cannot be read.
fn with_profile_links(
    session: &dyn BrowserSession,
    settings: &SearchSettings,
    mut records: Vec<PersonRecord>,
) -> Vec<PersonRecord> {
    if records.is_empty() {
        return records;
    }
    let html = match session.page_html() {
        Ok(h) => h,
        Err(e) => {
            debug!(error = %e, "page source unavailable, no profile links");
            return records;
        }
    };
    let links = profile_links(&html, &session.current_url(), &settings.clean);
    for rec in &mut records {
        let key = clean(&rec.name, &settings.clean).unwrap_or_else(|| rec.name.trim().to_string());
        rec.url = links.get(&key).cloned();
    }
    records
}

pub fn has_no_results_signal(text: &str) -> bool {
    let low = text.to_lowercase();
    NO_RESULTS_PHRASES.iter().any(|p| low.contains(p))
}

/// Poll the rendered text until a usable people block shows up, the page
/// reports no results, or the timeout passes.
pub fn poll_results(
    session: &dyn BrowserSession,
    settings: &SearchSettings,
) -> Result<SearchOutcome, CrawlError> {
    let deadline = Instant::now() + settings.poll_timeout;
    let mut best: Option<TextBlock> = None;

    loop {
        let text = session.body_text()?;
        // An email anywhere contradicts the empty-result message.
        if has_no_results_signal(&text) && !contains_email(&text) {
            return Ok(SearchOutcome::NoResults);
        }
        if let Some(block) = blocks::best_block(&text) {
            if blocks::is_usable(&block) {
                debug!(title = %block.title, score = block.score, "usable block");
                let people = blocks::extract_people(&block);
                return Ok(SearchOutcome::Ok(with_profile_links(session, settings, people)));
            }
            if best.as_ref().map_or(true, |b| block.score > b.score) {
                best = Some(block);
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(settings.poll_interval);
    }

    match best {
        Some(block) => {
            let people = blocks::extract_people(&block);
            Ok(SearchOutcome::Ok(with_profile_links(session, settings, people)))
        }
        None => {
            let html = session.page_html()?;
            let names = extract_names(&html, opt_selector(&settings.name_selector), &settings.clean);
            let links = profile_links(&html, &session.current_url(), &settings.clean);
            Ok(SearchOutcome::NoBlock(to_candidates(names, &links)))
        }
    }
}

/// Person records become match candidates. Records the cleaner rejects are
/// still kept verbatim when they have two to seven tokens.
pub fn person_candidates(records: &[PersonRecord], opts: &CleanOptions) -> Vec<Candidate> {
    records
        .iter()
        .filter_map(|rec| {
            let name = clean(&rec.name, opts).or_else(|| {
                let tokens = rec.name.split_whitespace().count();
                (2..=7).contains(&tokens).then(|| rec.name.trim().to_string())
            })?;
            Some(Candidate {
                name,
                email: rec.email.clone(),
                description: rec.description.clone(),
                url: rec.url.clone(),
            })
        })
        .collect()
}

/// Per-run search state. The session is passed in on every call so the
/// owner can keep it alongside this controller.
pub struct SearchController {
    start_url: String,
    settings: SearchSettings,
    input_seen: bool,
}

impl SearchController {
    pub fn new(start_url: impl Into<String>, settings: SearchSettings) -> Self {
        SearchController {
            start_url: start_url.into(),
            settings,
            input_seen: false,
        }
    }

    pub fn open(&self, session: &dyn BrowserSession) -> Result<(), CrawlError> {
        session.navigate(&self.start_url)?;
        session.wait_ready(self.settings.ready_timeout)
    }

    fn attempt(&mut self, session: &dyn BrowserSession, term: &str) -> Result<(), CrawlError> {
        let input = locate_input(session, opt_selector(&self.settings.input_selector))?;
        self.input_seen = true;
        submit_query(session, input, term, opt_selector(&self.settings.button_selector))
    }

    /// Run one query term. `Err` means the whole run must stop.
    pub fn search(
        &mut self,
        session: &dyn BrowserSession,
        term: &str,
    ) -> Result<TermResult, CrawlError> {
        if let Err(first) = self.attempt(session, term) {
            warn!(term = %term, error = %first, "search attempt failed, reloading start page");
            if let Err(e) = self.open(session) {
                return Ok(TermResult::Skipped(e));
            }
            if let Err(second) = self.attempt(session, term) {
                if matches!(second, CrawlError::SearchInputNotFound(_)) && !self.input_seen {
                    return Err(CrawlError::SearchInputNotFound(self.start_url.clone()));
                }
                return Ok(TermResult::Skipped(second));
            }
        }

        std::thread::sleep(self.settings.settle_delay);
        if self.settings.try_people_tab {
            click_people_tab(session);
        }

        match poll_results(session, &self.settings) {
            Ok(outcome) => Ok(TermResult::Resolved(outcome)),
            Err(e) => Ok(TermResult::Skipped(e)),
        }
    }
}
