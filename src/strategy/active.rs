use std::time::Duration;

use tracing::{debug, info, warn};

use super::{to_candidates, Batch, Candidate, Next, SearchEngine, StepOutcome, StopReason, Strategy, StrategyKind};
use crate::browser::{BrowserSession, SessionFactory};
use crate::error::CrawlError;
use crate::fetch::{FetchedPage, Fetcher};
use crate::parser::extract::{extract_names, profile_links};
use crate::parser::paginate::resolve_next;
use crate::parser::search_form::{detect_search_form, url_param_candidates, SearchForm};
use crate::request::RequestDescriptor;
use crate::runner::RunState;
use crate::search::{person_candidates, SearchController, SearchOutcome, SearchSettings, TermResult};

/// Result pages followed per term by the request engines, after the first.
const EXTRA_RESULT_PAGES: usize = 2;
/// A url-param response shorter than this is an error page, not results.
const MIN_RESULT_BYTES: usize = 300;

enum FormState {
    Unknown,
    Found(SearchForm),
    Absent,
}

enum BrowserSlot {
    Idle(Box<dyn SessionFactory>),
    Open(Box<dyn BrowserSession>),
    Unavailable,
}

pub struct ActiveOptions {
    pub engine: SearchEngine,
    pub search_param: Option<String>,
    pub next_selector: Option<String>,
    /// Pause between the extra result-page requests of one term.
    pub page_delay: Duration,
    pub search: SearchSettings,
}

/// One query per surname, most common first.
pub struct ActiveStrategy {
    start_url: String,
    terms: Vec<String>,
    cursor: usize,
    opts: ActiveOptions,
    fetcher: Box<dyn Fetcher>,
    form: FormState,
    browser: BrowserSlot,
    controller: SearchController,
}

impl ActiveStrategy {
    pub fn new(
        start_url: &str,
        terms: Vec<String>,
        fetcher: Box<dyn Fetcher>,
        browser: Box<dyn SessionFactory>,
        opts: ActiveOptions,
    ) -> Self {
        let controller = SearchController::new(start_url, opts.search.clone());
        ActiveStrategy {
            start_url: start_url.to_string(),
            terms,
            cursor: 0,
            opts,
            fetcher,
            form: FormState::Unknown,
            browser: BrowserSlot::Idle(browser),
            controller,
        }
    }

    fn name_selector(&self) -> Option<&str> {
        self.opts.search.name_selector.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Names from a result page plus up to two follow-up pages. Every page
    /// fetched here counts towards the run's visited URLs.
    fn harvest(&self, first: FetchedPage, first_req: &RequestDescriptor, state: &mut RunState) -> Vec<Candidate> {
        state.visited_fingerprints.insert(first_req.fingerprint());
        state.visited_urls.insert(first.url.clone());
        let clean = &self.opts.search.clean;
        let next_sel = self.opts.next_selector.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let mut names = extract_names(&first.body, self.name_selector(), clean);
        let mut links = profile_links(&first.body, &first.url, clean);
        let mut page = first;
        for _ in 0..EXTRA_RESULT_PAGES {
            let Some(next) = resolve_next(&page.body, &page.url, next_sel) else { break };
            if !state.visited_fingerprints.insert(next.fingerprint()) {
                break;
            }
            std::thread::sleep(self.opts.page_delay);
            match self.fetcher.fetch(&next) {
                Ok(p) => {
                    state.visited_urls.insert(p.url.clone());
                    names.extend(extract_names(&p.body, self.name_selector(), clean));
                    for (name, url) in profile_links(&p.body, &p.url, clean) {
                        links.entry(name).or_insert(url);
                    }
                    page = p;
                }
                Err(e) => {
                    debug!(request = %next, error = %e, "result page fetch failed");
                    break;
                }
            }
        }
        to_candidates(names, &links)
    }

    fn form_search(&mut self, term: &str, state: &mut RunState) -> Option<Vec<Candidate>> {
        if matches!(self.form, FormState::Unknown) {
            let start = RequestDescriptor::get(self.start_url.as_str());
            self.form = match self.fetcher.fetch(&start) {
                Ok(page) => match detect_search_form(&page.body, &self.start_url) {
                    Some(f) => {
                        info!(action = %f.action_url, method = %f.method, input = %f.input_name, "search form detected");
                        FormState::Found(f)
                    }
                    None => FormState::Absent,
                },
                Err(e) => {
                    warn!(error = %e, "start page fetch failed, no form search");
                    FormState::Absent
                }
            };
        }
        let FormState::Found(form) = &self.form else { return None };
        let req = form.request_for(term)?;
        match self.fetcher.fetch(&req) {
            Ok(page) => Some(self.harvest(page, &req, state)),
            Err(e) => {
                debug!(term = %term, error = %e, "form search failed");
                None
            }
        }
    }

    fn url_param_search(&self, term: &str, state: &mut RunState) -> Option<Vec<Candidate>> {
        for url in url_param_candidates(&self.start_url, term, self.opts.search_param.as_deref()) {
            let req = RequestDescriptor::get(url);
            match self.fetcher.fetch(&req) {
                Ok(page) if page.body.len() > MIN_RESULT_BYTES => {
                    return Some(self.harvest(page, &req, state));
                }
                Ok(_) => debug!(url = %req.url, "response too short"),
                Err(e) => debug!(url = %req.url, error = %e, "url-param search failed"),
            }
        }
        None
    }

    fn ensure_browser(&mut self) -> Result<(), CrawlError> {
        // A failed start leaves the slot Unavailable so it is attempted once.
        self.browser = match std::mem::replace(&mut self.browser, BrowserSlot::Unavailable) {
            BrowserSlot::Idle(factory) => {
                let session = factory.open()?;
                self.controller
                    .open(session.as_ref())
                    .map_err(|e| CrawlError::SessionStart(format!("opening start page: {e}")))?;
                info!("browser session ready");
                BrowserSlot::Open(session)
            }
            other => other,
        };
        Ok(())
    }

    fn browser_search(&mut self, term: &str, state: &mut RunState) -> Result<Vec<Candidate>, CrawlError> {
        self.ensure_browser()?;
        let BrowserSlot::Open(session) = &self.browser else {
            return Ok(Vec::new());
        };
        let result = self.controller.search(session.as_ref(), term)?;
        let landed = session.current_url();
        if !landed.is_empty() {
            state.visited_urls.insert(landed);
        }
        Ok(match result {
            TermResult::Resolved(SearchOutcome::Ok(records)) => {
                person_candidates(&records, &self.opts.search.clean)
            }
            TermResult::Resolved(SearchOutcome::NoResults) => {
                debug!(term = %term, "no results");
                Vec::new()
            }
            TermResult::Resolved(SearchOutcome::NoBlock(found)) => {
                debug!(term = %term, names = found.len(), "no people block, raw page fallback");
                found
            }
            TermResult::Skipped(e) => {
                warn!(term = %term, error = %e, "term skipped");
                Vec::new()
            }
        })
    }

    fn search_term(&mut self, term: &str, state: &mut RunState) -> Result<Vec<Candidate>, CrawlError> {
        match self.opts.engine {
            SearchEngine::Form => Ok(self.form_search(term, state).unwrap_or_default()),
            SearchEngine::UrlParam => Ok(self.url_param_search(term, state).unwrap_or_default()),
            SearchEngine::Browser => self.browser_search(term, state),
            SearchEngine::Auto => {
                if let Some(found) = self.form_search(term, state) {
                    return Ok(found);
                }
                if let Some(found) = self.url_param_search(term, state) {
                    return Ok(found);
                }
                match self.browser_search(term, state) {
                    Err(CrawlError::SessionStart(e)) => {
                        warn!(error = %e, "browser unavailable, continuing with request engines only");
                        Ok(Vec::new())
                    }
                    other => other,
                }
            }
        }
    }
}

impl Strategy for ActiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Active
    }

    fn planned_steps(&self) -> u64 {
        self.terms.len() as u64
    }

    fn run_step(&mut self, state: &mut RunState) -> Result<StepOutcome, CrawlError> {
        let Some(term) = self.terms.get(self.cursor).cloned() else {
            return Ok(StepOutcome::stop(StopReason::Completed));
        };
        self.cursor += 1;

        let candidates = self.search_term(&term, state)?;
        debug!(term = %term, candidates = candidates.len(), "term searched");
        let next = if self.cursor >= self.terms.len() {
            Next::Stop(StopReason::Completed)
        } else {
            Next::Continue
        };
        Ok(StepOutcome {
            batch: Some(Batch {
                source: format!("Search: {term}"),
                candidates,
            }),
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::fetch::tests::FakeFetcher;
    use crate::search::tests::{settings, visible, FakeBrowser};

    const START: &str = "https://dir.example.edu/people";

    struct OneShot(RefCell<Option<FakeBrowser>>);

    impl SessionFactory for OneShot {
        fn open(&self) -> Result<Box<dyn BrowserSession>, CrawlError> {
            match self.0.borrow_mut().take() {
                Some(b) => Ok(Box::new(b)),
                None => Err(CrawlError::SessionStart("chrome not installed".into())),
            }
        }
    }

    fn no_browser() -> Box<dyn SessionFactory> {
        Box::new(OneShot(RefCell::new(None)))
    }

    fn opts(engine: SearchEngine) -> ActiveOptions {
        ActiveOptions {
            engine,
            search_param: None,
            next_selector: None,
            page_delay: Duration::ZERO,
            search: settings(),
        }
    }

    fn terms() -> Vec<String> {
        vec!["SILVA".into(), "SANTOS".into()]
    }

    #[test]
    fn form_engine_queries_each_term() {
        let start_html = r#"<form action="/people/search"><input type="text" name="q"></form>"#;
        let fetcher = FakeFetcher::default()
            .page(START, start_html)
            .page("https://dir.example.edu/people/search?q=SILVA", "<h3>Ana Silva</h3>")
            .page("https://dir.example.edu/people/search?q=SANTOS", "<h3>Maria Santos</h3>");
        let calls = fetcher.calls.clone();
        let mut s = ActiveStrategy::new(START, terms(), Box::new(fetcher), no_browser(), opts(SearchEngine::Form));
        let mut state = RunState::default();

        let first = s.run_step(&mut state).unwrap();
        let batch = first.batch.unwrap();
        assert_eq!(batch.source, "Search: SILVA");
        assert_eq!(batch.candidates, vec![Candidate::named("Ana Silva")]);
        assert_eq!(first.next, Next::Continue);

        let second = s.run_step(&mut state).unwrap();
        assert_eq!(second.batch.unwrap().candidates, vec![Candidate::named("Maria Santos")]);
        assert_eq!(second.next, Next::Stop(StopReason::Completed));
        // start page fetched once, then one request per term
        assert_eq!(calls.borrow().len(), 3);
        assert_eq!(state.visited_urls.len(), 2);
    }

    #[test]
    fn request_engine_follows_result_pages() {
        let start_html = r#"<form action="/people/search"><input type="text" name="q"></form>"#;
        let fetcher = FakeFetcher::default()
            .page(START, start_html)
            .page(
                "https://dir.example.edu/people/search?q=SILVA",
                r#"<h3><a href="/people/ana">Ana Silva</a></h3><a href="?q=SILVA&page=2">Next</a>"#,
            )
            .page(
                "https://dir.example.edu/people/search?q=SILVA&page=2",
                r#"<h3>Rui Silva</h3><a href="?q=SILVA&page=3">Next</a>"#,
            )
            .page(
                "https://dir.example.edu/people/search?q=SILVA&page=3",
                r#"<h3>Luis Silva</h3><a href="?q=SILVA&page=4">Next</a>"#,
            );
        let mut s = ActiveStrategy::new(START, vec!["SILVA".into()], Box::new(fetcher), no_browser(), opts(SearchEngine::Form));
        let mut state = RunState::default();
        let found = s.run_step(&mut state).unwrap().batch.unwrap().candidates;
        let ana = found.iter().find(|c| c.name == "Ana Silva").unwrap();
        assert_eq!(ana.url.as_deref(), Some("https://dir.example.edu/people/ana"));
        assert!(found.iter().any(|c| c.name == "Luis Silva"));
        assert_eq!(state.visited_fingerprints.len(), 3);
        assert_eq!(state.visited_urls.len(), 3);
    }

    #[test]
    fn url_param_needs_substantial_body() {
        let long = format!("<h3>Maria Santos</h3>{}", "<p>filler</p>".repeat(40));
        let fetcher = FakeFetcher::default()
            .page("https://dir.example.edu/people?q=SANTOS", "<p>tiny</p>")
            .page("https://dir.example.edu/people?query=SANTOS", &long);
        let mut s = ActiveStrategy::new(
            START,
            vec!["SANTOS".into()],
            Box::new(fetcher),
            no_browser(),
            opts(SearchEngine::UrlParam),
        );
        let mut state = RunState::default();
        let batch = s.run_step(&mut state).unwrap().batch.unwrap();
        assert_eq!(batch.candidates, vec![Candidate::named("Maria Santos")]);
    }

    #[test]
    fn auto_survives_missing_browser() {
        let mut s = ActiveStrategy::new(START, terms(), Box::new(FakeFetcher::default()), no_browser(), opts(SearchEngine::Auto));
        let mut state = RunState::default();
        let out = s.run_step(&mut state).unwrap();
        assert!(out.batch.unwrap().candidates.is_empty());
        assert_eq!(out.next, Next::Continue);
    }

    #[test]
    fn browser_engine_aborts_without_browser() {
        let mut s = ActiveStrategy::new(START, terms(), Box::new(FakeFetcher::default()), no_browser(), opts(SearchEngine::Browser));
        let mut state = RunState::default();
        assert!(matches!(s.run_step(&mut state), Err(CrawlError::SessionStart(_))));
    }

    #[test]
    fn browser_engine_extracts_people() {
        let browser = FakeBrowser::default()
            .with_element("input[type='search']", 1, visible(""))
            .with_bodies(&["People\nMaria Santos\nmaria@uni.edu\nAna Costa\nana@uni.edu"]);
        let factory = Box::new(OneShot(RefCell::new(Some(browser))));
        let mut s = ActiveStrategy::new(START, terms(), Box::new(FakeFetcher::default()), factory, opts(SearchEngine::Browser));
        let mut state = RunState::default();
        let batch = s.run_step(&mut state).unwrap().batch.unwrap();
        assert_eq!(batch.candidates.len(), 2);
        assert_eq!(batch.candidates[1].email.as_deref(), Some("ana@uni.edu"));
        assert!(state.visited_urls.contains(START));
        // session stays open for the next term
        assert!(s.run_step(&mut state).unwrap().batch.is_some());
    }
}
