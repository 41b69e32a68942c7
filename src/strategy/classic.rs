use tracing::{debug, warn};

use super::{to_candidates, Batch, Next, PageOptions, StepOutcome, StopReason, Strategy, StrategyKind};
use crate::error::CrawlError;
use crate::fetch::Fetcher;
use crate::parser::extract::{extract_names, profile_links};
use crate::parser::paginate::resolve_next;
use crate::request::RequestDescriptor;
use crate::runner::RunState;

/// Plain request pagination: fetch, extract, resolve the next request.
pub struct ClassicStrategy {
    fetcher: Box<dyn Fetcher>,
    pending: Option<RequestDescriptor>,
    pages: usize,
    opts: PageOptions,
}

impl ClassicStrategy {
    pub fn new(fetcher: Box<dyn Fetcher>, start_url: &str, opts: PageOptions) -> Self {
        ClassicStrategy {
            fetcher,
            pending: Some(RequestDescriptor::get(start_url)),
            pages: 0,
            opts,
        }
    }
}

impl Strategy for ClassicStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Classic
    }

    fn planned_steps(&self) -> u64 {
        self.opts.max_pages as u64
    }

    fn run_step(&mut self, state: &mut RunState) -> Result<StepOutcome, CrawlError> {
        let Some(req) = self.pending.take() else {
            return Ok(StepOutcome::stop(StopReason::PaginationExhausted));
        };
        if self.pages >= self.opts.max_pages {
            return Ok(StepOutcome::stop(StopReason::Completed));
        }
        if !state.visited_fingerprints.insert(req.fingerprint()) {
            return Ok(StepOutcome::stop(StopReason::CycleDetected));
        }
        state.visited_urls.insert(req.url.clone());

        let page = match self.fetcher.fetch(&req) {
            Ok(p) => p,
            Err(e) => {
                warn!(request = %req, error = %e, "page fetch failed, stopping pagination");
                return Ok(StepOutcome::stop(StopReason::FetchFailed));
            }
        };
        self.pages += 1;

        let names = extract_names(&page.body, self.opts.name_selector(), &self.opts.clean);
        let links = profile_links(&page.body, &page.url, &self.opts.clean);
        debug!(
            page = self.pages,
            url = %page.url,
            status = page.status,
            latency_ms = page.latency_ms,
            names = names.len(),
            links = links.len(),
            "page extracted"
        );
        let batch = Batch {
            source: format!("Page {}", self.pages),
            candidates: to_candidates(names, &links),
        };

        // Relative links resolve against where the server actually put us.
        let next = match resolve_next(&page.body, &page.url, self.opts.next_selector()) {
            None => Next::Stop(StopReason::PaginationExhausted),
            Some(n) if state.visited_fingerprints.contains(&n.fingerprint()) => {
                debug!(request = %n, "next request already visited");
                Next::Stop(StopReason::CycleDetected)
            }
            Some(_) if self.pages >= self.opts.max_pages => Next::Stop(StopReason::Completed),
            Some(n) => {
                self.pending = Some(n);
                Next::Continue
            }
        };
        Ok(StepOutcome {
            batch: Some(batch),
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::FakeFetcher;
    use crate::parser::clean::CleanOptions;

    const BASE: &str = "https://dir.example.edu/alumni/";

    fn opts(max_pages: usize) -> PageOptions {
        PageOptions {
            max_pages,
            name_selector: None,
            next_selector: None,
            clean: CleanOptions::default(),
        }
    }

    fn fixture(n: usize) -> String {
        std::fs::read_to_string(format!("tests/fixtures/directory_page{n}.html")).unwrap()
    }

    fn three_page_site() -> FakeFetcher {
        FakeFetcher::default()
            .page(&format!("{BASE}page1.html"), &fixture(1))
            .page(&format!("{BASE}page2.html"), &fixture(2))
            .page(&format!("{BASE}page3.html"), &fixture(3))
    }

    fn drain(s: &mut ClassicStrategy, state: &mut RunState) -> (Vec<Batch>, StopReason) {
        let mut batches = Vec::new();
        loop {
            let out = s.run_step(state).unwrap();
            batches.extend(out.batch);
            if let Next::Stop(r) = out.next {
                return (batches, r);
            }
        }
    }

    #[test]
    fn walks_three_pages() {
        let mut s = ClassicStrategy::new(Box::new(three_page_site()), &format!("{BASE}page1.html"), opts(10));
        let mut state = RunState::default();
        let (batches, reason) = drain(&mut s, &mut state);
        assert_eq!(reason, StopReason::PaginationExhausted);
        let sources: Vec<&str> = batches.iter().map(|b| b.source.as_str()).collect();
        assert_eq!(sources, vec!["Page 1", "Page 2", "Page 3"]);
        assert_eq!(state.visited_urls.len(), 3);
        assert!(batches[0].candidates.iter().any(|c| c.name == "Maria Santos"));
    }

    #[test]
    fn page_budget() {
        let mut s = ClassicStrategy::new(Box::new(three_page_site()), &format!("{BASE}page1.html"), opts(2));
        let mut state = RunState::default();
        let (batches, reason) = drain(&mut s, &mut state);
        assert_eq!(batches.len(), 2);
        assert_eq!(reason, StopReason::Completed);
    }

    #[test]
    fn cycle_stops_without_refetch() {
        let a = format!("{BASE}a.html");
        let b = format!("{BASE}b.html");
        let fetcher = FakeFetcher::default()
            .page(&a, r#"<h3>Maria Santos</h3><a href="b.html">Next</a>"#)
            .page(&b, r#"<h3>Ana Costa</h3><a href="a.html">Next</a>"#);
        let calls = fetcher.calls.clone();
        let mut s = ClassicStrategy::new(Box::new(fetcher), &a, opts(10));
        let mut state = RunState::default();
        let (batches, reason) = drain(&mut s, &mut state);
        assert_eq!(reason, StopReason::CycleDetected);
        assert_eq!(batches.len(), 2);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn next_link_resolves_against_redirected_url() {
        let fetcher = FakeFetcher::default()
            .redirect("https://dir.example.edu/people", "https://dir.example.edu/people/")
            .page(
                "https://dir.example.edu/people/",
                r#"<h3><a href="ana-costa">Ana Costa</a></h3><a href="page2.html">Next</a>"#,
            )
            .page("https://dir.example.edu/people/page2.html", "<h3>Maria Santos</h3>");
        let calls = fetcher.calls.clone();
        let mut s = ClassicStrategy::new(Box::new(fetcher), "https://dir.example.edu/people", opts(10));
        let mut state = RunState::default();
        let (batches, reason) = drain(&mut s, &mut state);

        assert_eq!(reason, StopReason::PaginationExhausted);
        assert_eq!(batches.len(), 2);
        assert_eq!(calls.borrow()[1].url, "https://dir.example.edu/people/page2.html");
        let ana = &batches[0].candidates[0];
        assert_eq!(ana.name, "Ana Costa");
        assert_eq!(ana.url.as_deref(), Some("https://dir.example.edu/people/ana-costa"));
    }

    #[test]
    fn fetch_failure_ends_pagination() {
        let a = format!("{BASE}a.html");
        let fetcher = FakeFetcher::default().page(&a, r#"<h3>Maria Santos</h3><a href="gone.html">Next</a>"#);
        let mut s = ClassicStrategy::new(Box::new(fetcher), &a, opts(10));
        let mut state = RunState::default();
        let (batches, reason) = drain(&mut s, &mut state);
        assert_eq!(batches.len(), 1);
        assert_eq!(reason, StopReason::FetchFailed);
    }
}
