use std::time::Duration;

use tracing::debug;

use super::{to_candidates, Batch, Next, PageOptions, StepOutcome, StopReason, Strategy, StrategyKind};
use crate::browser::BrowserSession;
use crate::error::CrawlError;
use crate::parser::extract::{extract_names, profile_links};
use crate::runner::RunState;

/// Infinite-scroll listing: one browser page, scrolled to the bottom once per step.
pub struct ScrollStrategy {
    session: Box<dyn BrowserSession>,
    start_url: String,
    settle: Duration,
    ready_timeout: Duration,
    opts: PageOptions,
    opened: bool,
    batches: usize,
    last_len: usize,
}

impl ScrollStrategy {
    pub fn new(
        session: Box<dyn BrowserSession>,
        start_url: &str,
        settle: Duration,
        ready_timeout: Duration,
        opts: PageOptions,
    ) -> Self {
        ScrollStrategy {
            session,
            start_url: start_url.to_string(),
            settle,
            ready_timeout,
            opts,
            opened: false,
            batches: 0,
            last_len: 0,
        }
    }
}

impl Strategy for ScrollStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scroll
    }

    fn planned_steps(&self) -> u64 {
        self.opts.max_pages as u64
    }

    fn run_step(&mut self, state: &mut RunState) -> Result<StepOutcome, CrawlError> {
        if !self.opened {
            self.session.navigate(&self.start_url)?;
            self.session.wait_ready(self.ready_timeout)?;
            state.visited_urls.insert(self.start_url.clone());
            self.opened = true;
        }
        if self.batches >= self.opts.max_pages {
            return Ok(StepOutcome::stop(StopReason::Completed));
        }

        self.session.scroll_to_bottom()?;
        std::thread::sleep(self.settle);
        let html = self.session.page_html()?;
        self.batches += 1;

        // Page stopped growing: nothing more will load.
        let grew = html.len() != self.last_len;
        self.last_len = html.len();

        let names = extract_names(&html, self.opts.name_selector(), &self.opts.clean);
        let mut base = self.session.current_url();
        if base.is_empty() {
            base.clone_from(&self.start_url);
        }
        let links = profile_links(&html, &base, &self.opts.clean);
        debug!(batch = self.batches, names = names.len(), bytes = html.len(), "scroll batch");
        let batch = Batch {
            source: format!("Scroll batch {}", self.batches),
            candidates: to_candidates(names, &links),
        };

        let next = if self.batches > 1 && !grew {
            Next::Stop(StopReason::PaginationExhausted)
        } else if self.batches >= self.opts.max_pages {
            Next::Stop(StopReason::Completed)
        } else {
            Next::Continue
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
    use crate::parser::clean::CleanOptions;
    use crate::search::tests::FakeBrowser;

    fn opts(max_pages: usize) -> PageOptions {
        PageOptions {
            max_pages,
            name_selector: None,
            next_selector: None,
            clean: CleanOptions::default(),
        }
    }

    #[test]
    fn scrolls_until_budget() {
        let mut fake = FakeBrowser::default();
        fake.html = r#"<h3><a href="maria">Maria Santos</a></h3>"#.into();
        let mut s = ScrollStrategy::new(Box::new(fake), "https://x.edu/people/", Duration::ZERO, Duration::ZERO, opts(1));
        let mut state = RunState::default();
        let out = s.run_step(&mut state).unwrap();
        let batch = out.batch.unwrap();
        assert_eq!(batch.source, "Scroll batch 1");
        assert_eq!(batch.candidates[0].name, "Maria Santos");
        assert_eq!(batch.candidates[0].url.as_deref(), Some("https://x.edu/people/maria"));
        assert_eq!(out.next, Next::Stop(StopReason::Completed));
        assert!(state.visited_urls.contains("https://x.edu/people/"));
    }

    #[test]
    fn stops_when_page_stops_growing() {
        let mut fake = FakeBrowser::default();
        fake.html = "<h3>Maria Santos</h3>".into();
        let mut s = ScrollStrategy::new(Box::new(fake), "https://x.edu/people", Duration::ZERO, Duration::ZERO, opts(10));
        let mut state = RunState::default();
        assert_eq!(s.run_step(&mut state).unwrap().next, Next::Continue);
        assert_eq!(
            s.run_step(&mut state).unwrap().next,
            Next::Stop(StopReason::PaginationExhausted)
        );
    }
}
