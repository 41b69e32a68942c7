//! Crawl strategies. Each one advances the crawl by one page, scroll batch or
//! query term per step and hands back raw candidates; scoring and dedup
//! happen once, in the runner.

pub mod active;
pub mod classic;
pub mod scroll;

use std::collections::HashMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::runner::RunState;

pub use active::ActiveStrategy;
pub use classic::ClassicStrategy;
pub use scroll::ScrollStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Follow next-page affordances with plain HTTP requests
    Classic,
    /// Scroll a browser page that loads more entries on demand
    Scroll,
    /// Query the site's search box once per common surname
    Active,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Classic => "classic",
            StrategyKind::Scroll => "scroll",
            StrategyKind::Active => "active",
        }
    }
}

/// How active search submits a query term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchEngine {
    /// Form, then URL parameter, then browser
    Auto,
    Form,
    UrlParam,
    Browser,
}

/// A name candidate before scoring, with whatever contact details were found
/// next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl Candidate {
    pub fn named(name: impl Into<String>) -> Self {
        Candidate {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    /// "Page 3", "Scroll batch 2", "Search: SILVA".
    pub source: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// No next request could be resolved.
    PaginationExhausted,
    /// The next request had already been made.
    CycleDetected,
    FetchFailed,
    /// Page, batch or term budget used up.
    Completed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::PaginationExhausted => "pagination exhausted",
            StopReason::CycleDetected => "pagination cycle",
            StopReason::FetchFailed => "fetch failed",
            StopReason::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Continue,
    Stop(StopReason),
}

#[derive(Debug)]
pub struct StepOutcome {
    pub batch: Option<Batch>,
    pub next: Next,
}

impl StepOutcome {
    pub fn stop(reason: StopReason) -> Self {
        StepOutcome {
            batch: None,
            next: Next::Stop(reason),
        }
    }
}

pub trait Strategy {
    fn kind(&self) -> StrategyKind;
    /// Upper bound on steps, for progress display.
    fn planned_steps(&self) -> u64;
    /// Advance by one unit of work. `Err` aborts the run; results gathered so far are kept.
    fn run_step(&mut self, state: &mut RunState) -> Result<StepOutcome, CrawlError>;
}

/// Bare names become candidates; `links` supplies profile URLs by name.
pub(crate) fn to_candidates(names: Vec<String>, links: &HashMap<String, String>) -> Vec<Candidate> {
    names
        .into_iter()
        .map(|name| {
            let url = links.get(&name).cloned();
            Candidate { url, ..Candidate::named(name) }
        })
        .collect()
}

/// Extraction knobs shared by the page-walking strategies.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub max_pages: usize,
    pub name_selector: Option<String>,
    pub next_selector: Option<String>,
    pub clean: crate::parser::clean::CleanOptions,
}

impl PageOptions {
    pub(crate) fn name_selector(&self) -> Option<&str> {
        self.name_selector.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub(crate) fn next_selector(&self) -> Option<&str> {
        self.next_selector.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
