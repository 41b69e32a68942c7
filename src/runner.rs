//! The coordinator loop: drive a strategy step by step, score every batch
//! and keep the run-wide dedup and ordering invariants.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::matcher::{self, FrequencyTables, MatchConfig, MatchRecord};
use crate::strategy::{Batch, Next, StopReason, Strategy};

/// Everything one crawl invocation mutates. Built fresh per run.
#[derive(Debug, Default)]
pub struct RunState {
    pub visited_fingerprints: HashSet<String>,
    pub visited_urls: HashSet<String>,
    pub seen_full_names: HashSet<String>,
    /// Always sorted by descending score.
    pub matches: Vec<MatchRecord>,
}

impl RunState {
    /// Score a batch and merge it. Names already seen in this run, earlier in
    /// the batch included, are dropped before scoring. Returns how many
    /// records were added.
    pub fn absorb(&mut self, batch: Batch, tables: &FrequencyTables, cfg: &MatchConfig) -> usize {
        let mut batch_names = HashSet::new();
        let fresh: Vec<_> = batch
            .candidates
            .into_iter()
            .filter(|c| !self.seen_full_names.contains(&c.name) && batch_names.insert(c.name.clone()))
            .collect();
        if fresh.is_empty() {
            return 0;
        }

        // Scoring is pure; order is restored by the indexed collect.
        let scored: Vec<Option<MatchRecord>> = fresh
            .par_iter()
            .map(|c| {
                matcher::score(&c.name, tables, cfg, &batch.source).map(|mut rec| {
                    rec.email = c.email.clone();
                    rec.description = c.description.clone();
                    rec.url = c.url.clone();
                    rec
                })
            })
            .collect();

        let mut added = 0;
        for rec in scored.into_iter().flatten() {
            if self.seen_full_names.insert(rec.full_name.clone()) {
                self.matches.push(rec);
                added += 1;
            }
        }
        if added > 0 {
            sort_matches(&mut self.matches);
        }
        added
    }
}

/// Stable descending sort by score; equal scores keep discovery order.
pub fn sort_matches(matches: &mut [MatchRecord]) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Checked before every step; once set, the run stops with what it has.
pub type CancelFlag = Arc<AtomicBool>;

/// A flag that a background timer sets after `limit`.
pub fn cancel_after(limit: Duration) -> CancelFlag {
    let flag = CancelFlag::default();
    let timer = Arc::clone(&flag);
    std::thread::spawn(move || {
        std::thread::sleep(limit);
        timer.store(true, Ordering::Relaxed);
    });
    flag
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub politeness_delay: Duration,
    pub match_cfg: MatchConfig,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub steps: usize,
    pub stop: Option<StopReason>,
    /// Set when a step returned an error; partial results are still in the state.
    pub aborted: Option<String>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn outcome(&self) -> String {
        if let Some(e) = &self.aborted {
            return format!("aborted: {e}");
        }
        if self.cancelled {
            return "cancelled".to_string();
        }
        self.stop.map_or_else(|| "unknown".to_string(), |r| r.to_string())
    }
}

pub fn run(
    strategy: &mut dyn Strategy,
    state: &mut RunState,
    tables: &FrequencyTables,
    opts: &RunOptions,
    cancel: &CancelFlag,
) -> RunReport {
    let started_at = Utc::now();
    info!(
        strategy = strategy.kind().as_str(),
        vocab = crate::vocab::VOCAB_VERSION,
        "starting crawl"
    );

    let pb = ProgressBar::new(strategy.planned_steps());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut steps = 0;
    let mut stop = None;
    let mut aborted = None;
    let mut cancelled = false;

    loop {
        if cancel.load(Ordering::Relaxed) {
            info!("cancellation requested, stopping");
            cancelled = true;
            break;
        }
        let outcome = match strategy.run_step(state) {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "run aborted");
                aborted = Some(e.to_string());
                break;
            }
        };
        steps += 1;
        pb.inc(1);

        if let Some(batch) = outcome.batch {
            let source = batch.source.clone();
            let candidates = batch.candidates.len();
            let added = state.absorb(batch, tables, &opts.match_cfg);
            info!(source = %source, candidates, added, total = state.matches.len(), "batch scored");
            pb.set_message(format!("{} matches", state.matches.len()));
        }

        match outcome.next {
            Next::Stop(reason) => {
                info!(reason = %reason, steps, "crawl finished");
                stop = Some(reason);
                break;
            }
            Next::Continue => std::thread::sleep(opts.politeness_delay),
        }
    }
    pb.finish_and_clear();

    RunReport {
        steps,
        stop,
        aborted,
        cancelled,
        started_at,
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::CrawlError;
    use crate::strategy::{Candidate, StepOutcome, StrategyKind};

    fn tables() -> FrequencyTables {
        FrequencyTables {
            first: HashMap::from([("MARIA".into(), 1), ("ANA".into(), 2), ("JOAO".into(), 5)]),
            surname: HashMap::from([("SILVA".into(), 1), ("SANTOS".into(), 2), ("COSTA".into(), 10)]),
            surnames_by_rank: vec!["SILVA".into(), "SANTOS".into(), "COSTA".into()],
        }
    }

    fn opts() -> RunOptions {
        RunOptions {
            politeness_delay: Duration::ZERO,
            match_cfg: MatchConfig {
                first_limit: 100,
                surname_limit: 100,
                allow_single_token: true,
            },
        }
    }

    fn batch(source: &str, names: &[&str]) -> Batch {
        Batch {
            source: source.into(),
            candidates: names.iter().map(|n| Candidate::named(*n)).collect(),
        }
    }

    /// Replays scripted steps; an exhausted script is an error.
    struct Scripted(Vec<Result<StepOutcome, CrawlError>>);

    impl Strategy for Scripted {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Classic
        }
        fn planned_steps(&self) -> u64 {
            self.0.len() as u64
        }
        fn run_step(&mut self, _state: &mut RunState) -> Result<StepOutcome, CrawlError> {
            if self.0.is_empty() {
                return Err(CrawlError::Browser("script exhausted".into()));
            }
            self.0.remove(0)
        }
    }

    fn step(b: Batch, next: Next) -> Result<StepOutcome, CrawlError> {
        Ok(StepOutcome { batch: Some(b), next })
    }

    #[test]
    fn dedup_keeps_first_source() {
        let mut state = RunState::default();
        let cfg = opts().match_cfg;
        state.absorb(batch("Page 1", &["Maria Silva", "Maria Silva", "Zed Unknown"]), &tables(), &cfg);
        state.absorb(batch("Page 2", &["Maria Silva", "Ana Santos"]), &tables(), &cfg);

        assert_eq!(state.matches.len(), 2);
        let maria = state.matches.iter().find(|m| m.full_name == "Maria Silva").unwrap();
        assert_eq!(maria.source, "Page 1");
        let distinct: HashSet<_> = state.matches.iter().map(|m| &m.full_name).collect();
        assert_eq!(distinct.len(), state.seen_full_names.len());
    }

    #[test]
    fn unmatched_names_can_match_later() {
        let mut state = RunState::default();
        let cfg = opts().match_cfg;
        assert_eq!(state.absorb(batch("Page 1", &["Zed Unknown"]), &tables(), &cfg), 0);
        assert!(state.seen_full_names.is_empty());
    }

    #[test]
    fn matches_stay_sorted_with_contact_details() {
        let mut state = RunState::default();
        let cfg = opts().match_cfg;
        state.absorb(batch("Page 1", &["Joao Costa"]), &tables(), &cfg);
        state.absorb(
            Batch {
                source: "Search: SILVA".into(),
                candidates: vec![Candidate {
                    name: "Maria Silva".into(),
                    email: Some("maria@uni.edu".into()),
                    description: Some("Professor of Law".into()),
                    url: Some("https://uni.edu/people/maria".into()),
                }],
            },
            &tables(),
            &cfg,
        );
        assert_eq!(state.matches[0].full_name, "Maria Silva");
        assert_eq!(state.matches[0].email.as_deref(), Some("maria@uni.edu"));
        assert_eq!(state.matches[0].description.as_deref(), Some("Professor of Law"));
        assert_eq!(state.matches[0].url.as_deref(), Some("https://uni.edu/people/maria"));
        assert_eq!(state.matches[1].url, None);
        assert!(state.matches.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn abort_keeps_partial_results() {
        let mut s = Scripted(vec![step(batch("Page 1", &["Ana Santos"]), Next::Continue)]);
        let mut state = RunState::default();
        let report = run(&mut s, &mut state, &tables(), &opts(), &CancelFlag::default());
        assert!(report.aborted.is_some());
        assert_eq!(report.steps, 1);
        assert_eq!(state.matches.len(), 1);
        assert!(report.outcome().starts_with("aborted"));
    }

    #[test]
    fn stop_reason_is_reported() {
        let mut s = Scripted(vec![
            step(batch("Page 1", &["Ana Santos"]), Next::Continue),
            step(batch("Page 2", &["Maria Silva"]), Next::Stop(StopReason::CycleDetected)),
        ]);
        let mut state = RunState::default();
        let report = run(&mut s, &mut state, &tables(), &opts(), &CancelFlag::default());
        assert_eq!(report.stop, Some(StopReason::CycleDetected));
        assert_eq!(report.steps, 2);
        assert_eq!(state.matches.len(), 2);
    }

    #[test]
    fn time_limit_cancels_between_steps() {
        let cancel = cancel_after(Duration::from_millis(20));
        assert!(!cancel.load(Ordering::Relaxed));
        std::thread::sleep(Duration::from_millis(200));

        let mut s = Scripted(vec![step(batch("Page 1", &["Ana Santos"]), Next::Continue)]);
        let mut state = RunState::default();
        let report = run(&mut s, &mut state, &tables(), &opts(), &cancel);
        assert!(report.cancelled);
        assert_eq!(report.outcome(), "cancelled");
    }

    #[test]
    fn cancelled_before_first_step() {
        let mut s = Scripted(vec![step(batch("Page 1", &["Ana Santos"]), Next::Continue)]);
        let mut state = RunState::default();
        let cancel = CancelFlag::default();
        cancel.store(true, Ordering::Relaxed);
        let report = run(&mut s, &mut state, &tables(), &opts(), &cancel);
        assert!(report.cancelled);
        assert_eq!(report.steps, 0);
        assert!(state.matches.is_empty());
    }
}
