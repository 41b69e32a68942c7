mod browser;
mod config;
mod db;
mod error;
mod fetch;
mod frequency;
mod matcher;
mod parser;
mod request;
mod runner;
mod search;
mod strategy;
mod verify;
mod vocab;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::browser::{ChromeOptions, SessionFactory};
use crate::config::Settings;
use crate::fetch::HttpFetcher;
use crate::frequency::{CachedRankProvider, FrequencyProvider};
use crate::matcher::{FrequencyTables, MatchRecord};
use crate::runner::{CancelFlag, RunOptions, RunState};
use crate::strategy::active::ActiveOptions;
use crate::strategy::{ActiveStrategy, ClassicStrategy, ScrollStrategy, SearchEngine, Strategy, StrategyKind};
use crate::verify::{apply_junk_verdicts, ListClassifier};

#[derive(Parser)]
#[command(name = "dirscout", about = "Crawl people directories and rank names by surname frequency")]
struct Cli {
    /// Config file (default: ./dirscout.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one directory and store the ranked matches
    Crawl(CrawlArgs),
    /// Load the name frequency tables and show what active search would query
    Tables {
        #[arg(long)]
        first: Option<u32>,
        #[arg(long)]
        surname: Option<u32>,
    },
    /// Show stored matches
    Results {
        /// Run id (default: latest)
        #[arg(long)]
        run: Option<i64>,
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Mark junk matches from a verdict file (one full name per line)
    Verify {
        #[arg(long)]
        junk_file: PathBuf,
        #[arg(long)]
        run: Option<i64>,
    },
    /// Show run and match counts
    Stats,
}

#[derive(Args)]
struct CrawlArgs {
    /// Directory start URL
    url: String,
    #[arg(short, long, value_enum, default_value = "classic")]
    strategy: StrategyKind,
    #[arg(long)]
    max_pages: Option<usize>,
    #[arg(long)]
    max_terms: Option<usize>,
    #[arg(long)]
    name_selector: Option<String>,
    #[arg(long)]
    next_selector: Option<String>,
    #[arg(long)]
    search_selector: Option<String>,
    #[arg(long)]
    search_button: Option<String>,
    /// Show the browser window
    #[arg(long)]
    no_headless: bool,
    /// Reject candidates containing this word
    #[arg(long)]
    block_token: Option<String>,
    /// Ignore one-word candidates
    #[arg(long)]
    no_single_token: bool,
    #[arg(long, value_enum)]
    engine: Option<SearchEngine>,
    /// Stop after this many seconds, keeping what was found
    #[arg(long, value_name = "SECS")]
    time_limit: Option<u64>,
}

impl CrawlArgs {
    fn apply(&self, s: &mut Settings) {
        if let Some(n) = self.max_pages {
            s.max_pages = n;
        }
        if let Some(n) = self.max_terms {
            s.max_terms = n;
        }
        if let Some(e) = self.engine {
            s.search_engine = e;
        }
        if self.time_limit.is_some() {
            s.time_limit_secs = self.time_limit;
        }
        let overrides = [
            (&self.name_selector, &mut s.name_selector),
            (&self.next_selector, &mut s.next_selector),
            (&self.search_selector, &mut s.search_selector),
            (&self.search_button, &mut s.search_button),
            (&self.block_token, &mut s.blocked_token),
        ];
        for (arg, field) in overrides {
            if arg.is_some() {
                field.clone_from(arg);
            }
        }
        if self.no_headless {
            s.headless = false;
        }
        if self.no_single_token {
            s.allow_single_token = false;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Crawl(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            crawl(&args.url, args.strategy, &settings)
        }
        Commands::Tables { first, surname } => {
            let first = first.unwrap_or(settings.limit_first);
            let surname = surname.unwrap_or(settings.limit_surname);
            let raw = provider(&settings).load()?;
            let saved = raw
                .meta
                .saved_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into());
            println!("Source:   {:?} ({}, saved {})", raw.origin, raw.meta.source, saved);
            println!("Raw:      {} first names, {} surnames", raw.first.len(), raw.surname.len());
            let tables = frequency::slice(&raw, first, surname);
            println!(
                "Sliced:   {} first names (<= {}), {} surnames (<= {})",
                tables.first.len(),
                first,
                tables.surname.len(),
                surname
            );
            let head: Vec<&str> = tables.surnames_by_rank.iter().take(15).map(String::as_str).collect();
            println!("Queries:  {}", head.join(", "));
            Ok(())
        }
        Commands::Results { run, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let Some(run_id) = resolve_run(&conn, run)? else {
                println!("No runs stored yet. Run 'crawl' first.");
                return Ok(());
            };
            if let Some(r) = db::fetch_run(&conn, run_id)? {
                println!(
                    "Run {} | {} | {} | {} | {} matches",
                    r.id, r.strategy, r.start_url, r.outcome, r.match_count
                );
            }
            let rows = db::fetch_matches(&conn, run_id, Some(limit))?;
            print_matches(&rows);
            Ok(())
        }
        Commands::Verify { junk_file, run } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let Some(run_id) = resolve_run(&conn, run)? else {
                println!("No runs stored yet. Run 'crawl' first.");
                return Ok(());
            };
            let mut matches = db::fetch_matches(&conn, run_id, None)?;
            let classifier = ListClassifier { path: junk_file };
            let marked = apply_junk_verdicts(&mut matches, &classifier)
                .with_context(|| format!("reading verdicts from {}", classifier.path.display()))?;
            db::update_matches(&conn, run_id, &matches)?;
            println!("Run {}: {} of {} matches marked junk.", run_id, marked, matches.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:      {}", s.runs);
            println!("Matches:   {}", s.matches);
            println!("Distinct:  {}", s.distinct_names);
            println!("Verified:  {}", s.verified);
            println!("Junk:      {}", s.junk);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn provider(settings: &Settings) -> CachedRankProvider {
    CachedRankProvider {
        cache_path: settings.frequency_cache.clone(),
        allow_api_fallback: settings.allow_api_fallback,
        save_fetched: settings.save_fetched_tables,
    }
}

fn resolve_run(conn: &rusqlite::Connection, run: Option<i64>) -> Result<Option<i64>> {
    match run {
        Some(id) => Ok(Some(id)),
        None => db::latest_run_id(conn),
    }
}

fn load_tables(settings: &Settings) -> Result<FrequencyTables> {
    let raw = provider(settings).load().context("loading name frequency tables")?;
    let tables = frequency::slice(&raw, settings.limit_first, settings.limit_surname);
    info!(
        first = tables.first.len(),
        surname = tables.surname.len(),
        "frequency tables ready"
    );
    Ok(tables)
}

fn build_strategy(
    url: &str,
    kind: StrategyKind,
    settings: &Settings,
    tables: &FrequencyTables,
) -> Result<Box<dyn Strategy>> {
    let chrome = ChromeOptions {
        headless: settings.headless,
        timeout: settings.browser_timeout(),
    };
    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::Classic => Box::new(ClassicStrategy::new(
            Box::new(HttpFetcher::new(Some(url))?),
            url,
            settings.page_options(),
        )),
        StrategyKind::Scroll => {
            let session = chrome.open()?;
            Box::new(ScrollStrategy::new(
                session,
                url,
                // scrolled content needs at least a second to load
                settings.politeness_delay().max(std::time::Duration::from_secs(1)),
                settings.browser_timeout(),
                settings.page_options(),
            ))
        }
        StrategyKind::Active => {
            let terms: Vec<String> = tables
                .surnames_by_rank
                .iter()
                .take(settings.max_terms)
                .cloned()
                .collect();
            if terms.is_empty() {
                bail!("no surnames within limit_surname={} to search for", settings.limit_surname);
            }
            Box::new(ActiveStrategy::new(
                url,
                terms,
                Box::new(HttpFetcher::new(Some(url))?),
                Box::new(chrome),
                ActiveOptions {
                    engine: settings.search_engine,
                    search_param: settings.search_param.clone(),
                    next_selector: settings.next_selector.clone(),
                    page_delay: settings.politeness_delay() / 2,
                    search: settings.search_settings(),
                },
            ))
        }
    };
    Ok(strategy)
}

fn crawl(url: &str, kind: StrategyKind, settings: &Settings) -> Result<()> {
    if url::Url::parse(url).is_err() {
        bail!("not an absolute URL: {url}");
    }
    let tables = load_tables(settings)?;
    let mut strategy = build_strategy(url, kind, settings, &tables)?;

    let mut state = RunState::default();
    let opts = RunOptions {
        politeness_delay: settings.politeness_delay(),
        match_cfg: settings.match_config(),
    };
    let cancel = settings.time_limit().map_or_else(CancelFlag::default, runner::cancel_after);
    let report = runner::run(strategy.as_mut(), &mut state, &tables, &opts, &cancel);
    // Release the browser before touching the database.
    drop(strategy);

    let mut run = db::RunRow {
        id: 0,
        start_url: url.to_string(),
        strategy: kind.as_str().to_string(),
        outcome: report.outcome(),
        steps: report.steps,
        pages: state.visited_urls.len(),
        match_count: state.matches.len(),
        started_at: report.started_at,
        finished_at: report.finished_at,
    };
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    run.id = db::save_run(&conn, &run, &state.matches)?;
    db::export_json(&settings.results_json, &run, &state.matches)?;

    println!(
        "Run {}: {} steps, {} matches ({}).",
        run.id, report.steps, state.matches.len(), run.outcome
    );
    print_matches(&state.matches[..state.matches.len().min(20)]);
    println!("\nSaved to {} and {}", settings.db_path.display(), settings.results_json.display());
    Ok(())
}

fn print_matches(rows: &[MatchRecord]) {
    if rows.is_empty() {
        println!("No matches.");
        return;
    }
    println!(
        "{:>3} | {:<30} | {:>6} | {:<20} | {:>5} | {:>5} | {:<8} | {:<18}",
        "#", "Name", "Score", "Type", "First", "Last", "Status", "Source"
    );
    println!("{}", "-".repeat(112));
    for (i, m) in rows.iter().enumerate() {
        let rank = |r: Option<u32>| r.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:>3} | {:<30} | {:>6.1} | {:<20} | {:>5} | {:>5} | {:<8} | {:<18}",
            i + 1,
            truncate(&m.full_name, 30),
            m.score,
            m.match_type.as_str(),
            rank(m.first_rank),
            rank(m.surname_rank),
            m.status.as_str(),
            truncate(&m.source, 18)
        );
    }
    let with_details: Vec<_> = rows
        .iter()
        .filter(|m| m.email.is_some() || m.url.is_some() || m.description.is_some())
        .collect();
    if !with_details.is_empty() {
        println!("\n--- Contact details ---");
        for m in with_details {
            let details: Vec<&str> = [m.email.as_deref(), m.url.as_deref(), m.description.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            println!("  {}: {}", truncate(&m.full_name, 30), truncate(&details.join(" | "), 100));
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
