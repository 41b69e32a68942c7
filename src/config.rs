use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::matcher::MatchConfig;
use crate::parser::clean::CleanOptions;
use crate::search::SearchSettings;
use crate::strategy::{PageOptions, SearchEngine};

/// Default config file stem, looked up in the working directory.
const DEFAULT_FILE: &str = "dirscout";
const ENV_PREFIX: &str = "DIRSCOUT";

/// Every run knob. Sources, lowest precedence first: defaults, the config
/// file, `DIRSCOUT_*` environment variables, then CLI flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Pause between pages or query terms
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    #[serde(default = "default_rank_limit")]
    pub limit_first: u32,
    #[serde(default = "default_rank_limit")]
    pub limit_surname: u32,

    /// Score one-word candidates against the surname table
    #[serde(default = "default_true")]
    pub allow_single_token: bool,

    /// Reject any candidate containing this word
    #[serde(default)]
    pub blocked_token: Option<String>,

    #[serde(default)]
    pub name_selector: Option<String>,
    #[serde(default)]
    pub next_selector: Option<String>,
    #[serde(default)]
    pub search_selector: Option<String>,
    #[serde(default)]
    pub search_button: Option<String>,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Page or scroll-batch budget for classic and scroll crawls
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Surnames queried by active search
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
    /// Wall-clock budget; the crawl stops after the step running when it expires
    #[serde(default)]
    pub time_limit_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_browser_timeout_secs")]
    pub browser_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub try_people_tab: bool,

    #[serde(default = "default_search_engine")]
    pub search_engine: SearchEngine,
    /// Force a single query parameter for the url-param engine
    #[serde(default)]
    pub search_param: Option<String>,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_frequency_cache")]
    pub frequency_cache: PathBuf,
    #[serde(default = "default_true")]
    pub allow_api_fallback: bool,
    #[serde(default = "default_true")]
    pub save_fetched_tables: bool,
    #[serde(default = "default_results_json")]
    pub results_json: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            politeness_delay_ms: default_politeness_delay_ms(),
            limit_first: default_rank_limit(),
            limit_surname: default_rank_limit(),
            allow_single_token: true,
            blocked_token: None,
            name_selector: None,
            next_selector: None,
            search_selector: None,
            search_button: None,
            settle_delay_ms: default_settle_delay_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_pages: default_max_pages(),
            max_terms: default_max_terms(),
            time_limit_secs: None,
            headless: true,
            browser_timeout_secs: default_browser_timeout_secs(),
            try_people_tab: true,
            search_engine: default_search_engine(),
            search_param: None,
            db_path: default_db_path(),
            frequency_cache: default_frequency_cache(),
            allow_api_fallback: true,
            save_fetched_tables: true,
            results_json: default_results_json(),
        }
    }
}

impl Settings {
    /// Load and validate. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_FILE).required(false),
        };
        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("reading configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit_first == 0 || self.limit_surname == 0 {
            bail!("rank limits must be at least 1");
        }
        if self.max_pages == 0 || self.max_terms == 0 {
            bail!("max_pages and max_terms must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            first_limit: self.limit_first,
            surname_limit: self.limit_surname,
            allow_single_token: self.allow_single_token,
        }
    }

    pub fn clean_options(&self) -> CleanOptions {
        CleanOptions::with_blocked_token(self.blocked_token.as_deref())
    }

    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            max_pages: self.max_pages,
            name_selector: self.name_selector.clone(),
            next_selector: self.next_selector.clone(),
            clean: self.clean_options(),
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            input_selector: self.search_selector.clone(),
            button_selector: self.search_button.clone(),
            name_selector: self.name_selector.clone(),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ready_timeout: self.browser_timeout(),
            try_people_tab: self.try_people_tab,
            clean: self.clean_options(),
        }
    }
}

fn default_politeness_delay_ms() -> u64 {
    2000
}

fn default_rank_limit() -> u32 {
    3000
}

fn default_settle_delay_ms() -> u64 {
    400
}

fn default_poll_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    350
}

fn default_max_pages() -> usize {
    10
}

fn default_max_terms() -> usize {
    50
}

fn default_browser_timeout_secs() -> u64 {
    30
}

fn default_search_engine() -> SearchEngine {
    SearchEngine::Auto
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/dirscout.sqlite")
}

fn default_frequency_cache() -> PathBuf {
    PathBuf::from("data/name_rank_cache.json")
}

fn default_results_json() -> PathBuf {
    PathBuf::from("results.json")
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn toml_file(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.politeness_delay_ms, 2000);
        assert_eq!(s.limit_first, 3000);
        assert_eq!(s.max_terms, 50);
        assert_eq!(s.search_engine, SearchEngine::Auto);
        assert!(s.allow_single_token);
        assert_eq!(s.time_limit(), None);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let f = toml_file(
            "politeness_delay_ms = 500\nsearch_engine = \"url-param\"\nblocked_token = \"Hall\"\nmax_pages = 3\ntime_limit_secs = 90\n",
        );
        let s = Settings::load(Some(f.path())).unwrap();
        assert_eq!(s.politeness_delay_ms, 500);
        assert_eq!(s.search_engine, SearchEngine::UrlParam);
        assert_eq!(s.blocked_token.as_deref(), Some("Hall"));
        assert_eq!(s.page_options().max_pages, 3);
        assert_eq!(s.time_limit(), Some(Duration::from_secs(90)));
        // untouched keys keep their defaults
        assert_eq!(s.poll_timeout_secs, 15);
    }

    #[test]
    fn rejects_bad_values() {
        let f = toml_file("poll_interval_ms = 0\n");
        assert!(Settings::load(Some(f.path())).is_err());
        let f = toml_file("limit_surname = 0\n");
        assert!(Settings::load(Some(f.path())).is_err());
    }

    #[test]
    fn explicit_file_must_exist() {
        assert!(Settings::load(Some(Path::new("no/such/dirscout.toml"))).is_err());
    }

    #[test]
    fn derived_settings() {
        let s = Settings {
            settle_delay_ms: 250,
            search_selector: Some("#q".into()),
            ..Settings::default()
        };
        let search = s.search_settings();
        assert_eq!(search.settle_delay, Duration::from_millis(250));
        assert_eq!(search.input_selector.as_deref(), Some("#q"));
        assert_eq!(s.match_config().surname_limit, 3000);
    }
}
