use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CrawlError;
use crate::matcher::{normalize_token, FrequencyTables};

const FIRST_NAME_RANKING: &str =
    "https://servicodados.ibge.gov.br/api/v3/nomes/2022/localidade/0/ranking/nome";
const SURNAME_RANKING: &str =
    "https://servicodados.ibge.gov.br/api/v3/nomes/2022/localidade/0/ranking/sobrenome";
const MAX_ENTRIES: usize = 20_000;
const PAGE_PAUSE: Duration = Duration::from_millis(80);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMeta {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    File,
    Api,
}

/// Full, unsliced rank tables as the provider hands them over.
#[derive(Debug, Clone)]
pub struct RawTables {
    pub first: HashMap<String, u32>,
    pub surname: HashMap<String, u32>,
    pub meta: CacheMeta,
    pub origin: TableOrigin,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    meta: CacheMeta,
    #[serde(default)]
    first_name_ranks: HashMap<String, u32>,
    #[serde(default)]
    surname_ranks: HashMap<String, u32>,
}

pub trait FrequencyProvider {
    fn load(&self) -> Result<RawTables, CrawlError>;
}

/// Reads the JSON rank cache, falling back to the public IBGE ranking API.
pub struct CachedRankProvider {
    pub cache_path: PathBuf,
    pub allow_api_fallback: bool,
    pub save_fetched: bool,
}

#[derive(Deserialize)]
struct RankingPage {
    #[serde(default)]
    items: Vec<RankingItem>,
}

#[derive(Deserialize)]
struct RankingItem {
    nome: String,
    #[serde(default)]
    rank: u32,
}

impl CachedRankProvider {
    fn read_cache(path: &Path) -> Result<RawTables, CrawlError> {
        let text = fs::read_to_string(path)?;
        let cache: CacheFile = serde_json::from_str(&text)?;
        Ok(RawTables {
            first: cache.first_name_ranks,
            surname: cache.surname_ranks,
            meta: cache.meta,
            origin: TableOrigin::File,
        })
    }

    fn write_cache(&self, raw: &RawTables) -> Result<(), CrawlError> {
        if let Some(dir) = self.cache_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let cache = CacheFile {
            meta: raw.meta.clone(),
            first_name_ranks: raw.first.clone(),
            surname_ranks: raw.surname.clone(),
        };
        fs::write(&self.cache_path, serde_json::to_string(&cache)?)?;
        Ok(())
    }

    fn fetch_ranking(client: &Client, url: &str) -> HashMap<String, u32> {
        let mut out = HashMap::new();
        let mut page = 1u32;
        loop {
            let resp = match client.get(url).query(&[("page", page)]).send() {
                Ok(r) if r.status().as_u16() == 200 => r,
                Ok(r) => {
                    warn!(url, page, status = r.status().as_u16(), "ranking page refused");
                    break;
                }
                Err(e) => {
                    warn!(url, page, error = %e, "ranking page failed");
                    break;
                }
            };
            let parsed = resp
                .text()
                .map_err(|e| e.to_string())
                .and_then(|t| serde_json::from_str::<RankingPage>(&t).map_err(|e| e.to_string()));
            let items = match parsed {
                Ok(p) => p.items,
                Err(e) => {
                    warn!(url, page, error = %e, "ranking page unreadable");
                    break;
                }
            };
            if items.is_empty() {
                break;
            }
            for it in items {
                let name = normalize_token(&it.nome);
                if !name.is_empty() {
                    out.insert(name, it.rank);
                }
            }
            if out.len() > MAX_ENTRIES {
                break;
            }
            page += 1;
            std::thread::sleep(PAGE_PAUSE);
        }
        out
    }

    fn fetch_from_api(&self) -> Result<RawTables, CrawlError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CrawlError::FrequencyTables(e.to_string()))?;
        info!("Downloading name rankings from IBGE");
        let first = Self::fetch_ranking(&client, FIRST_NAME_RANKING);
        let surname = Self::fetch_ranking(&client, SURNAME_RANKING);
        info!(first = first.len(), surname = surname.len(), "rankings downloaded");
        Ok(RawTables {
            first,
            surname,
            meta: CacheMeta {
                saved_at: Some(Utc::now()),
                source: "IBGE API v3".into(),
            },
            origin: TableOrigin::Api,
        })
    }
}

impl FrequencyProvider for CachedRankProvider {
    fn load(&self) -> Result<RawTables, CrawlError> {
        if self.cache_path.exists() {
            return Self::read_cache(&self.cache_path);
        }
        if !self.allow_api_fallback {
            return Err(CrawlError::FrequencyTables(format!(
                "{} is missing and API fallback is disabled",
                self.cache_path.display()
            )));
        }
        let raw = self.fetch_from_api()?;
        if raw.first.is_empty() {
            return Err(CrawlError::FrequencyTables("ranking API returned no names".into()));
        }
        if self.save_fetched {
            if let Err(e) = self.write_cache(&raw) {
                warn!(path = %self.cache_path.display(), error = %e, "could not save rank cache");
            }
        }
        Ok(raw)
    }
}

/// Keep ranks in `[1, limit]` and order the kept surnames most common first.
pub fn slice(raw: &RawTables, first_limit: u32, surname_limit: u32) -> FrequencyTables {
    let keep = |m: &HashMap<String, u32>, limit: u32| -> HashMap<String, u32> {
        m.iter()
            .filter(|(_, r)| (1..=limit).contains(*r))
            .map(|(k, r)| (k.clone(), *r))
            .collect()
    };
    let first = keep(&raw.first, first_limit);
    let surname = keep(&raw.surname, surname_limit);

    let mut ordered: Vec<(&String, &u32)> = surname.iter().collect();
    ordered.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
    let surnames_by_rank = ordered.into_iter().map(|(k, _)| k.clone()).collect();

    FrequencyTables {
        first,
        surname,
        surnames_by_rank,
    }
}
