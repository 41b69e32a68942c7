use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::vocab::is_blocklisted;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Strong,
    FirstOnly,
    SurnameOnly,
    SurnameOnlyWeak,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Strong => "Strong",
            MatchType::FirstOnly => "First Only",
            MatchType::SurnameOnly => "Surname Only",
            MatchType::SurnameOnlyWeak => "Surname Only (Weak)",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Strong" => Some(MatchType::Strong),
            "First Only" => Some(MatchType::FirstOnly),
            "Surname Only" => Some(MatchType::SurnameOnly),
            "Surname Only (Weak)" => Some(MatchType::SurnameOnlyWeak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Valid,
    Verified,
    Junk,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Valid => "Valid",
            MatchStatus::Verified => "Verified",
            MatchStatus::Junk => "Junk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Valid" => Some(MatchStatus::Valid),
            "Verified" => Some(MatchStatus::Verified),
            "Junk" => Some(MatchStatus::Junk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub full_name: String,
    pub score: f64,
    pub first_rank: Option<u32>,
    pub surname_rank: Option<u32>,
    pub source: String,
    pub match_type: MatchType,
    pub status: MatchStatus,
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Profile page found next to the name.
    #[serde(default)]
    pub url: Option<String>,
}

/// Rank tables sliced to the configured limits, plus the surname query order.
#[derive(Debug, Clone, Default)]
pub struct FrequencyTables {
    pub first: HashMap<String, u32>,
    pub surname: HashMap<String, u32>,
    pub surnames_by_rank: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub first_limit: u32,
    pub surname_limit: u32,
    pub allow_single_token: bool,
}

/// Strip diacritics, uppercase, drop everything outside A-Z.
pub fn normalize_token(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ß' => out.push_str("SS"),
            'Æ' | 'æ' => out.push_str("AE"),
            'Œ' | 'œ' => out.push_str("OE"),
            'Ø' | 'ø' => out.push('O'),
            'Ð' | 'ð' => out.push('D'),
            'Þ' | 'þ' => out.push_str("TH"),
            'Ł' | 'ł' => out.push('L'),
            _ => out.extend(c.to_uppercase().filter(|u| u.is_ascii_uppercase())),
        }
    }
    out
}

/// Linear 0..=weight points: rank 1 is near `weight`, `limit` and beyond is 0.
pub fn rank_points(rank: u32, limit: u32, weight: f64) -> f64 {
    if rank == 0 || limit == 0 || rank > limit {
        return 0.0;
    }
    weight * (1.0 - f64::from(rank) / f64::from(limit))
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Score one cleaned candidate against the rank tables.
pub fn score(
    name: &str,
    tables: &FrequencyTables,
    cfg: &MatchConfig,
    source: &str,
) -> Option<MatchRecord> {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => None,
        [single] => {
            if !cfg.allow_single_token {
                return None;
            }
            let tok = normalize_token(single);
            if tok.is_empty() || is_blocklisted(&tok) {
                return None;
            }
            let rank = *tables.surname.get(&tok)?;
            Some(MatchRecord {
                full_name: name.to_string(),
                score: round1(rank_points(rank, cfg.surname_limit, 50.0)),
                first_rank: None,
                surname_rank: Some(rank),
                source: source.to_string(),
                match_type: MatchType::SurnameOnlyWeak,
                status: MatchStatus::Valid,
                email: None,
                description: None,
                url: None,
            })
        }
        [first, .., last] => {
            let f = normalize_token(first);
            let l = normalize_token(last);
            if f.is_empty() || l.is_empty() || is_blocklisted(&f) || is_blocklisted(&l) {
                return None;
            }
            let rf = tables.first.get(&f).copied().unwrap_or(0);
            let rl = tables.surname.get(&l).copied().unwrap_or(0);
            let total = round1(
                rank_points(rf, cfg.first_limit, 50.0) + rank_points(rl, cfg.surname_limit, 50.0),
            );
            if total <= 5.0 {
                return None;
            }
            let match_type = match (rf > 0, rl > 0) {
                (true, true) => MatchType::Strong,
                (true, false) => MatchType::FirstOnly,
                _ => MatchType::SurnameOnly,
            };
            Some(MatchRecord {
                full_name: name.to_string(),
                score: total,
                first_rank: (rf > 0).then_some(rf),
                surname_rank: (rl > 0).then_some(rl),
                source: source.to_string(),
                match_type,
                status: MatchStatus::Valid,
                email: None,
                description: None,
                url: None,
            })
        }
    }
}
