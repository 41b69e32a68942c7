use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::vocab::{
    is_non_people_keyword, is_people_keyword, NAME_PARTICLES, NON_PEOPLE_KEYWORDS,
    PEOPLE_KEYWORDS, SUMMARY_PHRASES,
};

pub static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}").unwrap()
});
static COMMA_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-zÀ-ÖØ-öø-ÿ'\-\. ]{2,},\s*[A-Za-zÀ-ÖØ-öø-ÿ'\-\. ]{2,}$").unwrap()
});
static CAP_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-ZÀ-ÖØ-Þ][A-Za-zÀ-ÖØ-öø-ÿ'\-\.]*$").unwrap()
});
static HEADING_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-zÀ-ÖØ-öø-ÿ0-9 &,.'’:/()\-]+$").unwrap()
});
static PEOPLE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(PEOPLE_KEYWORDS));
static NON_PEOPLE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(NON_PEOPLE_KEYWORDS));

fn keyword_regex(words: &[&str]) -> Regex {
    let alts: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))).unwrap()
}

/// Score at which a block counts as the people list (with at least one email).
pub const USABLE_SCORE: i32 = 20;

/// How far below a person line its email may sit.
const EMAIL_LOOKAHEAD: usize = 6;

/// Descriptions longer than this are cut at a word boundary.
const MAX_DESCRIPTION_CHARS: usize = 180;

/// A titled run of rendered lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBlock {
    pub title: String,
    pub lines: Vec<String>,
    pub score: i32,
    pub email_count: usize,
    pub nameish_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PersonRecord {
    pub name: String,
    pub email: Option<String>,
    /// Job title or affiliation line under the name.
    pub description: Option<String>,
    /// Profile page, when the rendered page links the name.
    pub url: Option<String>,
}

pub fn first_email(s: &str) -> Option<&str> {
    EMAIL_RE.find(s).map(|m| m.as_str())
}

pub fn contains_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

/// Does this line read like a person's name?
pub fn is_nameish(line: &str) -> bool {
    let line = line.trim();
    let len = line.chars().count();
    if !(3..=90).contains(&len) {
        return false;
    }
    let low = line.to_lowercase();
    if SUMMARY_PHRASES.iter().any(|p| low.contains(p)) {
        return false;
    }
    if COMMA_NAME_RE.is_match(line) {
        return true;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if !(2..=7).contains(&tokens.len()) {
        return false;
    }
    let is_particle = |t: &str| NAME_PARTICLES.contains(&t.to_lowercase().as_str());
    let (first, last) = (tokens[0], tokens[tokens.len() - 1]);
    if is_particle(first) || is_particle(last) {
        return false;
    }
    tokens.iter().all(|t| is_particle(t) || CAP_TOKEN_RE.is_match(t))
}

fn is_heading(line: &str, lookahead: &[String]) -> bool {
    let len = line.chars().count();
    if !(3..=50).contains(&len) {
        return false;
    }
    if is_people_keyword(line) || is_non_people_keyword(line) {
        return true;
    }
    let low = line.to_lowercase();
    if low.contains("results") && len < 70 {
        return true;
    }

    let starts_ok = line.chars().next().is_some_and(char::is_uppercase) || low.starts_with("people");
    let spaces = line.chars().filter(|c| *c == ' ').count();
    // A short capitalised line right above an email is a job title, not a section.
    starts_ok
        && spaces <= 5
        && HEADING_CHARS_RE.is_match(line)
        && !is_nameish(line)
        && !lookahead.iter().take(2).any(|l| contains_email(l))
}

/// Split rendered page text into titled blocks.
pub fn segment(text: &str) -> Vec<TextBlock> {
    let lines: Vec<String> = text
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();

    let mut blocks = Vec::new();
    let mut current = TextBlock::default();

    for (i, line) in lines.iter().enumerate() {
        if is_heading(line, &lines[i + 1..]) {
            if !current.lines.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current.title = line.clone();
        } else {
            current.lines.push(line.clone());
        }
    }
    if !current.lines.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Fill in the counters and score of a block.
pub fn score_block(block: &mut TextBlock) {
    block.email_count = block.lines.iter().map(|l| EMAIL_RE.find_iter(l).count()).sum();
    block.nameish_count = block.lines.iter().filter(|l| is_nameish(l)).count();
    let has_mailto = block.lines.iter().any(|l| l.to_lowercase().contains("mailto:"));

    let mut score = 10 * block.email_count as i32 + 2 * block.nameish_count as i32;
    if has_mailto {
        score += 3;
    }
    if PEOPLE_TITLE_RE.is_match(&block.title) {
        score += 6;
    }
    if NON_PEOPLE_TITLE_RE.is_match(&block.title) {
        score -= 6;
    }
    block.score = score;
}

/// Score every block and keep the best positive one; ties go to the earlier block.
pub fn pick_best(mut blocks: Vec<TextBlock>) -> Option<TextBlock> {
    let mut best: Option<TextBlock> = None;
    for mut block in blocks.drain(..) {
        score_block(&mut block);
        if block.score <= 0 {
            continue;
        }
        if best.as_ref().map_or(true, |b| block.score > b.score) {
            best = Some(block);
        }
    }
    best
}

pub fn best_block(text: &str) -> Option<TextBlock> {
    pick_best(segment(text))
}

pub fn is_usable(block: &TextBlock) -> bool {
    block.score >= USABLE_SCORE && block.email_count >= 1
}

fn is_person_line(line: &str) -> bool {
    is_nameish(line) && !is_people_keyword(line) && !is_non_people_keyword(line)
}

fn is_description_line(line: &str) -> bool {
    line.chars().count() >= 3
        && !contains_email(line)
        && !line.to_lowercase().starts_with("mailto:")
        && !is_people_keyword(line)
        && !is_non_people_keyword(line)
}

fn truncate_description(line: &str) -> String {
    if line.chars().count() <= MAX_DESCRIPTION_CHARS {
        return line.to_string();
    }
    let head: String = line.chars().take(MAX_DESCRIPTION_CHARS).collect();
    let cut = head.rsplit_once(' ').map_or(head.as_str(), |(h, _)| h);
    format!("{}…", cut.trim_end())
}

/// Person lines of a block, each paired with the first email and the first
/// descriptive line below it. The window ends early at the next person line,
/// so one entry never borrows its neighbour's email.
pub fn extract_people(block: &TextBlock) -> Vec<PersonRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (i, line) in block.lines.iter().enumerate() {
        if !is_person_line(line) {
            continue;
        }
        let window: Vec<&String> = block.lines[i + 1..]
            .iter()
            .take(EMAIL_LOOKAHEAD)
            .take_while(|l| !is_person_line(l))
            .collect();
        let email = window.iter().find_map(|l| first_email(l)).map(str::to_string);
        if !seen.insert((line.clone(), email.clone())) {
            continue;
        }
        let description = window
            .iter()
            .find(|l| is_description_line(l))
            .map(|l| truncate_description(l));
        out.push(PersonRecord {
            name: line.clone(),
            email,
            description,
            url: None,
        });
    }
    out
}
