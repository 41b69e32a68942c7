use std::sync::LazyLock;

use regex::Regex;

use crate::vocab::JUNK_PHRASES;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-zÀ-ÖØ-öø-ÿ'\-\.]+(?:\s+[A-Za-zÀ-ÖØ-öø-ÿ'\-\.]+){0,6}$").unwrap()
});
static CUT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[|–—»()]|\s-\s").unwrap());

const WEB_MARKERS: &[&str] = &["@", ".com", ".org", ".edu", ".net", "http", "www"];

/// Cleaner settings that vary per run.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    blocked: Option<Regex>,
}

impl CleanOptions {
    /// Reject any text containing `token` as a whole word (case-insensitive).
    pub fn with_blocked_token(token: Option<&str>) -> Self {
        let blocked = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .and_then(|t| {
                Regex::new(&format!(r"\b{}\b", regex::escape(&t.to_uppercase()))).ok()
            });
        CleanOptions { blocked }
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_junk(text: &str, opts: &CleanOptions) -> bool {
    let upper = text.to_uppercase();
    JUNK_PHRASES.iter().any(|p| upper.contains(p))
        || opts.blocked.as_ref().is_some_and(|re| re.is_match(&upper))
}

/// Turn a raw text fragment into a person-name candidate, or reject it.
pub fn clean(raw: &str, opts: &CleanOptions) -> Option<String> {
    let mut text = collapse(raw);
    if text.is_empty() || is_junk(&text, opts) {
        return None;
    }

    // "Santos, Maria Clara" -> "Maria Clara Santos"
    if text.contains(',') {
        let parts: Vec<&str> = text.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            text = format!("{} {}", parts[1], parts[0]);
        }
    }

    if let Some((_, after)) = text.split_once(':') {
        text = after.to_string();
    }

    let head = CUT_RE.split(&text).next().unwrap_or("");
    let clean = collapse(head);

    if clean.chars().count() < 3 || clean.split_whitespace().count() > 7 {
        return None;
    }
    // The reorder can assemble a junk phrase ("More, Learn").
    if is_junk(&clean, opts) {
        return None;
    }
    let lower = clean.to_lowercase();
    if WEB_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    if !NAME_RE.is_match(&clean) {
        return None;
    }
    Some(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Option<String> {
        clean(s, &CleanOptions::default())
    }

    #[test]
    fn reorders_surname_first() {
        assert_eq!(c("Santos, Maria").as_deref(), Some("Maria Santos"));
        assert_eq!(c("Oliveira,  Ana Paula").as_deref(), Some("Ana Paula Oliveira"));
    }

    #[test]
    fn rejects_navigation_and_emails() {
        assert_eq!(c("Skip to Content"), None);
        assert_eq!(c("contact@example.edu"), None);
        assert_eq!(c("   "), None);
        assert_eq!(c("Read more"), None);
        assert_eq!(c("Posted March 3"), None);
    }

    #[test]
    fn rejects_web_markers() {
        assert_eq!(c("maria.santos@uni"), None);
        assert_eq!(c("Maria Santos www"), None);
        assert_eq!(c("santos.com"), None);
    }

    #[test]
    fn titles_are_not_special_cased() {
        assert_eq!(
            c("Dr. MARIA SANTOS | Faculty Profile").as_deref(),
            Some("Dr. MARIA SANTOS")
        );
    }

    #[test]
    fn truncates_at_separators() {
        assert_eq!(c("João Silva - Professor").as_deref(), Some("João Silva"));
        assert_eq!(c("Ana Costa (she/her)").as_deref(), Some("Ana Costa"));
        assert_eq!(c("Advisor: Pedro Alves").as_deref(), Some("Pedro Alves"));
        assert_eq!(c("Mary-Kate O'Neil").as_deref(), Some("Mary-Kate O'Neil"));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(c("Al"), None);
        assert_eq!(c("one two three four five six seven eight"), None);
        assert_eq!(c("Room 204"), None);
        assert_eq!(c("Maria & Co"), None);
    }

    #[test]
    fn accepts_latin1_accents() {
        assert_eq!(c("Conceição Araújo").as_deref(), Some("Conceição Araújo"));
    }

    #[test]
    fn blocked_token_is_whole_word() {
        let opts = CleanOptions::with_blocked_token(Some("mit"));
        assert_eq!(clean("Maria Santos MIT", &opts), None);
        assert_eq!(clean("Smith Mitchell", &opts).as_deref(), Some("Smith Mitchell"));
    }

    #[test]
    fn idempotent_on_survivors() {
        for raw in [
            "Santos, Maria",
            "Dr. MARIA SANTOS | Faculty Profile",
            "Advisor: Pedro Alves",
            "  João   da  Silva ",
            "Ana Costa (she/her)",
        ] {
            let once = c(raw).unwrap();
            assert_eq!(c(&once).as_deref(), Some(once.as_str()), "input {:?}", raw);
        }
    }

    #[test]
    fn reorder_cannot_build_junk() {
        assert_eq!(c("More, Learn"), None);
        assert_eq!(c("To, Skip"), None);
        assert_eq!(c("Of, Class"), None);
        assert_eq!(c("Note: Read More"), None);

        let opts = CleanOptions::with_blocked_token(Some("ana costa"));
        assert_eq!(clean("Costa, Ana", &opts), None);
        assert_eq!(clean("Costa, Maria", &opts).as_deref(), Some("Maria Costa"));
    }

    #[test]
    fn idempotent_on_reordered_inputs() {
        for raw in [
            "More, Learn",
            "To, Skip",
            "Of, Class",
            "Us, Contact",
            "Santos, Maria",
            "Silva,  Joao | Dean",
            "Staff: Costa, Ana",
            "Alves,",
        ] {
            if let Some(once) = c(raw) {
                assert_eq!(c(&once).as_deref(), Some(once.as_str()), "input {:?}", raw);
            }
        }
    }
}
