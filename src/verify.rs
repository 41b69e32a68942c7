use std::collections::HashSet;
use std::path::PathBuf;

use tracing::info;

use crate::error::CrawlError;
use crate::matcher::{MatchRecord, MatchStatus};

/// Given scored full names, says which ones are not person names.
pub trait JunkClassifier {
    fn classify(&self, names: &[String]) -> Result<HashSet<String>, CrawlError>;
}

/// Verdicts produced elsewhere, one full name per line.
pub struct ListClassifier {
    pub path: PathBuf,
}

impl JunkClassifier for ListClassifier {
    fn classify(&self, names: &[String]) -> Result<HashSet<String>, CrawlError> {
        let text = std::fs::read_to_string(&self.path)?;
        let listed: HashSet<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        Ok(names
            .iter()
            .filter(|n| listed.contains(n.as_str()))
            .cloned()
            .collect())
    }
}

/// Mark junk, give it the -1 sentinel score and sink it below everything else.
/// Returns how many records were marked.
pub fn apply_junk_verdicts(
    matches: &mut [MatchRecord],
    classifier: &dyn JunkClassifier,
) -> Result<usize, CrawlError> {
    let names: Vec<String> = matches.iter().map(|m| m.full_name.clone()).collect();
    let junk = classifier.classify(&names)?;

    let mut marked = 0;
    for m in matches.iter_mut() {
        if junk.contains(&m.full_name) {
            m.status = MatchStatus::Junk;
            m.score = -1.0;
            marked += 1;
        } else if m.status == MatchStatus::Valid {
            m.status = MatchStatus::Verified;
        }
    }
    matches.sort_by(|a, b| {
        (a.status == MatchStatus::Junk)
            .cmp(&(b.status == MatchStatus::Junk))
            .then(b.score.total_cmp(&a.score))
    });
    info!(checked = names.len(), junk = marked, "verdicts applied");
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::matcher::MatchType;

    fn rec(name: &str, score: f64) -> MatchRecord {
        MatchRecord {
            full_name: name.into(),
            score,
            first_rank: None,
            surname_rank: Some(1),
            source: "Page 1".into(),
            match_type: MatchType::SurnameOnly,
            status: MatchStatus::Valid,
            email: None,
            description: None,
            url: None,
        }
    }

    struct Fixed(Vec<&'static str>);

    impl JunkClassifier for Fixed {
        fn classify(&self, _names: &[String]) -> Result<HashSet<String>, CrawlError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    #[test]
    fn junk_sinks_to_bottom() {
        let mut matches = vec![rec("Santos Building", 90.0), rec("Maria Santos", 80.0), rec("Ana Costa", 70.0)];
        let marked = apply_junk_verdicts(&mut matches, &Fixed(vec!["Santos Building"])).unwrap();
        assert_eq!(marked, 1);
        assert_eq!(matches[0].full_name, "Maria Santos");
        assert_eq!(matches[0].status, MatchStatus::Verified);
        let last = matches.last().unwrap();
        assert_eq!(last.full_name, "Santos Building");
        assert_eq!(last.status, MatchStatus::Junk);
        assert_eq!(last.score, -1.0);
    }

    #[test]
    fn list_file_verdicts() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# flagged\nSilva Hall\n\n  Costa Center  ").unwrap();
        let c = ListClassifier { path: f.path().to_path_buf() };
        let got = c
            .classify(&["Silva Hall".into(), "Maria Silva".into(), "Costa Center".into()])
            .unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.contains("Costa Center"));
    }

    #[test]
    fn missing_list_is_an_error() {
        let c = ListClassifier { path: "does/not/exist.txt".into() };
        assert!(matches!(c.classify(&[]), Err(CrawlError::Io(_))));
    }
}
