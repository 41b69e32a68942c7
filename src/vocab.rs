//! Word lists the heuristics run on. Kept apart from the algorithms so they
//! can be reviewed and extended without touching control flow.

/// Bumped whenever any list below changes meaningfully.
pub const VOCAB_VERSION: u32 = 3;

/// Substrings (matched against the uppercased text) that disqualify a
/// fragment from being a person name.
pub const JUNK_PHRASES: &[&str] = &[
    "RESULTS FOR", "SEARCH", "WEBSITE", "EDITION", "SPOTLIGHT", "EXPERIENCE",
    "MENU", "SKIP TO", "CONTENT", "FOOTER", "HEADER", "OVERVIEW", "PROJECTS",
    "PEOPLE", "VIEW", "CONTACT", "READ MORE", "LEARN MORE",
    "UNIVERSITY", "INSTITUTE", "SCHOOL", "DEPARTMENT", "COLLEGE", "PROGRAM",
    "INITIATIVE", "LABORATORY", "CENTER FOR", "CENTRE FOR", "ALUMNI",
    "DIRECTORY", "MBA", "PHD", "MSC", "CLASS OF", "EDUCATION", "INNOVATION",
    "CAMPUS LIFE", "LIFELONG LEARNING", "GIVE", "HOME", "VISIT", "MAP", "EVENTS",
    "JOBS", "PRIVACY", "ACCESSIBILITY", "SOCIAL MEDIA", "TERMS OF USE",
    "COPYRIGHT", "BRASIL", "BRAZIL", "USA", "UNITED STATES",
    "JANUARY", "FEBRUARY", "MARCH", "APRIL", "MAY", "JUNE", "JULY", "AUGUST",
    "SEPTEMBER", "OCTOBER", "NOVEMBER", "DECEMBER",
];

/// Normalised tokens that are too common across populations (or are plain
/// navigation words) to carry any signal.
pub const BLOCKLIST_TOKENS: &[&str] = &[
    "WANG", "LI", "ZHANG", "LIU", "CHEN", "YANG", "HUANG", "ZHAO", "WU", "ZHOU",
    "XU", "SUN", "MA", "ZHU", "HU", "GUO", "HE", "GAO", "LIN", "LUO",
    "LIANG", "SONG", "TANG", "ZHENG", "HAN", "FENG", "DONG", "YE", "YU", "WEI",
    "CAI", "YUAN", "PAN", "DU", "DAI", "JIN", "FAN", "SU", "MAN", "WONG",
    "CHAN", "CHANG", "LEE", "KIM", "PARK", "CHOI", "NG", "HO", "CHOW", "LAU",
    "SINGH", "PATEL", "KUMAR", "SHARMA", "GUPTA", "ALI", "KHAN", "TRAN", "NGUYEN",
    "RESULTS", "WEBSITE", "SEARCH", "MENU", "SKIP", "CONTENT", "FOOTER", "HEADER",
    "OVERVIEW", "PROJECTS", "PEOPLE", "PROFILE", "VIEW", "CONTACT", "SPOTLIGHT",
    "PDF", "LOGIN", "SIGNUP", "HOME", "ABOUT", "CAREERS", "NEWS", "EVENTS",
];

/// Exact (lowercased) labels of a "next page" control.
pub const NEXT_TEXTS: &[&str] = &["next", "next page", "older", "more", ">", "›", "»"];

/// Query keys the pagination fallback knows how to bump.
pub const PAGE_PARAMS: &[&str] = &["page", "p", "pg", "start", "offset"];

/// Section titles that announce a list of people.
pub const PEOPLE_KEYWORDS: &[&str] = &[
    "people", "people results", "directory", "people directory", "staff",
    "faculty", "faculty & staff", "faculty and staff", "profiles", "persons",
    "students", "employees", "members", "our team", "team", "researchers",
    "contacts",
];

/// Section titles that announce anything but people.
pub const NON_PEOPLE_KEYWORDS: &[&str] = &[
    "news", "events", "pages", "documents", "files", "courses", "programs",
    "publications", "articles", "web results", "websites", "locations",
    "departments", "videos", "images", "related searches", "quick links",
];

/// Phrases of a result summary line ("12 results for ...") rather than a person.
pub const SUMMARY_PHRASES: &[&str] = &[
    "results", "result for", "showing", "matches", "found", "page", "of about",
];

/// Name particles allowed between first and last name tokens.
pub const NAME_PARTICLES: &[&str] = &[
    "da", "de", "do", "dos", "das", "del", "della", "di", "van", "von", "bin", "ibn",
];

/// Rendered-text phrases of an empty search result.
pub const NO_RESULTS_PHRASES: &[&str] = &[
    "no results", "0 results", "zero results", "no matches", "no match",
    "nothing found", "did not match any", "we couldn't find", "we could not find",
    "try a different search", "no records found", "no entries found",
    "no people found", "no profiles found", "your search returned no results",
];

/// Keyword weights of a people tab or filter control.
pub const PEOPLE_TAB_WEIGHTS: &[(&str, u32)] = &[
    ("people", 10),
    ("directory", 8),
    ("staff", 6),
    ("faculty", 6),
    ("students", 5),
    ("profiles", 5),
    ("employees", 5),
];

/// A tab is only clicked when its label scores at least this much.
pub const PEOPLE_TAB_THRESHOLD: u32 = 8;

/// Search inputs, most specific first.
pub const SEARCH_INPUT_SELECTORS: &[&str] = &[
    "input[type='search']",
    "input[name='q']",
    "input[name='query']",
    "input[name='search']",
    "input[name='s']",
    "input[aria-label*='search' i]",
    "input[placeholder*='search' i]",
    "input[placeholder*='name' i]",
    "input[placeholder*='last' i]",
];

/// Input types never typed into.
pub const NON_TEXT_INPUT_TYPES: &[&str] = &[
    "hidden", "submit", "button", "checkbox", "radio", "file", "password", "image", "reset",
];

pub const SUBMIT_SELECTORS: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "button[aria-label*='search' i]",
    "button[class*='search' i]",
];

pub const TAB_SELECTORS: &[&str] = &["[role='tab']", "a", "button", "[role='button']"];

/// Structural selectors for name candidates, tried after the table pass.
pub const NAME_SELECTORS: &[&str] = &[
    "h2",
    "h3",
    "h4",
    "[class*='person'] a, [class*='person'] [class*='name']",
    "[class*='profile'] a, [class*='profile'] [class*='name']",
    "[class*='result'] a, [class*='result'] [class*='name']",
    "[class*='name']",
    "a",
    "strong",
    "b",
];

/// Input names a search form is most likely to use for its query.
pub const SEARCH_PARAM_NAMES: &[&str] = &["q", "query", "search", "name", "keyword", "term"];

/// Form action fragments hinting at a people search.
pub const SEARCH_ACTION_HINTS: &[&str] = &["search", "directory", "people", "staff", "student"];

pub fn is_people_keyword(s: &str) -> bool {
    let low = s.trim().to_lowercase();
    PEOPLE_KEYWORDS.iter().any(|k| *k == low)
}

pub fn is_non_people_keyword(s: &str) -> bool {
    let low = s.trim().to_lowercase();
    NON_PEOPLE_KEYWORDS.iter().any(|k| *k == low)
}

pub fn is_blocklisted(normalized: &str) -> bool {
    BLOCKLIST_TOKENS.contains(&normalized)
}
