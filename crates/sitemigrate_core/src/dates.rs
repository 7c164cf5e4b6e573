use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

// "Month Day[st|nd|rd|th], Year[,] rest of title", anchored at the start.
static LEADING_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][a-z]+\s+\d+(?:st|nd|rd|th)?,\s+\d{4}),?\s*((?s).*)").unwrap()
});
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(st|nd|rd|th)").unwrap());

const DATE_FORMATS: [&str; 2] = ["%B %d, %Y", "%b %d, %Y"];

/// A heading split into its leading date phrase and the remaining title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSplit {
    /// The date phrase exactly as written in the heading.
    pub display: Option<String>,
    pub date: Option<NaiveDate>,
    /// Title without the date phrase, or the whole heading when undated.
    pub title: String,
}

impl DateSplit {
    fn undated(heading: &str) -> Self {
        Self {
            display: None,
            date: None,
            title: heading.to_string(),
        }
    }
}

/// Split a leading date phrase off `heading`. Only the first match at the
/// start of the heading is considered. A phrase that looks like a date but
/// does not parse leaves the heading undated and untouched.
pub fn split_leading_date(heading: &str) -> DateSplit {
    let Some(captures) = LEADING_DATE_RE.captures(heading) else {
        return DateSplit::undated(heading);
    };
    let phrase = captures.get(1).map_or("", |m| m.as_str());
    let Some(date) = strip_ordinal_and_parse(phrase) else {
        return DateSplit::undated(heading);
    };
    let rest = captures.get(2).map_or("", |m| m.as_str());
    DateSplit {
        display: Some(phrase.to_string()),
        date: Some(date),
        title: rest.trim().to_string(),
    }
}

/// Parse `"August 22nd, 2025"` or `"Aug 22, 2025"` style phrases.
pub fn strip_ordinal_and_parse(phrase: &str) -> Option<NaiveDate> {
    let cleaned = ORDINAL_RE.replace_all(phrase, "${1}");
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}
