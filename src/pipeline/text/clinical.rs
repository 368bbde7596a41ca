//! Diagnosis lookup and illness-duration extraction.

use std::sync::LazyLock;

use regex::Regex;

use super::clean::{collapse_whitespace, parse_loose_number};
use super::first_signal;

/// Lower-cased disease names searched for in record text.
#[derive(Debug, Clone, Default)]
pub struct DiseaseVocabulary {
    names: Vec<String>,
}

impl DiseaseVocabulary {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self { names }
    }

    /// One name per line; blank lines ignored.
    pub fn from_lines(text: &str) -> Self {
        Self::new(text.lines())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn matches_in<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.names
            .iter()
            .filter(|name| text.contains(name.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Disease named in the first source mentioning any vocabulary entry.
/// Ambiguous sources (two or more names) yield `None` without falling through.
pub fn guess_disease(sources: &[Option<&str>], vocabulary: &DiseaseVocabulary) -> Option<String> {
    let candidates = first_signal(sources, |s| {
        let lower = collapse_whitespace(s).to_lowercase();
        let found = vocabulary.matches_in(&lower);
        (!found.is_empty()).then_some(found)
    })?;

    match candidates.as_slice() {
        [only] => Some(only.to_string()),
        _ => None,
    }
}

// ── Illness duration ─────────────────────────────────────

static MONTH_HISTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d*\.?\d+) month history of").unwrap());
static YEAR_HISTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d*\.?\d+) year history of").unwrap());

/// Duration in years if `pattern` matches exactly once.
fn single_duration(pattern: &Regex, text: &str, months: bool) -> Option<f64> {
    let mut hits = pattern.captures_iter(text);
    let value = hits.next()?.get(1)?.as_str();
    if hits.next().is_some() {
        return None;
    }
    let value = parse_loose_number(value)?;
    let years = if months { value / 12.0 } else { value };
    (years != 0.0).then_some(years)
}

/// Illness duration stated in one source, e.g. "a 3-year history of".
pub fn duration_from_text(text: &str) -> Option<f64> {
    let cleaned = collapse_whitespace(&text.replace('-', " "));
    let durations: Vec<f64> = [
        single_duration(&MONTH_HISTORY, &cleaned, true),
        single_duration(&YEAR_HISTORY, &cleaned, false),
    ]
    .into_iter()
    .flatten()
    .collect();

    match durations.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

pub fn guess_illness_duration(sources: &[Option<&str>]) -> Option<f64> {
    first_signal(sources, duration_from_text)
}
