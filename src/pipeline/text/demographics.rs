//! Patient age, sex and ethnicity guessed from free text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::clean::{collapse_whitespace, number_words_to_digits, parse_loose_number};
use super::first_signal;
use crate::pipeline_config::{AgeReduction, TextConfig};
use crate::records::{Ethnicity, Sex};

// ═══════════════════════════════════════════════════════════
// Age
// ═══════════════════════════════════════════════════════════

/// Text that may directly follow a number to mark it as an age.
const AGE_MARKERS: [&str; 15] = [
    " y", "yo ", " yo ", "y.o.", "y/o", "year", "-year", " - year", " -year",
    "month old", " month old", "-month old", "months old", " months old", "-months old",
];

static AGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    AGE_MARKERS
        .iter()
        .map(|m| Regex::new(&format!(r"\d+{}", regex::escape(m))).unwrap())
        .collect()
});

/// "N year history" phrases describe the illness, not the patient.
static HISTORY_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d*\.?\d+[ -]?year history").unwrap());

/// Normalize number words, then drop illness-duration phrases.
fn strip_history_qualifiers(text: &str) -> String {
    let digits = number_words_to_digits(text);
    HISTORY_QUALIFIER.replace_all(&digits, "").trim().to_string()
}

/// Every number-plus-age-marker span in `text`, in marker order.
fn age_marker_matches(text: &str) -> Vec<String> {
    let cleaned = strip_history_qualifiers(text).to_lowercase();
    if cleaned.is_empty() {
        return Vec::new();
    }
    AGE_PATTERNS
        .iter()
        .flat_map(|p| p.find_iter(&cleaned).map(|m| m.as_str().to_string()))
        .collect()
}

/// Reduce one source's age mentions to a single age in years.
fn refine_ages(matches: &[String], config: &TextConfig) -> Option<f64> {
    let mut ages = Vec::with_capacity(matches.len());
    for m in matches {
        let value = parse_loose_number(m)?;
        if m.contains("month") {
            ages.push((value / 12.0 * 100.0).round() / 100.0);
        } else {
            ages.push(value);
        }
    }

    let bound = config.upper_age_bound;
    let valid: Vec<f64> = ages.iter().copied().filter(|a| *a <= bound).collect();
    if valid.is_empty() {
        return None;
    }

    let pool = match config.age_reduction {
        AgeReduction::Unfiltered => &ages,
        AgeReduction::Filtered => &valid,
    };
    pool.iter().copied().reduce(f64::max)
}

/// Age of the patient. The first source with any age mention decides,
/// even when its mentions do not reduce to a usable age.
pub fn guess_age(sources: &[Option<&str>], config: &TextConfig) -> Option<f64> {
    let matches = first_signal(sources, |s| {
        let found = age_marker_matches(s);
        (!found.is_empty()).then_some(found)
    })?;
    refine_ages(&matches, config)
}

// ═══════════════════════════════════════════════════════════
// Sex
// ═══════════════════════════════════════════════════════════

const FEMALE_TOKENS: [&str; 4] = ["female", "woman", "girl", " f "];
const MALE_TOKENS: [&str; 4] = ["male", "man", "boy", " m "];
/// Male tokens that are not substrings of a female token.
const MALE_EXCLUSIVE_TOKENS: [&str; 2] = ["boy", " m "];

fn token_count(text: &str, tokens: &[&str]) -> usize {
    tokens.iter().map(|t| text.matches(t).count()).sum()
}

/// Sex signalled by a single source. Contradictory sources yield `None`.
pub fn sex_from_text(text: &str) -> Option<Sex> {
    let lower = text.to_lowercase();
    let female = token_count(&lower, &FEMALE_TOKENS);
    let male_exclusive = token_count(&lower, &MALE_EXCLUSIVE_TOKENS);

    if female > 0 && male_exclusive > 0 {
        return None;
    }
    if female > 0 {
        Some(Sex::Female)
    } else if token_count(&lower, &MALE_TOKENS) > 0 {
        Some(Sex::Male)
    } else {
        None
    }
}

pub fn guess_sex(sources: &[Option<&str>]) -> Option<Sex> {
    first_signal(sources, sex_from_text)
}

// ═══════════════════════════════════════════════════════════
// Ethnicity
// ═══════════════════════════════════════════════════════════

const LONG_FORM_ETHNICITIES: [(Ethnicity, &[&str]); 8] = [
    (Ethnicity::Caucasian, &["caucasian", "white"]),
    (Ethnicity::Black, &["black", "african american"]),
    (Ethnicity::Latino, &["latino"]),
    (Ethnicity::Hispanic, &["hispanic"]),
    (Ethnicity::Asian, &["asian"]),
    (Ethnicity::NativeAmerican, &["native american"]),
    (Ethnicity::FirstNations, &["first nations"]),
    (Ethnicity::Aboriginal, &["aboriginal"]),
];

/// Case-sensitive clinical shorthand, e.g. "a 40 y/o BF".
const SHORT_FORM_ETHNICITIES: [(&str, Ethnicity, Sex); 6] = [
    (" AM ", Ethnicity::Asian, Sex::Male),
    (" AF ", Ethnicity::Asian, Sex::Female),
    (" BM ", Ethnicity::Black, Sex::Male),
    (" BF ", Ethnicity::Black, Sex::Female),
    (" WM ", Ethnicity::Caucasian, Sex::Male),
    (" WF ", Ethnicity::Caucasian, Sex::Female),
];

/// Ethnicity and abbreviation-implied sex from one source. Either half is
/// `None` when absent or when more than one value matched.
pub fn ethnicity_from_text(text: &str) -> (Option<Ethnicity>, Option<Sex>) {
    let cleaned = collapse_whitespace(text);
    let lower = cleaned.to_lowercase();

    let mut ethnicities = BTreeSet::new();
    let mut sexes = BTreeSet::new();

    for (ethnicity, aliases) in LONG_FORM_ETHNICITIES {
        for alias in aliases {
            // "asian" is a substring of "caucasian"
            let shadowed = *alias == "asian" && ethnicities.contains(&Ethnicity::Caucasian);
            if lower.contains(alias) && !shadowed {
                ethnicities.insert(ethnicity);
            }
        }
    }

    for (abbrev, ethnicity, sex) in SHORT_FORM_ETHNICITIES {
        if cleaned.contains(abbrev) {
            ethnicities.insert(ethnicity);
            sexes.insert(sex);
        }
    }

    let ethnicity = single(ethnicities);
    (ethnicity, single(sexes))
}

fn single<T: Ord>(set: BTreeSet<T>) -> Option<T> {
    if set.len() == 1 {
        set.into_iter().next()
    } else {
        None
    }
}

/// First source yielding either an ethnicity or an abbreviation sex.
pub fn guess_ethnicity(sources: &[Option<&str>]) -> (Option<Ethnicity>, Option<Sex>) {
    first_signal(sources, |s| match ethnicity_from_text(s) {
        (None, None) => None,
        found => Some(found),
    })
    .unwrap_or((None, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TextConfig {
        TextConfig::default()
    }

    #[test]
    fn age_from_years() {
        let age = guess_age(&[Some("taken from a 24 year old male")], &config());
        assert_eq!(age, Some(24.0));
    }

    #[test]
    fn age_from_months() {
        let age = guess_age(&[Some("a 6-month old infant")], &config());
        assert_eq!(age, Some(0.5));
    }

    #[test]
    fn age_from_number_words() {
        let age = guess_age(&[Some("A Forty-two y/o man")], &config());
        assert_eq!(age, Some(42.0));
    }

    #[test]
    fn illness_history_is_not_an_age() {
        let age = guess_age(
            &[Some("5 year history of seizures in a 30 yo woman")],
            &config(),
        );
        assert_eq!(age, Some(30.0));
    }

    #[test]
    fn spelled_history_is_not_an_age() {
        let age = guess_age(&[Some("ten year history of pain, 61 y/o")], &config());
        assert_eq!(age, Some(61.0));
    }

    #[test]
    fn first_source_with_mentions_wins() {
        let age = guess_age(
            &[None, Some("no age here"), Some("an 8 year old"), Some("a 70 year old")],
            &config(),
        );
        assert_eq!(age, Some(8.0));
    }

    #[test]
    fn unfiltered_reduction_keeps_out_of_range_max() {
        let text = "a 40 year old, follow-up at 200 years";
        assert_eq!(guess_age(&[Some(text)], &config()), Some(200.0));

        let filtered = TextConfig {
            age_reduction: AgeReduction::Filtered,
            ..config()
        };
        assert_eq!(guess_age(&[Some(text)], &filtered), Some(40.0));
    }

    #[test]
    fn all_out_of_range_is_none() {
        assert_eq!(guess_age(&[Some("a 500 year old tree")], &config()), None);
    }

    #[test]
    fn no_sources_no_age() {
        assert_eq!(guess_age(&[None, None], &config()), None);
    }

    #[test]
    fn sex_male_and_female() {
        assert_eq!(sex_from_text("taken from a 24 year old male"), Some(Sex::Male));
        assert_eq!(sex_from_text("A young Woman presented"), Some(Sex::Female));
        assert_eq!(sex_from_text("no information"), None);
    }

    #[test]
    fn female_contains_male_is_not_a_conflict() {
        assert_eq!(sex_from_text("female patient"), Some(Sex::Female));
    }

    #[test]
    fn contradictory_source_yields_none() {
        assert_eq!(sex_from_text("female twin and her brother, a boy"), None);
        assert_eq!(sex_from_text("patients: 40 f and 52 m with lesions"), None);
    }

    #[test]
    fn contradictory_source_falls_through_to_next() {
        let sex = guess_sex(&[Some("girl and boy"), Some("elderly man")]);
        assert_eq!(sex, Some(Sex::Male));
    }

    #[test]
    fn long_form_ethnicity() {
        assert_eq!(
            ethnicity_from_text("a Hispanic patient"),
            (Some(Ethnicity::Hispanic), None)
        );
    }

    #[test]
    fn caucasian_does_not_imply_asian() {
        assert_eq!(
            ethnicity_from_text("caucasian woman"),
            (Some(Ethnicity::Caucasian), None)
        );
    }

    #[test]
    fn abbreviation_gives_ethnicity_and_sex() {
        assert_eq!(
            ethnicity_from_text("History: 45 yo BF with cough"),
            (Some(Ethnicity::Black), Some(Sex::Female))
        );
    }

    #[test]
    fn multiple_ethnicities_ambiguous() {
        assert_eq!(ethnicity_from_text("latino and asian siblings").0, None);
    }

    #[test]
    fn ethnicity_first_informative_source() {
        let found = guess_ethnicity(&[Some("nothing"), None, Some("a 30 WM with fever")]);
        assert_eq!(found, (Some(Ethnicity::Caucasian), Some(Sex::Male)));
        assert_eq!(guess_ethnicity(&[None]), (None, None));
    }
}
