//! Whitespace, HTML and number-word normalization shared by the text heuristics.

use std::sync::LazyLock;

use regex::Regex;

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s\s+").unwrap());
static ANY_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace runs to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    MULTI_SPACE.replace_all(text, " ").trim().to_string()
}

/// Remove every whitespace character.
pub fn strip_whitespace(text: &str) -> String {
    ANY_SPACE.replace_all(text, "").into_owned()
}

/// Decode HTML entities, drop bullets and line breaks, collapse whitespace.
pub fn clean_html_entities(html: &str) -> String {
    let without_breaks = html.replace("&bull;", "").replace('\n', "");
    let decoded = html_escape::decode_html_entities(&without_breaks);
    collapse_whitespace(&decoded)
}

// ── Number words ─────────────────────────────────────────

const UNITS: [&str; 19] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
    "eighteen", "nineteen",
];

const TENS: [&str; 8] = [
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Highest number rendered from words.
pub const MAX_NUMBER_WORD: u32 = 130;

fn number_to_words(n: u32) -> String {
    match n {
        1..=19 => UNITS[(n - 1) as usize].to_string(),
        20..=99 => {
            let tens = TENS[(n / 10 - 2) as usize];
            match n % 10 {
                0 => tens.to_string(),
                unit => format!("{tens}-{}", UNITS[(unit - 1) as usize]),
            }
        }
        100 => "one hundred".to_string(),
        _ => format!("one hundred and {}", number_to_words(n - 100)),
    }
}

/// `(pattern, value)` for every number word, longest first so compounds win
/// over their prefixes ("twenty-five" before "twenty").
static NUMBER_WORDS: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    let mut words: Vec<(String, u32)> = (1..=MAX_NUMBER_WORD)
        .map(|n| (number_to_words(n), n))
        .collect();
    words.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.1.cmp(&b.1)));
    words
        .into_iter()
        .map(|(word, n)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(&word));
            (Regex::new(&pattern).unwrap(), n.to_string())
        })
        .collect()
});

/// Replace number words from one to one hundred and thirty with digits.
pub fn number_words_to_digits(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, digits) in NUMBER_WORDS.iter() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, digits.as_str()).into_owned();
        }
    }
    out
}

/// Normalize a captured number: keep digits and dots, collapse repeated dots,
/// reject anything with more than one decimal point.
pub fn parse_loose_number(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.starts_with('.') && digits.ends_with('.') {
        return None;
    }

    let mut collapsed = String::with_capacity(digits.len());
    for c in digits.chars() {
        if c == '.' && collapsed.ends_with('.') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.matches('.').count() > 1 {
        return None;
    }

    collapsed.trim_end_matches('.').parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_keeps_single_spaces() {
        assert_eq!(collapse_whitespace("  a   b\t\tc "), "a b c");
        assert_eq!(collapse_whitespace("a b"), "a b");
    }

    #[test]
    fn strip_removes_all_whitespace() {
        assert_eq!(strip_whitespace(" (1a) shows\nX. "), "(1a)showsX.");
    }

    #[test]
    fn html_entities_decoded() {
        assert_eq!(clean_html_entities("Fever &amp; cough&bull;\n  today"), "Fever & cough today");
        assert_eq!(clean_html_entities("&lt;5 cm"), "<5 cm");
    }

    #[test]
    fn number_word_spelling() {
        assert_eq!(number_to_words(7), "seven");
        assert_eq!(number_to_words(40), "forty");
        assert_eq!(number_to_words(25), "twenty-five");
        assert_eq!(number_to_words(100), "one hundred");
        assert_eq!(number_to_words(112), "one hundred and twelve");
        assert_eq!(number_to_words(130), "one hundred and thirty");
    }

    #[test]
    fn compound_words_replaced_whole() {
        assert_eq!(number_words_to_digits("a twenty-five year old"), "a 25 year old");
        assert_eq!(number_words_to_digits("Sixty Two"), "60 2");
    }

    #[test]
    fn words_inside_other_words_untouched() {
        assert_eq!(number_words_to_digits("someone often"), "someone often");
        assert_eq!(number_words_to_digits("ONE patient"), "1 patient");
    }

    #[test]
    fn loose_number_parsing() {
        assert_eq!(parse_loose_number("24 y"), Some(24.0));
        assert_eq!(parse_loose_number("24y.o."), Some(24.0));
        assert_eq!(parse_loose_number("2.5"), Some(2.5));
        assert_eq!(parse_loose_number("1.2.3"), None);
        assert_eq!(parse_loose_number("abc"), None);
    }
}
