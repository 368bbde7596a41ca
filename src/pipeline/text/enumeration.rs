//! Caption enumeration markers ("(1a)", "2.") as evidence of multi-panel
//! grid images, plus the arrow annotation check.

use super::clean::strip_whitespace;
use crate::records::ImageProblem;

const OPENERS: [char; 2] = ['(', '['];
const CLOSERS: [char; 3] = ['.', ')', ']'];

/// Short bracket- or period-delimited tokens in `caption`, lower-cased.
pub fn extract_enumerations(caption: &str) -> Vec<String> {
    let mut cleaned = strip_whitespace(caption).replace('-', "").to_lowercase();
    if cleaned.is_empty() {
        return Vec::new();
    }
    if !cleaned.ends_with(CLOSERS) {
        cleaned.push(')');
    }

    let mut enumerations = Vec::new();
    let mut candidate = String::new();
    for c in cleaned.chars() {
        if OPENERS.contains(&c) {
            candidate.clear();
        } else if !CLOSERS.contains(&c) {
            candidate.push(c);
        } else {
            if is_marker_candidate(&candidate) {
                enumerations.push(candidate.clone());
            }
            candidate.clear();
        }
    }
    enumerations
}

fn is_marker_candidate(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if len == 0 || len > 2 || !candidate.chars().all(char::is_alphanumeric) {
        return false;
    }
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    let alpha = candidate.chars().filter(|c| c.is_alphabetic()).count();
    digits <= 2 && alpha <= 3
}

/// One digit, or all letters, or one digit plus one letter ("2a").
fn mixed_marker(item: &str) -> bool {
    let len = item.chars().count();
    let digits = item.chars().filter(char::is_ascii_digit).count();
    let alpha = item.chars().filter(|c| c.is_alphabetic()).count();
    (len == 1 && digits == 1)
        || (len > 0 && alpha == len)
        || (len == 2 && digits == 1 && alpha == 1)
}

/// Whether `items` reads like a real enumeration: roman numerals, letters
/// a.., integers 1.., or digit/letter mixes.
pub fn is_enumeration(items: &[String]) -> bool {
    if items.iter().take(3).all(|i| matches!(i.as_str(), "i" | "ii" | "iii")) {
        return true;
    }
    if items
        .iter()
        .zip('a'..='z')
        .all(|(item, letter)| item.len() == 1 && item.starts_with(letter))
        && items.len() <= 26
    {
        return true;
    }
    if items.iter().all(|i| i.chars().all(char::is_alphabetic)) {
        return false;
    }
    if items
        .iter()
        .enumerate()
        .all(|(n, item)| *item == (n + 1).to_string())
    {
        return true;
    }
    items.iter().all(|i| mixed_marker(i))
}

/// Problem tags suggested by a caption, or `None` when there are none.
pub fn caption_problems(caption: &str, grid_threshold: usize) -> Option<Vec<ImageProblem>> {
    let mut problems = Vec::new();

    if caption.contains(" arrow") {
        problems.push(ImageProblem::Arrows);
    }

    let enumerations = extract_enumerations(caption);
    if is_enumeration(&enumerations) && enumerations.len() >= grid_threshold {
        problems.push(ImageProblem::Grids);
    }

    (!problems.is_empty()).then_some(problems)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_bracketed_and_period_markers() {
        assert_eq!(
            extract_enumerations("(1a) here we see... 2. whereas here we see"),
            strings(&["1a", "2"])
        );
    }

    #[test]
    fn long_tokens_ignored() {
        assert_eq!(extract_enumerations("Shows mass (arrow)."), Vec::<String>::new());
    }

    #[test]
    fn empty_caption_has_no_markers() {
        assert!(extract_enumerations("   ").is_empty());
    }

    #[test]
    fn enumeration_patterns() {
        assert!(is_enumeration(&strings(&["1", "2", "3"])));
        assert!(is_enumeration(&strings(&["a", "b", "c"])));
        assert!(is_enumeration(&strings(&["i", "ii", "iii", "iv"])));
        assert!(is_enumeration(&strings(&["1a", "1b", "1c"])));
        assert!(!is_enumeration(&strings(&["a", "ml", "jp"])));
        assert!(!is_enumeration(&strings(&["1a", "12"])));
    }

    #[test]
    fn grid_caption_tagged() {
        let problems = caption_problems("(1a) shows X. (1b) shows Y. (1c) shows Z.", 2);
        assert_eq!(problems, Some(vec![ImageProblem::Grids]));
    }

    #[test]
    fn single_marker_is_not_a_grid() {
        assert_eq!(caption_problems("(1a)", 2), None);
    }

    #[test]
    fn arrows_and_grids_co_occur() {
        let problems = caption_problems("A. lesion (see arrows) B. after treatment", 2);
        assert_eq!(problems, Some(vec![ImageProblem::Arrows, ImageProblem::Grids]));
    }

    #[test]
    fn arrow_must_follow_space() {
        assert_eq!(caption_problems("Narrow lumen", 2), None);
    }
}
