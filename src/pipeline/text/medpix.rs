//! Section extraction for the single-institution teaching archive, whose
//! abstracts carry `History`, `Findings` and `Diagnosis` as tagged paragraphs.

use std::sync::LazyLock;

use regex::Regex;

use super::clean::{clean_html_entities, collapse_whitespace};

/// Journal-title marker identifying records from the tagged-abstract archive.
const ARCHIVE_MARKER: &str = "medpix";

#[derive(Debug, Clone, Copy)]
enum Section {
    History,
    Findings,
    Diagnosis,
}

impl Section {
    fn pattern(&self) -> &'static Regex {
        static HISTORY: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"<p><b>History: </b>(.*?)</p><p>").unwrap());
        static FINDINGS: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"<p><b>Findings: </b>(.*?)</p><p>").unwrap());
        static DIAGNOSIS: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"<p><b>Diagnosis: </b>(.*?)</p><p>").unwrap());

        match self {
            Section::History => &HISTORY,
            Section::Findings => &FINDINGS,
            Section::Diagnosis => &DIAGNOSIS,
        }
    }
}

/// Sections pulled from a tagged abstract. Each is `None` unless its tag
/// occurs exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveSections {
    pub history: Option<String>,
    pub findings: Option<String>,
    pub diagnosis: Option<String>,
}

pub fn is_tagged_archive(journal_title: Option<&str>) -> bool {
    journal_title.is_some_and(|t| t.to_lowercase().contains(ARCHIVE_MARKER))
}

pub fn extract_sections(abstract_text: Option<&str>) -> ArchiveSections {
    let Some(text) = abstract_text else {
        return ArchiveSections::default();
    };
    let cleaned = collapse_whitespace(text);

    ArchiveSections {
        history: extract_section(&cleaned, Section::History),
        findings: extract_section(&cleaned, Section::Findings),
        diagnosis: extract_section(&cleaned, Section::Diagnosis).map(|d| d.to_lowercase()),
    }
}

fn extract_section(text: &str, section: Section) -> Option<String> {
    let mut captures = section.pattern().captures_iter(text);
    let first = captures.next()?.get(1)?.as_str();
    if captures.next().is_some() {
        return None;
    }
    Some(clean_html_entities(first))
}
