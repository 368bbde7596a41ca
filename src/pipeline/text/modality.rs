//! Imaging modality and image plane named in captions.

use std::collections::BTreeSet;

use super::clean::collapse_whitespace;
use crate::records::ImagePlane;

struct Modality {
    aliases: &'static [&'static str],
    long_name: &'static str,
    /// Each group is reported under its first phrase.
    subtypes: &'static [&'static [&'static str]],
}

const MODALITIES: [Modality; 6] = [
    Modality {
        aliases: &["ct ", "ct:", "ct-", " ct", " ct ", "(ct)", "computed tomography"],
        long_name: "Computed Tomography (CT)",
        subtypes: &[
            &["angiography"],
            &["chest"],
            &["head", "brain"],
            &["spinal", "spine"],
            &["segmentation"],
            &["non-contrast", "non contrast", "noncontrast", "w/o contrast"],
            &["contrast-enhanced", "contrast enhanced", "enhanced contrast"],
        ],
    },
    Modality {
        aliases: &[
            "mr ", " mr ", "mri ", "mri:", "mri-", " mri", " mri ", "(mri)",
            "magnetic resonance imaging",
        ],
        long_name: "Magnetic Resonance Imaging (MRI)",
        subtypes: &[
            &[" gadolinium ", " gad "],
            &["post-gadolinium", "post-gad", "post gad "],
            &["t1"],
            &["t2"],
            &["flair"],
            &["localizer"],
            &[" dwi ", "diffusion weighted"],
            &[" dti ", "diffusion tensor"],
        ],
    },
    Modality {
        aliases: &[" pet", "pet ", "pet:", "pet-", " pet ", "(pet)", "positron emission tomography"],
        long_name: "Positron Emission Tomography (PET)",
        subtypes: &[],
    },
    Modality {
        aliases: &["photograph"],
        long_name: "Photograph",
        subtypes: &[],
    },
    Modality {
        aliases: &["ultrasound"],
        long_name: "Ultrasound",
        subtypes: &[],
    },
    Modality {
        aliases: &["x-ray", "xray"],
        long_name: "X-Ray",
        subtypes: &[&["chest"], &["abdomen", "abdominal"]],
    },
];

/// Subtype pairs that cannot both describe one image; both are dropped.
const CONTRADICTIONS: [(&str, &str); 8] = [
    ("t1", "t2"),
    ("non-contrast", "contrast-enhanced"),
    ("gadolinium", "post-gadolinium"),
    ("chest", "abdomen"),
    ("head", "abdomen"),
    ("spinal", "abdomen"),
    ("head", "spinal"),
    ("chest", "head"),
];

fn drop_contradictions(mut subtypes: Vec<&'static str>) -> Vec<&'static str> {
    for (a, b) in CONTRADICTIONS {
        if subtypes.contains(&a) && subtypes.contains(&b) {
            subtypes.retain(|s| *s != a && *s != b);
        }
    }
    subtypes
}

impl Modality {
    fn describe(&self, source: &str) -> String {
        let found: Vec<&'static str> = self
            .subtypes
            .iter()
            .filter(|group| group.iter().any(|phrase| source.contains(phrase)))
            .map(|group| group[0].trim())
            .collect();

        let mut subtypes = drop_contradictions(found);
        if subtypes.is_empty() {
            return self.long_name.to_string();
        }
        subtypes.sort_unstable();
        format!("{}: {}", self.long_name, subtypes.join("; "))
    }
}

/// Modality descriptions found in one source.
fn modalities_in(text: &str) -> BTreeSet<String> {
    let source = collapse_whitespace(text).to_lowercase();
    MODALITIES
        .iter()
        .filter(|m| m.aliases.iter().any(|alias| source.contains(alias)))
        .map(|m| m.describe(&source))
        .collect()
}

/// Modality with subtypes, e.g. `"Magnetic Resonance Imaging (MRI): flair"`.
/// The first source naming any modality decides; more than one is ambiguous.
pub fn guess_modality(sources: &[Option<&str>]) -> Option<String> {
    let found = sources
        .iter()
        .flatten()
        .map(|s| modalities_in(s))
        .find(|set| !set.is_empty())?;

    if found.len() == 1 {
        found.into_iter().next()
    } else {
        None
    }
}

pub fn guess_plane(caption: Option<&str>) -> Option<ImagePlane> {
    let caption = collapse_whitespace(caption?).to_lowercase();
    let mut planes = ImagePlane::ALL
        .into_iter()
        .filter(|p| caption.contains(p.as_str()));
    let plane = planes.next()?;
    planes.next().is_none().then_some(plane)
}
