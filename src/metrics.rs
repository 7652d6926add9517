//! Text scoring for model responses.
//!
//! All functions here are pure: the same `(source, generated)` pair always
//! produces the same scores, with no I/O and no randomness.
//!
//! - **Marker retention**: share of the dialect markers found in the source
//!   that survive into the generated text
//! - **Length ratio**: generated token count over source token count
//! - **Similarity**: cosine similarity of bag-of-words term counts

use crate::stimuli::{Stimulus, Variety};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Split text into lowercase word tokens.
///
/// Tokens are runs of alphanumeric characters and apostrophes. Leading and
/// trailing apostrophes are trimmed, so `gon'` and `gon` compare equal.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '\u{2019}'))
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('\u{2019}', "'"))
        .collect()
}

/// Check whether `needle` occurs as a contiguous run inside `haystack`
fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Count markers present in the source and how many of those survive.
///
/// Returns `(present_in_source, retained_in_generated)`. Duplicate markers
/// (after tokenisation) are counted once.
#[must_use]
pub fn marker_counts<S: AsRef<str>>(source: &str, generated: &str, markers: &[S]) -> (usize, usize) {
    let source_tokens = tokenize(source);
    let generated_tokens = tokenize(generated);

    let mut seen: Vec<Vec<String>> = Vec::with_capacity(markers.len());
    let mut present = 0;
    let mut retained = 0;

    for marker in markers {
        let marker_tokens = tokenize(marker.as_ref());
        if marker_tokens.is_empty() || seen.contains(&marker_tokens) {
            continue;
        }
        if contains_sequence(&source_tokens, &marker_tokens) {
            present += 1;
            if contains_sequence(&generated_tokens, &marker_tokens) {
                retained += 1;
            }
        }
        seen.push(marker_tokens);
    }

    (present, retained)
}

/// Fraction of source-present markers that also appear in the generated text.
///
/// Returns `None` when the source contains none of the markers: retention is
/// not applicable there and such records are left out of averages.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn marker_retention<S: AsRef<str>>(source: &str, generated: &str, markers: &[S]) -> Option<f64> {
    let (present, retained) = marker_counts(source, generated, markers);
    if present == 0 {
        return None;
    }
    Some(retained as f64 / present as f64)
}

/// Generated token count divided by source token count (minimum 1)
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn length_ratio(source: &str, generated: &str) -> f64 {
    let source_len = tokenize(source).len().max(1);
    tokenize(generated).len() as f64 / source_len as f64
}

fn term_counts(tokens: Vec<String>) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for t in tokens {
        *counts.entry(t).or_insert(0) += 1;
    }
    counts
}

/// Cosine similarity over bag-of-words term counts, in `[0, 1]`.
///
/// Two empty texts are identical (1.0); one empty text shares nothing (0.0).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(source: &str, generated: &str) -> f64 {
    let a = term_counts(tokenize(source));
    let b = term_counts(tokenize(generated));

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    // Integer sums keep the result independent of map iteration order
    let dot: u64 = a
        .iter()
        .filter_map(|(term, ca)| b.get(term).map(|cb| ca * cb))
        .sum();
    let norm_a: u64 = a.values().map(|c| c * c).sum();
    let norm_b: u64 = b.values().map(|c| c * c).sum();

    let denom = ((norm_a as f64) * (norm_b as f64)).sqrt();
    if denom <= 0.0 {
        return 0.0;
    }
    (dot as f64 / denom).clamp(0.0, 1.0)
}

/// All scores for one (source, generated) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Markers found in the source text
    pub markers_in_source: usize,
    /// Of those, markers also found in the generated text
    pub markers_retained: usize,
    /// `markers_retained / markers_in_source`, `None` when no markers apply
    pub marker_retention: Option<f64>,
    pub length_ratio: f64,
    pub similarity: f64,
}

/// Compute every score for a pair in one pass
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score<S: AsRef<str>>(source: &str, generated: &str, markers: &[S]) -> Scores {
    let (present, retained) = marker_counts(source, generated, markers);
    Scores {
        markers_in_source: present,
        markers_retained: retained,
        marker_retention: (present > 0).then(|| retained as f64 / present as f64),
        length_ratio: length_ratio(source, generated),
        similarity: similarity(source, generated),
    }
}

/// Default dialect markers per language variety.
///
/// Standard English is the control group and has no markers, so its
/// retention is always not applicable unless a stimulus supplies its own.
#[derive(Debug, Clone)]
pub struct MarkerLexicon {
    markers: HashMap<Variety, Vec<String>>,
}

const AAVE_MARKERS: &[&str] = &[
    "be", "finna", "tryna", "ion", "gon", "sliding", "yo", "real quick", "ain't", "y'all",
    "we was", "lowkey", "deadass", "no cap", "bussin",
];

const SPANGLISH_MARKERS: &[&str] = &[
    "hola", "cómo", "bien", "gracias", "vamos", "muy", "la tienda", "entiendo", "pero",
    "en el", "parque", "mañana", "pues", "oye", "qué", "sí",
];

const BRENG_MARKERS: &[&str] = &[
    "brilliant", "fancy", "cuppa", "lift", "lorry", "flat", "holiday", "queue", "mate",
    "cheers", "innit", "rubbish", "quid", "loo", "whilst",
];

impl MarkerLexicon {
    /// Lexicon with an explicit marker list per variety
    #[must_use]
    pub fn new(markers: HashMap<Variety, Vec<String>>) -> Self {
        Self { markers }
    }

    /// Add markers to a variety, skipping ones already present
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, variety: Variety, markers: I) {
        let entry = self.markers.entry(variety).or_default();
        for marker in markers {
            let folded = marker.to_lowercase();
            if !entry.iter().any(|m| m.to_lowercase() == folded) {
                entry.push(marker);
            }
        }
    }

    /// Markers for a variety (empty if none are defined)
    #[must_use]
    pub fn markers_for(&self, variety: Variety) -> &[String] {
        self.markers.get(&variety).map(Vec::as_slice).unwrap_or_default()
    }

    /// Markers used to score a stimulus: its own list if present, else the lexicon's
    #[must_use]
    pub fn markers_for_stimulus<'a>(&'a self, stimulus: &'a Stimulus) -> &'a [String] {
        if stimulus.markers.is_empty() {
            self.markers_for(stimulus.variety)
        } else {
            &stimulus.markers
        }
    }
}

impl Default for MarkerLexicon {
    fn default() -> Self {
        let to_vec = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        let mut markers = HashMap::new();
        markers.insert(Variety::Aave, to_vec(AAVE_MARKERS));
        markers.insert(Variety::Spanglish, to_vec(SPANGLISH_MARKERS));
        markers.insert(Variety::BrEng, to_vec(BRENG_MARKERS));
        markers.insert(Variety::StdEng, Vec::new());
        Self { markers }
    }
}
