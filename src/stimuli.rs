//! Stimulus loading for code-switching probes.
//!
//! A stimulus is a short text written in one language variety, paired with the
//! task the model is asked to perform on it. Stimuli are read from CSV files
//! with the columns `id,text,variety,task_type` and an optional `markers`
//! column of `;`-separated dialect markers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading stimuli
#[derive(Error, Debug)]
pub enum StimulusError {
    #[error("Stimulus file not found: {0}")]
    NotFound(String),

    #[error("No stimuli found in {0}")]
    Empty(String),

    #[error("Duplicate stimulus id: {0}")]
    DuplicateId(String),

    #[error("Stimulus {0} has empty text")]
    EmptyText(String),

    #[error("Unknown language variety: {0}")]
    UnknownVariety(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Invalid glob pattern: {0}")]
    Pattern(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Language variety a stimulus is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variety {
    /// African American Vernacular English
    #[serde(rename = "AAVE")]
    Aave,
    /// Spanish-English code-switching
    Spanglish,
    /// British English
    BrEng,
    /// Standard English (control group)
    StdEng,
}

impl Variety {
    /// All varieties in canonical order
    pub const ALL: [Self; 4] = [Self::Aave, Self::Spanglish, Self::BrEng, Self::StdEng];

    /// Canonical label used in files and reports
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aave => "AAVE",
            Self::Spanglish => "Spanglish",
            Self::BrEng => "BrEng",
            Self::StdEng => "StdEng",
        }
    }
}

impl fmt::Display for Variety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variety {
    type Err = StimulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aave" => Ok(Self::Aave),
            "spanglish" => Ok(Self::Spanglish),
            "breng" | "british-english" | "british_english" | "british" => Ok(Self::BrEng),
            "stdeng" | "standard-english" | "standard_english" | "standard" => Ok(Self::StdEng),
            _ => Err(StimulusError::UnknownVariety(s.to_string())),
        }
    }
}

/// What the model is asked to do with a stimulus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Restate the text in the same style
    Paraphrase,
    /// Keep writing in the same style
    Continue,
    /// Explain the meaning of the text
    Explain,
}

impl TaskType {
    /// All task types in canonical order
    pub const ALL: [Self; 3] = [Self::Paraphrase, Self::Continue, Self::Explain];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paraphrase => "paraphrase",
            Self::Continue => "continue",
            Self::Explain => "explain",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = StimulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paraphrase" => Ok(Self::Paraphrase),
            "continue" | "continuation" => Ok(Self::Continue),
            "explain" | "explanation" => Ok(Self::Explain),
            _ => Err(StimulusError::UnknownTaskType(s.to_string())),
        }
    }
}

/// A single probe text with its variety and task metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stimulus {
    /// Stimulus identifier (e.g., `aave_01`)
    pub id: String,
    /// Source text sent to the model
    pub text: String,
    /// Language variety of the text
    pub variety: Variety,
    /// Task the model is asked to perform
    pub task_type: TaskType,
    /// Expected dialect markers, overriding the variety lexicon when non-empty
    pub markers: Vec<String>,
}

/// Raw CSV row before validation
#[derive(Debug, Deserialize)]
struct StimulusRow {
    id: String,
    text: String,
    variety: String,
    task_type: String,
    #[serde(default)]
    markers: Option<String>,
}

impl TryFrom<StimulusRow> for Stimulus {
    type Error = StimulusError;

    fn try_from(row: StimulusRow) -> Result<Self, Self::Error> {
        let id = row.id.trim().to_string();
        let text = row.text.trim().to_string();
        if text.is_empty() {
            return Err(StimulusError::EmptyText(id));
        }

        let markers = row
            .markers
            .as_deref()
            .map(|m| {
                m.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            text,
            variety: row.variety.parse()?,
            task_type: row.task_type.parse()?,
            markers,
        })
    }
}

/// Ordered, read-only set of stimuli for one run
#[derive(Debug, Clone, Default)]
pub struct StimulusSet {
    /// Files the stimuli were read from
    pub sources: Vec<PathBuf>,
    stimuli: Vec<Stimulus>,
}

impl StimulusSet {
    /// Build a set from already-constructed stimuli, keeping their order
    ///
    /// # Errors
    ///
    /// Returns an error if two stimuli share an id.
    pub fn from_stimuli(stimuli: Vec<Stimulus>) -> Result<Self, StimulusError> {
        check_unique(&stimuli)?;
        Ok(Self {
            sources: Vec::new(),
            stimuli,
        })
    }

    /// Load stimuli from a single CSV file, in file order
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, malformed, empty, or contains
    /// duplicate ids or unknown varieties/task types.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StimulusError> {
        let path = path.as_ref();
        let stimuli = read_csv(path)?;
        if stimuli.is_empty() {
            return Err(StimulusError::Empty(path.display().to_string()));
        }
        check_unique(&stimuli)?;

        Ok(Self {
            sources: vec![path.to_path_buf()],
            stimuli,
        })
    }

    /// Load stimuli from every CSV matching a glob pattern.
    ///
    /// Files are read in sorted path order so runs stay reproducible. A pattern
    /// without wildcards behaves like [`StimulusSet::load`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid, matches nothing, or any
    /// matched file fails to load.
    pub fn load_glob(pattern: &str) -> Result<Self, StimulusError> {
        let mut paths: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| StimulusError::Pattern(e.to_string()))?
            .filter_map(Result::ok)
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(StimulusError::NotFound(pattern.to_string()));
        }

        let mut stimuli = Vec::new();
        for path in &paths {
            stimuli.extend(read_csv(path)?);
        }
        if stimuli.is_empty() {
            return Err(StimulusError::Empty(pattern.to_string()));
        }
        check_unique(&stimuli)?;

        Ok(Self {
            sources: paths,
            stimuli,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stimulus> {
        self.stimuli.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Stimulus] {
        &self.stimuli
    }

    /// Count stimuli per (variety, task type)
    #[must_use]
    pub fn stats(&self) -> StimulusStats {
        let mut by_variety = BTreeMap::new();
        let mut by_task = BTreeMap::new();
        for s in &self.stimuli {
            *by_variety.entry(s.variety).or_insert(0) += 1;
            *by_task.entry(s.task_type).or_insert(0) += 1;
        }
        StimulusStats {
            total: self.stimuli.len(),
            with_markers: self.stimuli.iter().filter(|s| !s.markers.is_empty()).count(),
            by_variety,
            by_task,
        }
    }
}

impl<'a> IntoIterator for &'a StimulusSet {
    type Item = &'a Stimulus;
    type IntoIter = std::slice::Iter<'a, Stimulus>;

    fn into_iter(self) -> Self::IntoIter {
        self.stimuli.iter()
    }
}

/// Summary counts for a stimulus set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusStats {
    pub total: usize,
    /// Stimuli carrying their own marker list
    pub with_markers: usize,
    pub by_variety: BTreeMap<Variety, usize>,
    pub by_task: BTreeMap<TaskType, usize>,
}

fn read_csv(path: &Path) -> Result<Vec<Stimulus>, StimulusError> {
    if !path.exists() {
        return Err(StimulusError::NotFound(path.display().to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)?;

    let mut stimuli = Vec::new();
    for row in reader.deserialize::<StimulusRow>() {
        stimuli.push(Stimulus::try_from(row?)?);
    }
    Ok(stimuli)
}

fn check_unique(stimuli: &[Stimulus]) -> Result<(), StimulusError> {
    let mut seen = HashSet::new();
    for s in stimuli {
        if !seen.insert(s.id.as_str()) {
            return Err(StimulusError::DuplicateId(s.id.clone()));
        }
    }
    Ok(())
}
