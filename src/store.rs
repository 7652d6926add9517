//! Append-only result store.
//!
//! One [`ResponseRecord`] is written per (stimulus, model) attempt and flushed
//! immediately, so a crash mid-run keeps everything completed so far. The file
//! format follows the extension: `.csv` gets a header row, `.jsonl`, `.ndjson`
//! and `.json` get one JSON object per line.

use crate::adapters::ErrorKind;
use crate::metrics::Scores;
use crate::stimuli::{TaskType, Variety};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order of the CSV format, matching [`ResponseRecord`] field order
pub const CSV_COLUMNS: [&str; 19] = [
    "run_id",
    "stimulus_id",
    "variety",
    "model",
    "provider",
    "task_type",
    "success",
    "response_text",
    "error_kind",
    "error_message",
    "retry_count",
    "attempts",
    "elapsed_ms",
    "markers_in_source",
    "markers_retained",
    "marker_retention",
    "length_ratio",
    "similarity",
    "timestamp",
];

/// Errors that can occur while writing or reading result files
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unsupported result file extension: {0} (expected .csv, .jsonl, .ndjson or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("Existing file {path} has an incompatible header: {found}")]
    HeaderMismatch { path: PathBuf, found: String },

    #[error("Result file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },

    #[error("JSON encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Outcome of one (stimulus, task, model) attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Identifier shared by every record of one run
    pub run_id: String,
    pub stimulus_id: String,
    pub variety: Variety,
    /// Model run label
    pub model: String,
    pub provider: String,
    pub task_type: TaskType,
    pub success: bool,
    /// Generated text, `None` on failure
    pub response_text: Option<String>,
    /// Last error kind, `None` on success
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Attempts made minus one
    pub retry_count: u32,
    /// Adapter calls made for this pair, 0 when the model was already disabled
    pub attempts: u32,
    /// Wall time across all attempts, including backoff but not pacing
    pub elapsed_ms: u64,
    pub markers_in_source: Option<usize>,
    pub markers_retained: Option<usize>,
    /// `None` on failure or when the source carries no markers
    pub marker_retention: Option<f64>,
    pub length_ratio: Option<f64>,
    pub similarity: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseRecord {
    /// Attach scores for a successful response
    #[must_use]
    pub fn with_scores(mut self, scores: &Scores) -> Self {
        self.markers_in_source = Some(scores.markers_in_source);
        self.markers_retained = Some(scores.markers_retained);
        self.marker_retention = scores.marker_retention;
        self.length_ratio = Some(scores.length_ratio);
        self.similarity = Some(scores.similarity);
        self
    }

    /// Whether marker retention was measured for this record
    #[must_use]
    pub const fn retention_applicable(&self) -> bool {
        self.success && self.marker_retention.is_some()
    }
}

/// On-disk result format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Csv,
    JsonLines,
}

impl ResultFormat {
    /// Pick the format from a file extension
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnsupportedFormat` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("jsonl" | "ndjson" | "json") => Ok(Self::JsonLines),
            _ => Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// How an existing result file is treated on open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Keep previous rows and add new ones
    #[default]
    Append,
    /// Truncate the file first
    Fresh,
}

/// Destination for records produced by the batch runner
pub trait RecordSink {
    /// Persist one record. Must be synced to disk before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn append(&mut self, record: &ResponseRecord) -> Result<(), StoreError>;
}

impl RecordSink for Vec<ResponseRecord> {
    fn append(&mut self, record: &ResponseRecord) -> Result<(), StoreError> {
        self.push(record.clone());
        Ok(())
    }
}

enum Writer {
    Csv(csv::Writer<File>),
    JsonLines(BufWriter<File>),
}

/// File-backed record sink
pub struct ResultStore {
    path: PathBuf,
    format: ResultFormat,
    writer: Writer,
    written: usize,
}

impl ResultStore {
    /// Open (or create) a result file
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is unsupported, the file cannot be
    /// opened, or an existing CSV file has a different header.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let format = ResultFormat::from_path(&path)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let existing_len = match mode {
            OpenMode::Append => fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
            OpenMode::Fresh => 0,
        };

        if format == ResultFormat::Csv && existing_len > 0 {
            check_csv_header(&path)?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            OpenMode::Append => options.append(true),
            OpenMode::Fresh => options.write(true).truncate(true),
        };
        let file = options.open(&path)?;

        let writer = match format {
            ResultFormat::Csv => Writer::Csv(
                csv::WriterBuilder::new()
                    .has_headers(existing_len == 0)
                    .from_writer(file),
            ),
            ResultFormat::JsonLines => Writer::JsonLines(BufWriter::new(file)),
        };

        tracing::debug!(path = %path.display(), ?format, ?mode, "opened result store");

        Ok(Self {
            path,
            format,
            writer,
            written: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn format(&self) -> ResultFormat {
        self.format
    }

    /// Records written through this handle
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for ResultStore {
    fn append(&mut self, record: &ResponseRecord) -> Result<(), StoreError> {
        match &mut self.writer {
            Writer::Csv(writer) => {
                writer.serialize(record)?;
                writer.flush()?;
                writer.get_ref().sync_data()?;
            }
            Writer::JsonLines(writer) => {
                serde_json::to_writer(&mut *writer, record)?;
                writer.write_all(b"\n")?;
                writer.flush()?;
                writer.get_ref().sync_data()?;
            }
        }
        self.written += 1;
        Ok(())
    }
}

fn check_csv_header(path: &Path) -> Result<(), StoreError> {
    let mut first = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first)?;
    let found = first.trim_end_matches(['\r', '\n']);
    if found == CSV_COLUMNS.join(",") {
        Ok(())
    } else {
        Err(StoreError::HeaderMismatch {
            path: path.to_path_buf(),
            found: found.to_string(),
        })
    }
}

/// Load every record from a result file
///
/// # Errors
///
/// Returns an error if the file is missing, has an unsupported extension, or
/// contains a malformed row.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<ResponseRecord>, StoreError> {
    let path = path.as_ref();
    let format = ResultFormat::from_path(path)?;
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }

    match format {
        ResultFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new().from_path(path)?;
            reader
                .deserialize()
                .collect::<Result<Vec<ResponseRecord>, _>>()
                .map_err(StoreError::from)
        }
        ResultFormat::JsonLines => {
            let reader = BufReader::new(File::open(path)?);
            let mut records = Vec::new();
            for (idx, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record = serde_json::from_str(&line).map_err(|source| StoreError::Json {
                    line: idx + 1,
                    source,
                })?;
                records.push(record);
            }
            Ok(records)
        }
    }
}
