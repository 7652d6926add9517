//! # Codeswitch Bench
//!
//! Batch benchmark for how LLM text-generation APIs handle code-switched and
//! dialectal English (AAVE, Spanglish, British English, with Standard English
//! as the control group).
//!
//! ## Method
//!
//! Each stimulus is sent to every configured model once. The response is
//! scored on:
//! - Marker retention: share of the source's dialect markers that survive
//! - Length ratio: generated tokens over source tokens
//! - Similarity: bag-of-words cosine against the source
//!
//! Every attempt, successful or not, becomes exactly one record in an
//! append-only result file, which the report summarises per model, variety
//! and task.
//!
//! ## Architecture
//!
//! ```text
//! Stimuli (CSV)
//!        ↓
//! Batch Runner (retry policy, auth fail-fast)
//!        ↓
//! Model Adapters (Gemini | Mistral | Cohere | OpenAI | Anthropic)
//!        ↓
//! Metrics (retention, length ratio, similarity)
//!        ↓
//! Result Store (CSV | JSON lines)
//!        ↓
//! Report (bootstrap CI, Welch t-test)
//! ```

pub mod adapters;
pub mod config;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod stats;
pub mod stimuli;
pub mod store;

pub use adapters::{
    adapter_for, classify_status, AdapterError, AnthropicAdapter, ChatCompletionsAdapter,
    CohereAdapter, ErrorKind, GeminiAdapter, ModelAdapter,
};
pub use config::{
    Backoff, ConfigError, ModelConfig, ModelSpec, PromptTemplates, Provider, RequestSettings,
    RetrySettings, RunConfig,
};
pub use metrics::{
    length_ratio, marker_counts, marker_retention, score, similarity, tokenize, MarkerLexicon,
    Scores,
};
pub use report::{ModelSummary, ReportBuilder, ReportMetadata, ReportSummary, RunReport};
pub use runner::{
    new_run_id, BatchRunner, RetryPolicy, RunOutcome, RunnerConfig, RunnerError, Target,
};
pub use stats::{bootstrap_ci, welch_t_test, AggregatedScores, ScoreCollector, SignificanceResult, StatConfig};
pub use stimuli::{Stimulus, StimulusError, StimulusSet, StimulusStats, TaskType, Variety};
pub use store::{read_records, OpenMode, RecordSink, ResponseRecord, ResultFormat, ResultStore, StoreError};
