//! Batch runner.
//!
//! Walks the stimulus × model cross product sequentially, calls each model's
//! adapter under a [`RetryPolicy`], scores successful responses, and appends
//! exactly one [`ResponseRecord`] per pair to a [`RecordSink`]. Adapter
//! failures never abort the run; sink failures always do.

use crate::adapters::{AdapterError, ErrorKind, ModelAdapter};
use crate::config::{Backoff, ModelConfig, PromptTemplates, RetrySettings, RunConfig};
use crate::metrics::{score, MarkerLexicon};
use crate::stimuli::{Stimulus, StimulusSet, TaskType};
use crate::store::{RecordSink, ResponseRecord, StoreError};
use chrono::Utc;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("No stimuli to run")]
    NoStimuli,

    #[error("No models to run")]
    NoModels,

    #[error("Duplicate model name: {0}")]
    DuplicateModel(String),

    #[error("Failed to write result: {0}")]
    Store(#[from] StoreError),
}

/// Attempt bounds and backoff per error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for rate-limit and timeout errors
    pub max_attempts: u32,
    /// Total attempts for provider errors
    pub provider_error_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            provider_error_attempts: settings.provider_error_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            backoff: settings.backoff,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries with no waiting, for tests and dry runs
    #[must_use]
    pub const fn immediate(max_attempts: u32, provider_error_attempts: u32) -> Self {
        Self {
            max_attempts,
            provider_error_attempts,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Total attempts allowed once an error of `kind` has been seen
    #[must_use]
    pub const fn max_attempts_for(&self, kind: ErrorKind) -> u32 {
        match kind {
            ErrorKind::Auth => 1,
            ErrorKind::RateLimit | ErrorKind::Timeout => self.max_attempts,
            ErrorKind::Provider => self.provider_error_attempts,
        }
    }

    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry.max(1)),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Identifier stamped on every record of the run
    pub run_id: String,
    pub retry: RetryPolicy,
    /// Pause between consecutive outbound calls
    pub pace: Duration,
    /// Run every stimulus once per listed task instead of its own task
    pub task_types: Option<Vec<TaskType>>,
    pub prompts: PromptTemplates,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_id: new_run_id(),
            retry: RetryPolicy::default(),
            pace: Duration::from_millis(500),
            task_types: None,
            prompts: PromptTemplates::default(),
        }
    }
}

impl RunnerConfig {
    /// Build runner settings from a loaded run configuration
    #[must_use]
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            run_id: new_run_id(),
            retry: RetryPolicy::from(&config.retry),
            pace: config.request.pace(),
            task_types: config.task_types.clone(),
            prompts: config.prompts.clone(),
        }
    }
}

/// Timestamped run identifier with a random suffix
#[must_use]
pub fn new_run_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        rand::random::<u32>()
    )
}

/// A model to run: its resolved config and the adapter that serves it
pub struct Target<'a> {
    pub config: ModelConfig,
    pub adapter: &'a dyn ModelAdapter,
}

impl<'a> Target<'a> {
    #[must_use]
    pub const fn new(config: ModelConfig, adapter: &'a dyn ModelAdapter) -> Self {
        Self { config, adapter }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub records: usize,
    pub successes: usize,
    pub failures: usize,
    /// Models disabled after an authentication failure, in order disabled
    pub disabled_models: Vec<String>,
}

/// Sequential batch runner
pub struct BatchRunner {
    config: RunnerConfig,
    lexicon: MarkerLexicon,
}

impl BatchRunner {
    #[must_use]
    pub const fn new(config: RunnerConfig, lexicon: MarkerLexicon) -> Self {
        Self { config, lexicon }
    }

    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Tasks a stimulus is run under, in order
    fn tasks_for(&self, stimulus: &Stimulus) -> Vec<TaskType> {
        self.config
            .task_types
            .clone()
            .unwrap_or_else(|| vec![stimulus.task_type])
    }

    /// Run every (stimulus, task, model) pair and append one record per pair
    ///
    /// # Errors
    ///
    /// Returns an error before any call if there are no stimuli, no models, or
    /// duplicate model names, and mid-run if the sink fails to write.
    pub fn run(
        &self,
        stimuli: &StimulusSet,
        targets: &[Target<'_>],
        sink: &mut dyn RecordSink,
    ) -> Result<RunOutcome, RunnerError> {
        if stimuli.is_empty() {
            return Err(RunnerError::NoStimuli);
        }
        if targets.is_empty() {
            return Err(RunnerError::NoModels);
        }
        let mut names = HashSet::new();
        for target in targets {
            if !names.insert(target.config.name.as_str()) {
                return Err(RunnerError::DuplicateModel(target.config.name.clone()));
            }
        }

        let tasks_per_stimulus = self.config.task_types.as_ref().map_or(1, Vec::len);
        info!(
            run_id = %self.config.run_id,
            stimuli = stimuli.len(),
            models = targets.len(),
            pairs = stimuli.len() * tasks_per_stimulus * targets.len(),
            "starting batch run"
        );

        let mut outcome = RunOutcome {
            run_id: self.config.run_id.clone(),
            ..RunOutcome::default()
        };
        // Auth failure message per disabled model
        let mut disabled: Vec<(String, String)> = Vec::new();
        let mut calls_made = 0usize;

        for stimulus in stimuli {
            for task in self.tasks_for(stimulus) {
                for target in targets {
                    let name = target.config.name.as_str();
                    let disabled_message = disabled
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, message)| message.clone());
                    let record = match disabled_message {
                        Some(message) => {
                            debug!(stimulus = %stimulus.id, model = name, "skipping disabled model");
                            self.disabled_record(stimulus, task, target, &message)
                        }
                        None => {
                            let (record, auth_error) =
                                self.execute(stimulus, task, target, &mut calls_made);
                            if let Some(err) = auth_error {
                                error!(
                                    model = name,
                                    stimulus = %stimulus.id,
                                    error_kind = %ErrorKind::Auth,
                                    "authentication failed, disabling model for the rest of the run: {err}"
                                );
                                disabled.push((name.to_string(), err.message().to_string()));
                                outcome.disabled_models.push(name.to_string());
                            }
                            record
                        }
                    };

                    sink.append(&record)?;
                    outcome.records += 1;
                    if record.success {
                        outcome.successes += 1;
                    } else {
                        outcome.failures += 1;
                    }
                }
            }
        }

        info!(
            run_id = %outcome.run_id,
            records = outcome.records,
            successes = outcome.successes,
            failures = outcome.failures,
            "batch run complete"
        );
        Ok(outcome)
    }

    /// Call the adapter under the retry policy and build the pair's record.
    ///
    /// Also returns the error when it was an authentication failure.
    fn execute(
        &self,
        stimulus: &Stimulus,
        task: TaskType,
        target: &Target<'_>,
        calls_made: &mut usize,
    ) -> (ResponseRecord, Option<AdapterError>) {
        let prompt = self.config.prompts.render(task, &stimulus.text);
        let model = target.config.name.as_str();
        if *calls_made > 0 {
            pause(self.config.pace);
        }
        let start = Instant::now();
        let mut attempt: u32 = 0;

        let result = loop {
            attempt += 1;
            *calls_made += 1;

            debug!(stimulus = %stimulus.id, model, attempt, "calling adapter");
            match target.adapter.generate(&prompt, &target.config) {
                Ok(text) => break Ok(text),
                Err(err) => {
                    let kind = err.kind();
                    if attempt >= self.config.retry.max_attempts_for(kind) {
                        break Err(err);
                    }
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(
                        stimulus = %stimulus.id,
                        model,
                        attempt,
                        error_kind = %kind,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "attempt failed, retrying: {err}"
                    );
                    pause(delay);
                }
            }
        };

        let mut record = base_record(&self.config.run_id, stimulus, task, &target.config);
        record.retry_count = attempt - 1;
        record.attempts = attempt;
        record.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(text) => {
                let markers = self.lexicon.markers_for_stimulus(stimulus);
                let scores = score(&stimulus.text, &text, markers);
                debug!(
                    stimulus = %stimulus.id,
                    model,
                    retention = ?scores.marker_retention,
                    similarity = scores.similarity,
                    "scored response"
                );
                record.success = true;
                record.response_text = Some(text);
                (record.with_scores(&scores), None)
            }
            Err(err) => {
                if err.kind() != ErrorKind::Auth {
                    warn!(
                        stimulus = %stimulus.id,
                        model,
                        attempts = attempt,
                        error_kind = %err.kind(),
                        "giving up on pair: {err}"
                    );
                }
                record.error_kind = Some(err.kind());
                record.error_message = Some(err.message().to_string());
                let auth = (err.kind() == ErrorKind::Auth).then_some(err);
                (record, auth)
            }
        }
    }

    fn disabled_record(
        &self,
        stimulus: &Stimulus,
        task: TaskType,
        target: &Target<'_>,
        message: &str,
    ) -> ResponseRecord {
        let mut record = base_record(&self.config.run_id, stimulus, task, &target.config);
        record.error_kind = Some(ErrorKind::Auth);
        record.error_message = Some(format!("model disabled after authentication failure: {message}"));
        record
    }
}

fn base_record(
    run_id: &str,
    stimulus: &Stimulus,
    task: TaskType,
    model: &ModelConfig,
) -> ResponseRecord {
    ResponseRecord {
        run_id: run_id.to_string(),
        stimulus_id: stimulus.id.clone(),
        variety: stimulus.variety,
        model: model.name.clone(),
        provider: model.provider.as_str().to_string(),
        task_type: task,
        success: false,
        response_text: None,
        error_kind: None,
        error_message: None,
        retry_count: 0,
        attempts: 0,
        elapsed_ms: 0,
        markers_in_source: None,
        markers_retained: None,
        marker_retention: None,
        length_ratio: None,
        similarity: None,
        timestamp: Utc::now(),
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
