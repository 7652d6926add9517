//! Report generation for benchmark runs.
//!
//! Summarises result records into:
//! - Overall totals
//! - Per-model success, retention (with bootstrap CI), similarity and latency
//! - A variety × model retention matrix
//! - A task × model success matrix
//! - Pairwise significance tests on retention

use crate::stats::{welch_t_test, ScoreCollector, SignificanceResult, StatConfig};
use crate::stimuli::{TaskType, Variety};
use crate::store::ResponseRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::time::Duration;
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Full run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    /// Per-model results in first-seen order
    pub models: Vec<ModelSummary>,
    /// Retention per variety, one cell per model
    pub varieties: Vec<VarietyRow>,
    /// Success rate per task type, one cell per model
    pub tasks: Vec<TaskRow>,
    /// Pairwise retention comparisons
    pub comparisons: Vec<StatisticalComparison>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    /// Distinct run ids found in the records
    pub run_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub framework_version: String,
    pub stat_config: StatConfigSummary,
}

/// Statistical configuration summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatConfigSummary {
    pub bootstrap_n: usize,
    pub confidence: f64,
    pub alpha: f64,
}

impl From<&StatConfig> for StatConfigSummary {
    fn from(config: &StatConfig) -> Self {
        Self {
            bootstrap_n: config.bootstrap_n,
            confidence: config.confidence,
            alpha: config.alpha,
        }
    }
}

/// Totals across every record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_records: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub models: usize,
    pub varieties: usize,
    /// Mean retention over applicable records only
    pub mean_retention: Option<f64>,
}

/// Metric value with confidence interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricWithCI {
    pub value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Per-model results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    pub provider: String,
    pub attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub retention: Option<MetricWithCI>,
    /// Records contributing to retention
    pub retention_samples: usize,
    pub similarity: Option<f64>,
    pub length_ratio: Option<f64>,
    /// `None` when the model never made a call
    pub latency_p50_ms: Option<u64>,
    pub latency_p95_ms: Option<u64>,
    pub total_retries: u64,
    /// Failure count per error kind label
    pub errors: BTreeMap<String, usize>,
}

/// Retention for one (variety, model) cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionCell {
    pub model: String,
    pub retention: Option<f64>,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarietyRow {
    pub variety: Variety,
    pub cells: Vec<RetentionCell>,
}

/// Success rate for one (task, model) cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCell {
    pub model: String,
    pub attempts: usize,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_type: TaskType,
    pub cells: Vec<SuccessCell>,
}

/// Statistical comparison between two models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalComparison {
    pub model_a: String,
    pub model_b: String,
    pub metric: String,
    pub significance: SignificanceResult,
}

/// Report builder over result records
pub struct ReportBuilder<'a> {
    title: String,
    stat_config: StatConfig,
    records: Vec<&'a ResponseRecord>,
}

impl<'a> ReportBuilder<'a> {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            stat_config: StatConfig::default(),
            records: Vec::new(),
        }
    }

    /// Set statistical configuration
    #[must_use]
    pub const fn with_stat_config(mut self, config: StatConfig) -> Self {
        self.stat_config = config;
        self
    }

    /// Add records to summarise
    pub fn add_records<I: IntoIterator<Item = &'a ResponseRecord>>(&mut self, records: I) {
        self.records.extend(records);
    }

    /// Model labels in first-seen order, with their provider
    fn model_order(&self) -> Vec<(&'a str, &'a str)> {
        let mut order: Vec<(&str, &str)> = Vec::new();
        for record in &self.records {
            if !order.iter().any(|(m, _)| *m == record.model) {
                order.push((&record.model, &record.provider));
            }
        }
        order
    }

    fn collect<F>(&self, predicate: F) -> ScoreCollector
    where
        F: Fn(&ResponseRecord) -> bool,
    {
        let mut collector = ScoreCollector::new();
        for record in self.records.iter().copied().filter(|r| predicate(r)) {
            collector.record_attempt(
                record.success,
                record.retry_count,
                (record.attempts > 0).then_some(Duration::from_millis(record.elapsed_ms)),
            );
            if record.success {
                collector.record_scores(
                    record.marker_retention,
                    record.similarity.unwrap_or(0.0),
                    record.length_ratio.unwrap_or(0.0),
                );
            }
        }
        collector
    }

    /// Build the report
    #[must_use]
    pub fn build(self) -> RunReport {
        let models = self.model_order();

        let mut run_ids: Vec<String> = Vec::new();
        for record in &self.records {
            if !run_ids.contains(&record.run_id) {
                run_ids.push(record.run_id.clone());
            }
        }

        let summary = self.build_summary(models.len());
        let model_summaries = self.build_model_summaries(&models);
        let varieties = self.build_variety_rows(&models);
        let tasks = self.build_task_rows(&models);
        let comparisons = self.build_comparisons(&models);

        RunReport {
            metadata: ReportMetadata {
                title: self.title,
                run_ids,
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
                stat_config: StatConfigSummary::from(&self.stat_config),
            },
            summary,
            models: model_summaries,
            varieties,
            tasks,
            comparisons,
        }
    }

    fn build_summary(&self, model_count: usize) -> ReportSummary {
        let overall = self.collect(|_| true).compute(&self.stat_config);
        let varieties = Variety::ALL
            .iter()
            .filter(|v| self.records.iter().any(|r| r.variety == **v))
            .count();

        ReportSummary {
            total_records: overall.attempts,
            successes: overall.successes,
            success_rate: overall.success_rate,
            models: model_count,
            varieties,
            mean_retention: overall.retention,
        }
    }

    fn build_model_summaries(&self, models: &[(&str, &str)]) -> Vec<ModelSummary> {
        models
            .iter()
            .map(|&(model, provider)| {
                let scores = self.collect(|r| r.model == model).compute(&self.stat_config);

                let mut errors = BTreeMap::new();
                for record in self.records.iter().filter(|r| r.model == model) {
                    if let Some(kind) = record.error_kind {
                        *errors.entry(kind.to_string()).or_insert(0) += 1;
                    }
                }

                ModelSummary {
                    model: model.to_string(),
                    provider: provider.to_string(),
                    attempts: scores.attempts,
                    successes: scores.successes,
                    success_rate: scores.success_rate,
                    retention: scores.retention.map(|value| {
                        let (ci_lower, ci_upper) = scores.retention_ci.unwrap_or((value, value));
                        MetricWithCI {
                            value,
                            ci_lower,
                            ci_upper,
                        }
                    }),
                    retention_samples: scores.retention_samples,
                    similarity: scores.similarity,
                    length_ratio: scores.length_ratio,
                    latency_p50_ms: scores.latency_p50.map(millis),
                    latency_p95_ms: scores.latency_p95.map(millis),
                    total_retries: scores.total_retries,
                    errors,
                }
            })
            .collect()
    }

    fn build_variety_rows(&self, models: &[(&str, &str)]) -> Vec<VarietyRow> {
        Variety::ALL
            .into_iter()
            .filter(|v| self.records.iter().any(|r| r.variety == *v))
            .map(|variety| VarietyRow {
                variety,
                cells: models
                    .iter()
                    .map(|&(model, _)| {
                        let scores = self
                            .collect(|r| r.variety == variety && r.model == model)
                            .compute(&self.stat_config);
                        RetentionCell {
                            model: model.to_string(),
                            retention: scores.retention,
                            samples: scores.retention_samples,
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn build_task_rows(&self, models: &[(&str, &str)]) -> Vec<TaskRow> {
        TaskType::ALL
            .into_iter()
            .filter(|t| self.records.iter().any(|r| r.task_type == *t))
            .map(|task_type| TaskRow {
                task_type,
                cells: models
                    .iter()
                    .map(|&(model, _)| {
                        let matching: Vec<_> = self
                            .records
                            .iter()
                            .filter(|r| r.task_type == task_type && r.model == model)
                            .collect();
                        let successes = matching.iter().filter(|r| r.success).count();
                        SuccessCell {
                            model: model.to_string(),
                            attempts: matching.len(),
                            success_rate: (!matching.is_empty())
                                .then(|| successes as f64 / matching.len() as f64),
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    fn build_comparisons(&self, models: &[(&str, &str)]) -> Vec<StatisticalComparison> {
        let samples: Vec<ScoreCollector> = models
            .iter()
            .map(|&(model, _)| self.collect(|r| r.model == model))
            .collect();

        let mut comparisons = Vec::new();
        for i in 0..models.len() {
            for j in (i + 1)..models.len() {
                if let Some(significance) = welch_t_test(
                    samples[i].retention_samples(),
                    samples[j].retention_samples(),
                    self.stat_config.alpha,
                ) {
                    comparisons.push(StatisticalComparison {
                        model_a: models[i].0.to_string(),
                        model_b: models[j].0.to_string(),
                        metric: "marker_retention".to_string(),
                        significance,
                    });
                }
            }
        }
        comparisons
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn decimal(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

/// Table row for markdown output
#[derive(Tabled)]
struct ModelTableRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Success")]
    success: String,
    #[tabled(rename = "Retention [95% CI]")]
    retention: String,
    #[tabled(rename = "Similarity")]
    similarity: String,
    #[tabled(rename = "Length Ratio")]
    length_ratio: String,
    #[tabled(rename = "Latency p50/p95")]
    latency: String,
    #[tabled(rename = "Retries")]
    retries: u64,
    #[tabled(rename = "Errors")]
    errors: String,
}

impl RunReport {
    /// Summarise records with a default title
    #[must_use]
    pub fn from_records(records: &[ResponseRecord], config: &StatConfig) -> Self {
        let mut builder =
            ReportBuilder::new("Code-Switching Benchmark Report").with_stat_config(config.clone());
        builder.add_records(records);
        builder.build()
    }

    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render report as markdown
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        writeln!(output, "# {}", self.metadata.title).ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(
            output,
            "**Framework Version:** {}",
            self.metadata.framework_version
        )
        .ok();
        if !self.metadata.run_ids.is_empty() {
            writeln!(output, "**Runs:** {}", self.metadata.run_ids.join(", ")).ok();
        }
        writeln!(output).ok();

        // Summary
        writeln!(output, "## Summary").ok();
        writeln!(output).ok();
        writeln!(output, "| Metric | Value |").ok();
        writeln!(output, "|--------|-------|").ok();
        writeln!(output, "| Records | {} |", self.summary.total_records).ok();
        writeln!(
            output,
            "| Successes | {} ({}) |",
            self.summary.successes,
            percent(Some(self.summary.success_rate))
        )
        .ok();
        writeln!(output, "| Models | {} |", self.summary.models).ok();
        writeln!(output, "| Varieties | {} |", self.summary.varieties).ok();
        writeln!(
            output,
            "| Mean Marker Retention | {} |",
            percent(self.summary.mean_retention)
        )
        .ok();
        writeln!(output).ok();

        // Per-model results
        writeln!(output, "## Model Results").ok();
        writeln!(output).ok();

        let rows: Vec<ModelTableRow> = self
            .models
            .iter()
            .map(|m| ModelTableRow {
                model: m.model.clone(),
                provider: m.provider.clone(),
                success: format!("{}/{} ({})", m.successes, m.attempts, percent(Some(m.success_rate))),
                retention: m.retention.as_ref().map_or_else(
                    || "-".to_string(),
                    |r| {
                        format!(
                            "{:.1}% [{:.1}-{:.1}] n={}",
                            r.value * 100.0,
                            r.ci_lower * 100.0,
                            r.ci_upper * 100.0,
                            m.retention_samples
                        )
                    },
                ),
                similarity: decimal(m.similarity),
                length_ratio: decimal(m.length_ratio),
                latency: match (m.latency_p50_ms, m.latency_p95_ms) {
                    (Some(p50), Some(p95)) => format!("{p50}ms / {p95}ms"),
                    _ => "-".to_string(),
                },
                retries: m.total_retries,
                errors: if m.errors.is_empty() {
                    "-".to_string()
                } else {
                    m.errors
                        .iter()
                        .map(|(kind, n)| format!("{kind}×{n}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })
            .collect();

        let table = Table::new(rows).with(Style::markdown()).to_string();
        writeln!(output, "{table}").ok();
        writeln!(output).ok();

        // Variety × model
        if !self.varieties.is_empty() {
            writeln!(output, "## Marker Retention by Variety").ok();
            writeln!(output).ok();
            let mut builder = Builder::default();
            let mut header = vec!["Variety".to_string()];
            header.extend(self.models.iter().map(|m| m.model.clone()));
            builder.push_record(header);
            for row in &self.varieties {
                let mut cells = vec![row.variety.to_string()];
                cells.extend(row.cells.iter().map(|c| percent(c.retention)));
                builder.push_record(cells);
            }
            writeln!(output, "{}", builder.build().with(Style::markdown())).ok();
            writeln!(output).ok();
        }

        // Task × model
        if !self.tasks.is_empty() {
            writeln!(output, "## Success Rate by Task").ok();
            writeln!(output).ok();
            let mut builder = Builder::default();
            let mut header = vec!["Task".to_string()];
            header.extend(self.models.iter().map(|m| m.model.clone()));
            builder.push_record(header);
            for row in &self.tasks {
                let mut cells = vec![row.task_type.to_string()];
                cells.extend(row.cells.iter().map(|c| percent(c.success_rate)));
                builder.push_record(cells);
            }
            writeln!(output, "{}", builder.build().with(Style::markdown())).ok();
            writeln!(output).ok();
        }

        // Statistical tests
        if !self.comparisons.is_empty() {
            writeln!(output, "## Statistical Comparisons").ok();
            writeln!(output).ok();
            writeln!(
                output,
                "| Comparison | Metric | t-stat | p-value | Effect Size | Significant |"
            )
            .ok();
            writeln!(
                output,
                "|------------|--------|--------|---------|-------------|-------------|"
            )
            .ok();
            for test in &self.comparisons {
                writeln!(
                    output,
                    "| {} vs {} | {} | {:.3} | {:.4} | {} ({:.2}) | {} |",
                    test.model_a,
                    test.model_b,
                    test.metric,
                    test.significance.t_statistic,
                    test.significance.p_value,
                    test.significance.effect_interpretation,
                    test.significance.cohens_d,
                    if test.significance.is_significant {
                        "Yes"
                    } else {
                        "No"
                    }
                )
                .ok();
            }
            writeln!(output).ok();
        }

        // Configuration
        writeln!(output, "## Configuration").ok();
        writeln!(output).ok();
        writeln!(
            output,
            "- Bootstrap resamples: {}",
            self.metadata.stat_config.bootstrap_n
        )
        .ok();
        writeln!(
            output,
            "- Confidence level: {}%",
            self.metadata.stat_config.confidence * 100.0
        )
        .ok();
        writeln!(
            output,
            "- Significance threshold (α): {}",
            self.metadata.stat_config.alpha
        )
        .ok();
        writeln!(
            output,
            "- Retention excludes failed records and sources without markers"
        )
        .ok();

        output
    }
}
