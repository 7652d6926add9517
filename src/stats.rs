//! Aggregation and significance testing over scored records.
//!
//! Used by the report to summarise many records per model:
//! - Means with seeded bootstrap confidence intervals
//! - Latency percentiles
//! - Welch's t-test with Cohen's d effect size

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::time::Duration;

/// Statistical configuration for reports
#[derive(Debug, Clone)]
pub struct StatConfig {
    /// Number of bootstrap resamples
    pub bootstrap_n: usize,
    /// Confidence level (e.g., 0.95)
    pub confidence: f64,
    /// Significance threshold
    pub alpha: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            bootstrap_n: 10_000,
            confidence: 0.95,
            alpha: 0.05,
            seed: 42,
        }
    }
}

/// Collects per-record measurements for one group (model, variety, ...)
#[derive(Debug, Default)]
pub struct ScoreCollector {
    retention: Vec<f64>,
    similarity: Vec<f64>,
    length_ratio: Vec<f64>,
    latency: Vec<Duration>,
    attempts: usize,
    successes: usize,
    retries: u64,
}

impl ScoreCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt outcome. `latency` is `None` when no call was made.
    pub fn record_attempt(&mut self, success: bool, retries: u32, latency: Option<Duration>) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
        self.retries += u64::from(retries);
        self.latency.extend(latency);
    }

    /// Record the scores of a successful response
    pub fn record_scores(&mut self, retention: Option<f64>, similarity: f64, length_ratio: f64) {
        if let Some(r) = retention {
            self.retention.push(r);
        }
        self.similarity.push(similarity);
        self.length_ratio.push(length_ratio);
    }

    /// Per-record retention values (not-applicable records excluded)
    #[must_use]
    pub fn retention_samples(&self) -> &[f64] {
        &self.retention
    }

    /// Compute aggregated scores
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(&self, config: &StatConfig) -> AggregatedScores {
        let success_rate = if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        };

        AggregatedScores {
            attempts: self.attempts,
            successes: self.successes,
            success_rate,
            retention: (!self.retention.is_empty()).then(|| compute_mean(&self.retention)),
            retention_ci: (!self.retention.is_empty())
                .then(|| bootstrap_ci(&self.retention, config)),
            retention_samples: self.retention.len(),
            similarity: (!self.similarity.is_empty()).then(|| compute_mean(&self.similarity)),
            length_ratio: (!self.length_ratio.is_empty())
                .then(|| compute_mean(&self.length_ratio)),
            latency_p50: (!self.latency.is_empty())
                .then(|| percentile_duration(&self.latency, 0.50)),
            latency_p95: (!self.latency.is_empty())
                .then(|| percentile_duration(&self.latency, 0.95)),
            total_retries: self.retries,
        }
    }
}

/// Aggregated scores for one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedScores {
    pub attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
    /// Mean retention over applicable records
    pub retention: Option<f64>,
    /// Bootstrap CI for mean retention (lower, upper)
    pub retention_ci: Option<(f64, f64)>,
    /// Number of records contributing to retention
    pub retention_samples: usize,
    pub similarity: Option<f64>,
    pub length_ratio: Option<f64>,
    /// `None` when no record in the group made a call
    pub latency_p50: Option<Duration>,
    pub latency_p95: Option<Duration>,
    pub total_retries: u64,
}

/// Compute mean of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Compute sample standard deviation
#[allow(clippy::cast_precision_loss)]
fn compute_std(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = compute_mean(samples);
    let variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// Nearest-rank percentile of durations
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn percentile_duration(samples: &[Duration], percentile: f64) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }

    let mut sorted = samples.to_vec();
    sorted.sort();

    let idx = ((samples.len() as f64 * percentile).ceil() as usize).saturating_sub(1);
    sorted
        .get(idx.min(sorted.len() - 1))
        .copied()
        .unwrap_or(Duration::ZERO)
}

/// Bootstrap confidence interval (percentile method, seeded resampling)
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn bootstrap_ci(samples: &[f64], config: &StatConfig) -> (f64, f64) {
    if samples.len() < 2 || config.bootstrap_n == 0 {
        let mean = compute_mean(samples);
        return (mean, mean);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut bootstrap_means = Vec::with_capacity(config.bootstrap_n);

    for _ in 0..config.bootstrap_n {
        let resample_sum: f64 = (0..samples.len())
            .map(|_| {
                let idx = rng.next_u64() as usize % samples.len();
                samples[idx]
            })
            .sum();
        bootstrap_means.push(resample_sum / samples.len() as f64);
    }

    bootstrap_means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let alpha = 1.0 - config.confidence;
    let lower_idx = (config.bootstrap_n as f64 * (alpha / 2.0)).floor() as usize;
    let upper_idx = (config.bootstrap_n as f64 * (1.0 - alpha / 2.0)).ceil() as usize;

    let lower = bootstrap_means
        .get(lower_idx.min(bootstrap_means.len() - 1))
        .copied()
        .unwrap_or(0.0);
    let upper = bootstrap_means
        .get(upper_idx.min(bootstrap_means.len() - 1))
        .copied()
        .unwrap_or(0.0);

    (lower, upper)
}

/// Result of a significance test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: f64,
    /// Is result significant at the given alpha?
    pub is_significant: bool,
    pub cohens_d: f64,
    pub effect_interpretation: String,
}

/// Independent samples t-test (Welch's t-test)
///
/// Returns `None` if either sample has fewer than two values or both have no
/// variance.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::suboptimal_flops)]
pub fn welch_t_test(samples_a: &[f64], samples_b: &[f64], alpha: f64) -> Option<SignificanceResult> {
    if samples_a.len() < 2 || samples_b.len() < 2 {
        return None;
    }

    let n_a = samples_a.len() as f64;
    let n_b = samples_b.len() as f64;
    let mean_a = compute_mean(samples_a);
    let mean_b = compute_mean(samples_b);
    let var_a = compute_std(samples_a).powi(2);
    let var_b = compute_std(samples_b).powi(2);

    if var_a < f64::EPSILON && var_b < f64::EPSILON {
        return None;
    }

    let se = ((var_a / n_a) + (var_b / n_b)).sqrt();
    if se < f64::EPSILON {
        return None;
    }

    let t_statistic = (mean_a - mean_b) / se;

    // Welch-Satterthwaite degrees of freedom
    let df_num = ((var_a / n_a) + (var_b / n_b)).powi(2);
    let df_denom = ((var_a / n_a).powi(2) / (n_a - 1.0)) + ((var_b / n_b).powi(2) / (n_b - 1.0));
    let df = if df_denom > f64::EPSILON {
        df_num / df_denom
    } else {
        (n_a + n_b - 2.0).max(1.0)
    };

    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p_value = 2.0 * (1.0 - t_dist.cdf(t_statistic.abs()));

    let pooled_std = (((n_a - 1.0) * var_a + (n_b - 1.0) * var_b) / (n_a + n_b - 2.0)).sqrt();
    let cohens_d = if pooled_std > f64::EPSILON {
        (mean_a - mean_b) / pooled_std
    } else {
        0.0
    };

    Some(SignificanceResult {
        t_statistic,
        p_value,
        degrees_of_freedom: df,
        is_significant: p_value < alpha,
        cohens_d,
        effect_interpretation: interpret_cohens_d(cohens_d).to_string(),
    })
}

fn interpret_cohens_d(d: f64) -> &'static str {
    let abs_d = d.abs();
    if abs_d < 0.2 {
        "negligible"
    } else if abs_d < 0.5 {
        "small"
    } else if abs_d < 0.8 {
        "medium"
    } else {
        "large"
    }
}

#[cfg(test)]
#[allow(
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::unwrap_used
)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_empty() {
        let agg = ScoreCollector::new().compute(&StatConfig::default());
        assert_eq!(agg.attempts, 0);
        assert_eq!(agg.success_rate, 0.0);
        assert!(agg.retention.is_none());
        assert!(agg.retention_ci.is_none());
        assert_eq!(agg.latency_p50, None);
    }

    #[test]
    fn test_collector_excludes_not_applicable_retention() {
        let mut collector = ScoreCollector::new();
        collector.record_attempt(true, 0, Some(Duration::from_millis(100)));
        collector.record_scores(Some(1.0), 0.8, 1.0);
        collector.record_attempt(true, 1, Some(Duration::from_millis(300)));
        collector.record_scores(None, 0.4, 2.0);
        collector.record_attempt(false, 2, Some(Duration::from_millis(900)));

        let agg = collector.compute(&StatConfig::default());
        assert_eq!(agg.attempts, 3);
        assert_eq!(agg.successes, 2);
        assert!((agg.success_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(agg.retention, Some(1.0));
        assert_eq!(agg.retention_samples, 1);
        assert!((agg.similarity.unwrap() - 0.6).abs() < 1e-12);
        assert!((agg.length_ratio.unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(agg.total_retries, 3);
        assert_eq!(agg.latency_p50, Some(Duration::from_millis(300)));
        assert_eq!(agg.latency_p95, Some(Duration::from_millis(900)));
    }

    #[test]
    fn test_collector_skips_latency_without_call() {
        let mut collector = ScoreCollector::new();
        collector.record_attempt(false, 0, None);
        collector.record_attempt(false, 0, None);

        let agg = collector.compute(&StatConfig::default());
        assert_eq!(agg.attempts, 2);
        assert_eq!(agg.latency_p50, None);
        assert_eq!(agg.latency_p95, None);

        collector.record_attempt(true, 0, Some(Duration::from_millis(250)));
        let agg = collector.compute(&StatConfig::default());
        assert_eq!(agg.latency_p50, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_compute_std() {
        let samples = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = compute_std(&samples);
        assert!(std > 2.0 && std < 2.2, "std = {std}");
        assert_eq!(compute_std(&[5.0]), 0.0);
    }

    #[test]
    fn test_percentile_duration() {
        let samples: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile_duration(&samples, 0.5), Duration::from_millis(50));
        assert_eq!(percentile_duration(&samples, 0.95), Duration::from_millis(95));
        assert_eq!(percentile_duration(&[], 0.5), Duration::ZERO);
    }

    #[test]
    fn test_bootstrap_ci_contains_mean_and_is_reproducible() {
        let samples: Vec<f64> = (0..200).map(|i| f64::from(i % 2)).collect();
        let config = StatConfig {
            bootstrap_n: 2000,
            ..StatConfig::default()
        };
        let (lower, upper) = bootstrap_ci(&samples, &config);
        assert!(lower < 0.5 && upper > 0.5);
        assert_eq!(bootstrap_ci(&samples, &config), (lower, upper));
    }

    #[test]
    fn test_bootstrap_ci_single_sample() {
        assert_eq!(bootstrap_ci(&[0.7], &StatConfig::default()), (0.7, 0.7));
    }

    #[test]
    fn test_welch_t_test_detects_difference() {
        let a: Vec<f64> = (0..30).map(|i| 0.9 + f64::from(i % 3) * 0.01).collect();
        let b: Vec<f64> = (0..30).map(|i| 0.3 + f64::from(i % 3) * 0.01).collect();
        let result = welch_t_test(&a, &b, 0.05).unwrap();
        assert!(result.is_significant);
        assert!(result.t_statistic > 0.0);
        assert_eq!(result.effect_interpretation, "large");
    }

    #[test]
    fn test_welch_t_test_degenerate_inputs() {
        assert!(welch_t_test(&[1.0], &[0.0, 1.0], 0.05).is_none());
        assert!(welch_t_test(&[1.0, 1.0], &[0.5, 0.5], 0.05).is_none());
    }

    #[test]
    fn test_interpret_cohens_d() {
        assert_eq!(interpret_cohens_d(0.1), "negligible");
        assert_eq!(interpret_cohens_d(-0.3), "small");
        assert_eq!(interpret_cohens_d(0.6), "medium");
        assert_eq!(interpret_cohens_d(1.2), "large");
    }
}
