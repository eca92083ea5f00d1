use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// A single observation in a numeric time series.
#[derive(Debug, Clone)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ValueRange {
    pub lower: f64,
    pub upper: f64,
}

/// Per-point detection verdict. Points with too little history carry a
/// zero-valued result.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    pub score: f64,
    pub expected_range: ValueRange,
}

/// One detector's output for a point, with the critical value the ensemble
/// uses to normalize the score.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodResult {
    pub(crate) result: AnomalyResult,
    pub(crate) critical: f64,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum series length before any detection runs.
    pub min_data_points: usize,
    pub confidence_level: f64,
    /// Rolling window for the statistical and robust detectors.
    pub window_size: usize,
    /// Seasonal period in samples (e.g. 24 for hourly data).
    pub seasonal_period: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_data_points: 30,
            confidence_level: 0.95,
            window_size: 20,
            seasonal_period: 24,
        }
    }
}

/// Ensemble anomaly detector over a numeric time series.
///
/// Three methods vote with fixed weights (statistical 0.4, seasonal 0.3,
/// robust 0.3); each method's score is normalized by its own critical value
/// before weighting, so the ensemble's 1.0 threshold means "at the critical
/// boundary".
pub struct AnomalyDetector {
    config: DetectorConfig,
}

const WEIGHT_STATISTICAL: f64 = 0.4;
const WEIGHT_SEASONAL: f64 = 0.3;
const WEIGHT_ROBUST: f64 = 0.3;

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, points: &[TimeSeriesPoint]) -> Vec<AnomalyResult> {
        if points.len() < self.config.min_data_points {
            return vec![AnomalyResult::default(); points.len()];
        }

        let statistical = self.statistical_detection(points);
        let seasonal = self.seasonal_detection(points);
        let robust = self.robust_detection(points);

        (0..points.len())
            .map(|i| ensemble(&[
                (statistical[i], WEIGHT_STATISTICAL),
                (seasonal[i], WEIGHT_SEASONAL),
                (robust[i], WEIGHT_ROBUST),
            ]))
            .collect()
    }

    /// Rolling-window z-test against a Student's t distribution with
    /// `window - 1` degrees of freedom.
    pub(crate) fn statistical_detection(&self, points: &[TimeSeriesPoint]) -> Vec<Option<MethodResult>> {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let mut results = vec![None; points.len()];

        for i in 0..points.len() {
            let start = i.saturating_sub(self.config.window_size);
            let window = &values[start..=i];
            if window.len() < 3 {
                continue;
            }

            let (mean, std) = mean_stddev(window);
            if std <= f64::EPSILON {
                continue;
            }

            let df = (window.len() - 1) as f64;
            let Ok(dist) = StudentsT::new(0.0, 1.0, df) else {
                continue;
            };

            let z = (values[i] - mean) / std;
            let cdf = dist.cdf(z);
            let p_value = 2.0 * cdf.min(1.0 - cdf);
            let t_crit = dist.inverse_cdf(1.0 - (1.0 - self.config.confidence_level) / 2.0);

            results[i] = Some(MethodResult {
                result: AnomalyResult {
                    is_anomaly: p_value < 1.0 - self.config.confidence_level,
                    score: z.abs(),
                    expected_range: ValueRange {
                        lower: mean - t_crit * std,
                        upper: mean + t_crit * std,
                    },
                },
                critical: t_crit,
            });
        }

        results
    }

    /// Per-phase 3-sigma test; requires at least two full periods.
    pub(crate) fn seasonal_detection(&self, points: &[TimeSeriesPoint]) -> Vec<Option<MethodResult>> {
        let period = self.config.seasonal_period;
        let mut results = vec![None; points.len()];
        if period == 0 || points.len() < 2 * period {
            return results;
        }

        let mut phase_mean = vec![0.0; period];
        let mut phase_std = vec![0.0; period];
        for phase in 0..period {
            let values: Vec<f64> = points[phase..]
                .iter()
                .step_by(period)
                .map(|p| p.value)
                .collect();
            if !values.is_empty() {
                let (mean, std) = mean_stddev(&values);
                phase_mean[phase] = mean;
                phase_std[phase] = std;
            }
        }

        for (i, point) in points.iter().enumerate() {
            let phase = i % period;
            let std = phase_std[phase];
            if std <= f64::EPSILON {
                continue;
            }

            let score = (point.value - phase_mean[phase]).abs() / std;
            results[i] = Some(MethodResult {
                result: AnomalyResult {
                    is_anomaly: score > 3.0,
                    score,
                    expected_range: ValueRange {
                        lower: phase_mean[phase] - 3.0 * std,
                        upper: phase_mean[phase] + 3.0 * std,
                    },
                },
                critical: 3.0,
            });
        }

        results
    }

    /// Median / scaled-MAD test, resistant to outliers in the window.
    pub(crate) fn robust_detection(&self, points: &[TimeSeriesPoint]) -> Vec<Option<MethodResult>> {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let mut results = vec![None; points.len()];

        for i in 0..points.len() {
            let start = i.saturating_sub(self.config.window_size);
            let window = &values[start..=i];
            if window.len() < 3 {
                continue;
            }

            let m = median(window);
            let deviations: Vec<f64> = window.iter().map(|v| (v - m).abs()).collect();
            // 1.4826 rescales the MAD to estimate sigma under normality
            let mad = median(&deviations) * 1.4826;
            if mad <= f64::EPSILON {
                continue;
            }

            let score = (values[i] - m).abs() / mad;
            results[i] = Some(MethodResult {
                result: AnomalyResult {
                    is_anomaly: score > 3.5,
                    score,
                    expected_range: ValueRange {
                        lower: m - 3.5 * mad,
                        upper: m + 3.5 * mad,
                    },
                },
                critical: 3.5,
            });
        }

        results
    }
}

/// Weighted combination over the methods that produced a result; the
/// weights are renormalized when a method abstains.
fn ensemble(methods: &[(Option<MethodResult>, f64)]) -> AnomalyResult {
    let mut weighted_score = 0.0;
    let mut lower = 0.0;
    let mut upper = 0.0;
    let mut total_weight = 0.0;

    for (method, weight) in methods {
        let Some(method) = method else { continue };
        weighted_score += method.result.score / method.critical * weight;
        lower += method.result.expected_range.lower * weight;
        upper += method.result.expected_range.upper * weight;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return AnomalyResult::default();
    }

    let score = weighted_score / total_weight;
    AnomalyResult {
        is_anomaly: score > 1.0,
        score,
        expected_range: ValueRange {
            lower: lower / total_weight,
            upper: upper / total_weight,
        },
    }
}

/// Mean and sample standard deviation (n − 1 denominator).
pub(crate) fn mean_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
