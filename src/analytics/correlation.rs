use serde::{Deserialize, Serialize};

use super::grouping::PairedSample;
use crate::domain::{Computed, InsufficientDataError};

/// Pearson coefficient over pairwise-complete values.
///
/// Every accumulation is a commutative sum of commutative products, so
/// swapping the two series yields the bitwise-identical result. The
/// coefficient is clamped to `[-1, 1]`.
pub fn pearson(pairs: &[(f64, f64)], metric_a: &str, metric_b: &str) -> Computed<f64> {
    if pairs.len() < 2 {
        return Computed::Undefined(InsufficientDataError::TooFewValues {
            required: 2,
            available: pairs.len(),
        });
    }

    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let mut cross = 0.0;
    let mut ss_a = 0.0;
    let mut ss_b = 0.0;
    for (a, b) in pairs {
        let da = a - mean_a;
        let db = b - mean_b;
        cross += da * db;
        ss_a += da * da;
        ss_b += db * db;
    }

    if ss_a == 0.0 {
        return Computed::Undefined(InsufficientDataError::ZeroVariance {
            metric: metric_a.to_string(),
        });
    }
    if ss_b == 0.0 {
        return Computed::Undefined(InsufficientDataError::ZeroVariance {
            metric: metric_b.to_string(),
        });
    }

    Computed::Value((cross / (ss_a * ss_b).sqrt()).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
}

impl CorrelationStrength {
    pub fn of(coefficient: f64) -> Self {
        let magnitude = coefficient.abs();
        if magnitude >= 0.7 {
            CorrelationStrength::Strong
        } else if magnitude >= 0.4 {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Weak
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub metric_a: String,
    pub metric_b: String,
    /// Records where both metrics are present
    pub sample_size: usize,
    /// Records in scope missing either metric
    pub excluded: usize,
    pub coefficient: Computed<f64>,
    pub strength: Option<CorrelationStrength>,
}

impl Correlation {
    pub fn from_sample(metric_a: &str, metric_b: &str, sample: &PairedSample) -> Self {
        let coefficient = pearson(&sample.pairs, metric_a, metric_b);
        Self {
            metric_a: metric_a.to_string(),
            metric_b: metric_b.to_string(),
            sample_size: sample.len(),
            excluded: sample.incomplete,
            strength: coefficient.get().map(CorrelationStrength::of),
            coefficient,
        }
    }
}
