use serde::{Deserialize, Serialize};

use super::grouping::{GroupKey, MetricSample};
use crate::domain::{Computed, InsufficientDataError};

fn too_few(required: usize, available: usize) -> InsufficientDataError {
    InsufficientDataError::TooFewValues {
        required,
        available,
    }
}

pub fn mean(values: &[f64]) -> Computed<f64> {
    if values.is_empty() {
        return Computed::Undefined(too_few(1, 0));
    }
    Computed::Value(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Computed<f64> {
    if values.is_empty() {
        return Computed::Undefined(too_few(1, 0));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Computed::Value((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Computed::Value(sorted[mid])
    }
}

pub fn min(values: &[f64]) -> Computed<f64> {
    values
        .iter()
        .copied()
        .min_by(f64::total_cmp)
        .map(Computed::Value)
        .unwrap_or_else(|| Computed::Undefined(too_few(1, 0)))
}

pub fn max(values: &[f64]) -> Computed<f64> {
    values
        .iter()
        .copied()
        .max_by(f64::total_cmp)
        .map(Computed::Value)
        .unwrap_or_else(|| Computed::Undefined(too_few(1, 0)))
}

/// Sample standard deviation (n - 1 denominator)
pub fn std_dev(values: &[f64]) -> Computed<f64> {
    if values.len() < 2 {
        return Computed::Undefined(too_few(2, values.len()));
    }
    let n = values.len() as f64;
    let m = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0);
    Computed::Value(variance.sqrt())
}

/// Share of `values` strictly below `value`, as a percentage
pub fn percentile_rank(values: &[f64], value: f64) -> Computed<f64> {
    if values.is_empty() {
        return Computed::Undefined(too_few(1, 0));
    }
    let below = values.iter().filter(|v| **v < value).count();
    Computed::Value(below as f64 / values.len() as f64 * 100.0)
}

/// Summary statistics of one metric over a record set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub metric: String,
    /// Records contributing a value
    pub count: usize,
    /// Records in the group without a value
    pub absent: usize,
    pub mean: Computed<f64>,
    pub median: Computed<f64>,
    pub min: Computed<f64>,
    pub max: Computed<f64>,
    pub std_dev: Computed<f64>,
}

impl Aggregate {
    pub fn from_sample(metric: &str, sample: &MetricSample) -> Self {
        let values = &sample.values;
        Self {
            metric: metric.to_string(),
            count: values.len(),
            absent: sample.absent,
            mean: mean(values),
            median: median(values),
            min: min(values),
            max: max(values),
            std_dev: std_dev(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    pub group: GroupKey,
    pub aggregate: Aggregate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_undefined_never_zero() {
        let agg = Aggregate::from_sample("growth", &MetricSample::default());
        assert_eq!(agg.count, 0);
        assert!(!agg.mean.is_defined());
        assert!(!agg.median.is_defined());
        assert!(!agg.min.is_defined());
        assert!(!agg.max.is_defined());
        assert!(!agg.std_dev.is_defined());
        assert_eq!(agg.mean.get(), None);
    }

    #[test]
    fn basic_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values).get(), Some(5.0));
        assert_eq!(median(&values).get(), Some(4.5));
        assert_eq!(min(&values).get(), Some(2.0));
        assert_eq!(max(&values).get(), Some(9.0));
        let sd = std_dev(&values).get().unwrap();
        assert!((sd - 2.138089935299395).abs() < 1e-12);
    }

    #[test]
    fn std_dev_needs_two_values() {
        assert_eq!(
            std_dev(&[42.0]),
            Computed::Undefined(InsufficientDataError::TooFewValues {
                required: 2,
                available: 1
            })
        );
    }

    #[test]
    fn odd_median_and_percentile() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).get(), Some(2.0));
        assert_eq!(percentile_rank(&[10.0, 20.0, 30.0, 40.0], 30.0).get(), Some(50.0));
    }
}
