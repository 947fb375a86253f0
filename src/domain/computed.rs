use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a statistic could not be computed. Returned as a value, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InsufficientDataError {
    /// Fewer present values than the statistic needs
    TooFewValues { required: usize, available: usize },
    /// All present values are identical, so the statistic divides by zero
    ZeroVariance { metric: String },
    /// The target record has no value for the metric
    TargetValueAbsent { metric: String },
    /// The peer group has no present values for the metric
    PeerAverageUndefined { metric: String },
    /// A relative change against a zero baseline
    ZeroBaseline { metric: String },
}

impl fmt::Display for InsufficientDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsufficientDataError::TooFewValues {
                required,
                available,
            } => write!(f, "needs at least {required} values, {available} present"),
            InsufficientDataError::ZeroVariance { metric } => {
                write!(f, "{metric} has zero variance over the sample")
            }
            InsufficientDataError::TargetValueAbsent { metric } => {
                write!(f, "{metric} is absent on the target record")
            }
            InsufficientDataError::PeerAverageUndefined { metric } => {
                write!(f, "no peer has a value for {metric}")
            }
            InsufficientDataError::ZeroBaseline { metric } => {
                write!(f, "{metric} baseline is zero")
            }
        }
    }
}

/// A statistic that is either computed or explicitly undefined.
///
/// Callers must match on this; there is no default numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Computed<T> {
    Value(T),
    Undefined(InsufficientDataError),
}

impl<T> Computed<T> {
    pub fn is_defined(&self) -> bool {
        matches!(self, Computed::Value(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Computed::Value(v) => Some(v),
            Computed::Undefined(_) => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Computed::Value(v) => Some(v),
            Computed::Undefined(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&InsufficientDataError> {
        match self {
            Computed::Value(_) => None,
            Computed::Undefined(reason) => Some(reason),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Computed<U> {
        match self {
            Computed::Value(v) => Computed::Value(f(v)),
            Computed::Undefined(r) => Computed::Undefined(r),
        }
    }

    pub fn and_then<U, F: FnOnce(T) -> Computed<U>>(self, f: F) -> Computed<U> {
        match self {
            Computed::Value(v) => f(v),
            Computed::Undefined(r) => Computed::Undefined(r),
        }
    }
}

impl<T: Copy> Computed<T> {
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_carries_reason() {
        let c: Computed<f64> = Computed::Undefined(InsufficientDataError::TooFewValues {
            required: 2,
            available: 1,
        });
        assert!(!c.is_defined());
        assert_eq!(c.get(), None);
        assert_eq!(
            c.reason().map(|r| r.to_string()).as_deref(),
            Some("needs at least 2 values, 1 present")
        );
    }

    #[test]
    fn serializes_externally_tagged() {
        let value: Computed<f64> = Computed::Value(0.5);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"value":0.5}"#);

        let undefined: Computed<f64> = Computed::Undefined(InsufficientDataError::ZeroVariance {
            metric: "growth".into(),
        });
        let json = serde_json::to_value(&undefined).unwrap();
        assert_eq!(json["undefined"]["reason"], "zero_variance");
    }

    #[test]
    fn map_and_then_propagate_undefined() {
        let c = Computed::Value(4.0_f64).map(|v| v * 2.0);
        assert_eq!(c.get(), Some(8.0));

        let chained = c.and_then(|_| {
            Computed::<f64>::Undefined(InsufficientDataError::ZeroBaseline {
                metric: "m".into(),
            })
        });
        assert!(!chained.is_defined());
    }
}
