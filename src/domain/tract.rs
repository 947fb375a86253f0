use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::common::constants::TRACT_ID_LENGTH;
use crate::common::error::{IgsError, Result};

static TRACT_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^[0-9]{{{}}}$", TRACT_ID_LENGTH)).expect("tract id pattern is valid")
});

/// Census tract FIPS code: exactly 11 ASCII digits, leading zeros kept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TractId(String);

impl TractId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if TRACT_ID_RE.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(IgsError::InvalidTractId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit state FIPS prefix
    pub fn state_fips(&self) -> &str {
        &self.0[..2]
    }

    /// Five-digit state+county FIPS prefix
    pub fn county_fips(&self) -> &str {
        &self.0[..5]
    }
}

impl TryFrom<String> for TractId {
    type Error = IgsError;

    fn try_from(value: String) -> Result<Self> {
        TractId::parse(&value)
    }
}

impl From<TractId> for String {
    fn from(id: TractId) -> Self {
        id.0
    }
}

impl fmt::Display for TractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite identity of a stored record
pub type TractKey = (TractId, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityZone {
    Yes,
    No,
    #[default]
    Unknown,
}

impl OpportunityZone {
    pub fn from_cell(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => OpportunityZone::Yes,
            "no" | "n" | "false" | "0" => OpportunityZone::No,
            _ => OpportunityZone::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityZone::Yes => "yes",
            OpportunityZone::No => "no",
            OpportunityZone::Unknown => "unknown",
        }
    }

    pub fn from_stored(raw: &str) -> Self {
        match raw {
            "yes" => OpportunityZone::Yes,
            "no" => OpportunityZone::No,
            _ => OpportunityZone::Unknown,
        }
    }
}

/// One census tract's metrics for one year.
///
/// Metric values are `None` when the source marked them absent. A stored
/// record carries an entry for every metric column the source declared, so
/// "absent" and "never measured" are both `None` and never `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractRecord {
    pub tract_id: TractId,
    pub year: i32,
    pub county: String,
    pub state: String,
    pub is_opportunity_zone: OpportunityZone,
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl TractRecord {
    pub fn key(&self) -> TractKey {
        (self.tract_id.clone(), self.year)
    }

    /// Present value of a metric, `None` when absent or not carried
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }

    pub fn present_metric_count(&self) -> usize {
        self.metrics.values().filter(|v| v.is_some()).count()
    }
}
