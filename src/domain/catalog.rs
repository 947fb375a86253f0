//! Metric catalog shared by ingestion and analytics.
//!
//! Source column labels and query metric names both go through
//! [`canonicalize_label`], so a metric keeps the same machine key no matter
//! how the source spells its column.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::common::error::{IgsError, Result};

/// Lowercase, spell out `%` and `&`, collapse every other run of
/// non-alphanumerics into a single `_`, trim leading/trailing `_`.
pub fn canonicalize_label(label: &str) -> String {
    let expanded = label
        .trim()
        .to_lowercase()
        .replace('%', " pct ")
        .replace('&', " and ");

    let mut out = String::with_capacity(expanded.len());
    let mut pending_sep = false;
    for ch in expanded.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Summary,
    Place,
    Economy,
    Community,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Composite or pillar score published with the dataset
    Composite,
    /// 1-100 indicator score
    IndicatorScore,
    /// Comparison baseline for an indicator
    Baseline,
    /// Raw tract measurement behind an indicator
    TractValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub display_name: String,
    pub category: MetricCategory,
    pub kind: MetricKind,
    /// Informational only; raw rows are not validated against it
    pub valid_range: Option<(f64, f64)>,
}

impl MetricDefinition {
    pub fn is_score(&self) -> bool {
        matches!(self.kind, MetricKind::Composite | MetricKind::IndicatorScore)
    }
}

const SCORE_RANGE: (f64, f64) = (1.0, 100.0);

// (key, score display name, category, baseline columns carry a "%" suffix)
const INDICATORS: &[(&str, &str, MetricCategory, bool)] = &[
    ("net_occupancy", "Net Occupancy", MetricCategory::Place, true),
    ("residential_real_estate_value", "Residential Real Estate Value", MetricCategory::Place, true),
    ("acres_of_park_land", "Park Land Access", MetricCategory::Place, true),
    ("affordable_housing", "Affordable Housing Score", MetricCategory::Place, true),
    ("internet_access", "Internet Access Score", MetricCategory::Place, true),
    ("travel_time_to_work", "Travel Time to Work", MetricCategory::Place, true),
    ("new_businesses", "New Businesses Score", MetricCategory::Economy, true),
    ("spend_growth", "Spending Growth", MetricCategory::Economy, true),
    ("small_business_loans", "Small Business Loans Score", MetricCategory::Economy, true),
    ("minority_women_owned_businesses", "Minority/Women-Owned Businesses Score", MetricCategory::Economy, true),
    ("labor_market_engagement_index", "Labor Market Engagement", MetricCategory::Economy, false),
    ("commercial_diversity", "Commercial Diversity", MetricCategory::Economy, true),
    ("personal_income", "Personal Income Score", MetricCategory::Community, true),
    ("spending_per_capita", "Spending Per Capita", MetricCategory::Community, true),
    ("female_above_poverty", "Female Above Poverty", MetricCategory::Community, true),
    ("gini_coefficient", "Income Equality (Gini)", MetricCategory::Community, false),
    ("early_education_enrollment", "Early Education Enrollment", MetricCategory::Community, true),
    ("health_insurance_coverage", "Health Insurance Coverage Score", MetricCategory::Community, true),
];

const COMPOSITES: &[(&str, &str, MetricCategory)] = &[
    ("inclusive_growth_score", "Inclusive Growth Score", MetricCategory::Summary),
    ("growth", "Growth", MetricCategory::Summary),
    ("inclusion", "Inclusion", MetricCategory::Summary),
    ("place", "Place (Overall)", MetricCategory::Place),
    ("place_growth", "Place Growth", MetricCategory::Place),
    ("place_inclusion", "Place Inclusion", MetricCategory::Place),
    ("economy", "Economy (Overall)", MetricCategory::Economy),
    ("economy_growth", "Economy Growth", MetricCategory::Economy),
    ("economy_inclusion", "Economy Inclusion", MetricCategory::Economy),
    ("community", "Community (Overall)", MetricCategory::Community),
    ("community_growth", "Community Growth", MetricCategory::Community),
    ("community_inclusion", "Community Inclusion", MetricCategory::Community),
];

// Alternate spellings seen in queries and older exports
const ALIASES: &[(&str, &str)] = &[
    ("igs", "inclusive_growth_score"),
    ("minority_women_business_score", "minority_women_owned_businesses_score"),
    ("minority_women_owned_business_score", "minority_women_owned_businesses_score"),
    ("park_land_score", "acres_of_park_land_score"),
];

/// The set of known metrics, keyed by canonical name
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    definitions: BTreeMap<String, MetricDefinition>,
    aliases: HashMap<String, String>,
}

impl MetricCatalog {
    /// Every definition's display name is registered as an alias of it
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        let aliases = definitions
            .iter()
            .map(|d| (canonicalize_label(&d.display_name), d.name.clone()))
            .filter(|(alias, name)| alias != name)
            .collect();
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            aliases,
        }
    }

    pub fn with_alias(mut self, alias: &str, target: &str) -> Self {
        self.aliases
            .insert(canonicalize_label(alias), target.to_string());
        self
    }

    /// Catalog of the published Inclusive Growth Score dataset
    pub fn igs() -> Self {
        let mut defs = Vec::with_capacity(COMPOSITES.len() + INDICATORS.len() * 3);
        for (name, display, category) in COMPOSITES {
            defs.push(MetricDefinition {
                name: name.to_string(),
                display_name: display.to_string(),
                category: *category,
                kind: MetricKind::Composite,
                valid_range: Some(SCORE_RANGE),
            });
        }
        for (key, display, category, pct) in INDICATORS {
            let suffix = if *pct { "_pct" } else { "" };
            let label = display.trim_end_matches(" Score");
            defs.push(MetricDefinition {
                name: format!("{key}_score"),
                display_name: display.to_string(),
                category: *category,
                kind: MetricKind::IndicatorScore,
                valid_range: Some(SCORE_RANGE),
            });
            defs.push(MetricDefinition {
                name: format!("{key}_base{suffix}"),
                display_name: format!("{label} Base"),
                category: *category,
                kind: MetricKind::Baseline,
                valid_range: None,
            });
            defs.push(MetricDefinition {
                name: format!("{key}_tract{suffix}"),
                display_name: format!("{label} Tract"),
                category: *category,
                kind: MetricKind::TractValue,
                valid_range: None,
            });
        }

        ALIASES
            .iter()
            .fold(Self::new(defs), |catalog, (alias, target)| {
                catalog.with_alias(alias, target)
            })
    }

    pub fn lookup(&self, name: &str) -> Option<&MetricDefinition> {
        self.definitions.get(name)
    }

    /// Canonicalizes `name`, follows aliases, and returns the definition
    pub fn resolve(&self, name: &str) -> Option<&MetricDefinition> {
        let canonical = canonicalize_label(name);
        if let Some(def) = self.definitions.get(&canonical) {
            return Some(def);
        }
        self.aliases
            .get(&canonical)
            .and_then(|target| self.definitions.get(target))
    }

    /// Like [`resolve`](Self::resolve) but fails with `UnknownMetric`
    pub fn require(&self, name: &str) -> Result<&MetricDefinition> {
        self.resolve(name)
            .ok_or_else(|| IgsError::UnknownMetric(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

pub static METRIC_CATALOG: Lazy<MetricCatalog> = Lazy::new(MetricCatalog::igs);
