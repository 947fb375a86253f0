/// Shared constants for the ingestion pipeline and analytics engine.
/// Values here mirror the published IGS dataset layout.

// Census tract FIPS codes are state(2) + county(3) + tract(6)
pub const TRACT_ID_LENGTH: usize = 11;

// Years covered by the published dataset
pub const DEFAULT_YEAR_MIN: i32 = 2017;
pub const DEFAULT_YEAR_MAX: i32 = 2024;

/// Cell values treated as "not applicable" in the raw source.
/// Compared trimmed and case-insensitively.
pub const DEFAULT_SENTINELS: &[&str] = &["N/A", "NA", "#N/A", "null", "-", ""];

/// How many leading rows are inspected while looking for the header row
pub const DEFAULT_HEADER_SCAN_LIMIT: usize = 25;

/// The top-level composite score. Stored as published, never recomputed.
pub const COMPOSITE_METRIC: &str = "inclusive_growth_score";

// Pillar scores used by the scorecard
pub const PLACE_METRIC: &str = "place";
pub const ECONOMY_METRIC: &str = "economy";
pub const COMMUNITY_METRIC: &str = "community";

/// Changes within +/- this band are reported as stable
pub const TREND_STABLE_BAND: f64 = 2.0;

// Scorecard thresholds
pub const STRENGTH_THRESHOLD: f64 = 60.0;
pub const WEAKNESS_THRESHOLD: f64 = 45.0;

/// Metrics compared in year-over-year reports when the caller names none
pub const KEY_EQUITY_METRICS: &[&str] = &[
    "inclusive_growth_score",
    "internet_access_score",
    "affordable_housing_score",
    "minority_women_owned_businesses_score",
    "personal_income_score",
    "health_insurance_coverage_score",
];

/// Weights of the county opportunity index. Renormalized over the metrics
/// present on each tract.
pub const OPPORTUNITY_WEIGHTS: &[(&str, f64)] = &[
    ("minority_women_owned_businesses_score", 0.25),
    ("inclusive_growth_score", 0.20),
    ("internet_access_score", 0.15),
    ("affordable_housing_score", 0.15),
    ("personal_income_score", 0.10),
    ("health_insurance_coverage_score", 0.10),
    ("new_businesses_score", 0.05),
];

/// Indicators inspected for scorecard strengths and improvement areas
pub const SCORECARD_INDICATORS: &[(&str, &str)] = &[
    ("internet_access_score", "Internet Access"),
    ("affordable_housing_score", "Affordable Housing"),
    ("minority_women_owned_businesses_score", "Minority/Women-Owned Businesses"),
    ("personal_income_score", "Personal Income"),
    ("health_insurance_coverage_score", "Health Insurance Coverage"),
    ("new_businesses_score", "New Business Formation"),
    ("early_education_enrollment_score", "Early Education"),
];

// Default file locations
pub const DEFAULT_CONFIG_PATH: &str = "igs.toml";
pub const DEFAULT_SOURCE_PATH: &str = "data/raw/IGS-score.csv";
pub const DEFAULT_DATABASE_PATH: &str = "data/igs_data.db";
