pub mod analytics;
pub mod tract;

pub use analytics::*;
pub use tract::{filter_from, MetricEntry, ThresholdInput, Tract, TractFilterInput, TractPageResult};
