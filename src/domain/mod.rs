// Domain data shapes shared across layers

pub mod catalog;
pub mod computed;
pub mod tract;

pub use catalog::{canonicalize_label, MetricCatalog, MetricCategory, MetricDefinition, MetricKind, METRIC_CATALOG};
pub use computed::{Computed, InsufficientDataError};
pub use tract::{OpportunityZone, TractId, TractKey, TractRecord};
