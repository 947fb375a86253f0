pub mod analytics;
pub mod app;
pub mod common;
pub mod config;
pub mod domain;
pub mod graphql;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod server;

pub use analytics::AnalyticsEngine;
pub use app::{AppServices, IngestUseCase};
pub use common::error::{IgsError, Result};
pub use config::AppConfig;
