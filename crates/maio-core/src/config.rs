//! Centralized configuration for the lifecycle service.
//!
//! Constants live on unit structs grouped by concern; runtime choices are made
//! on [`crate::MlServiceBuilder`].

use chrono::Duration as ChronoDuration;
use std::time::Duration;

use crate::canonical::KeyCase;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "MAIO ML";
    /// Creator recorded when a request does not name one.
    pub const DEFAULT_USER_ID: i64 = 1;
}

/// SQLite store configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const DB_FILE_NAME: &'static str = "maio-ml.db";
    pub const BUSY_TIMEOUT_MS: u64 = 5_000;
}

/// Scheduler firing configuration.
pub struct SchedulerConfig;

impl SchedulerConfig {
    pub const TICK_INTERVAL: Duration = Duration::from_secs(15);
    /// Look-back window handed to the predictor for each firing.
    pub const INFERENCE_WINDOW_MINUTES: i64 = 256;
    /// Scores at or above this count as anomalies in the in-process predictor.
    pub const ANOMALY_SCORE_THRESHOLD: f64 = 4.5;

    pub fn inference_window() -> ChronoDuration {
        ChronoDuration::minutes(Self::INFERENCE_WINDOW_MINUTES)
    }
}

/// History pagination configuration.
pub struct HistoryConfig;

impl HistoryConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 50;
    pub const MAX_PAGE_SIZE: usize = 500;
}

/// Parameter canonicalization defaults.
pub struct CanonicalConfig;

impl CanonicalConfig {
    pub const DEFAULT_KEY_CASE: KeyCase = KeyCase::Fold;
}

/// HTTP provider configuration.
pub struct ProviderConfig;

impl ProviderConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Training runs can take a long time; the trainer call gets its own budget.
    pub const TRAINING_TIMEOUT: Duration = Duration::from_secs(6 * 3600);
}
