//! MAIO Core - model-version lifecycle for the anomaly-detection service.
//!
//! Registers models and training algorithms, drives model versions through
//! training and deployment, and runs scheduled inference against deployed
//! versions while keeping an execution history. All state lives in one SQLite
//! database; trainers, predictors, deployers and datasources are reached
//! through the traits in [`external`].
//!
//! # Example
//!
//! ```rust,ignore
//! use maio_core::{MlService, NewVersion};
//!
//! #[tokio::main]
//! async fn main() -> maio_core::Result<()> {
//!     let service = MlService::builder().data_dir("./data").build()?;
//!
//!     let version = service
//!         .versions()
//!         .create(NewVersion { model_id: 1, name: "baseline".into(), ..Default::default() })
//!         .await?;
//!     service.versions().train(version.id).await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod canonical;
pub mod config;
pub mod error;
pub mod external;
pub mod history;
pub mod lifecycle;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod store;

mod service;

pub use cancel::CancellationToken;
pub use canonical::KeyCase;
pub use error::{MaioError, Result};
pub use external::{Providers, TrainingOutcome};
pub use history::HistoryLedger;
pub use lifecycle::VersionLifecycle;
pub use models::*;
pub use registry::{AlgorithmRegistry, DatasourceRegistry, ModelRegistry};
pub use scheduler::SchedulerManager;
pub use service::{MlService, MlServiceBuilder};
pub use store::Store;
