//! Registries for datasources, models and algorithms.

mod algorithm_registry;
mod datasource_registry;
mod model_registry;

pub use algorithm_registry::AlgorithmRegistry;
pub use datasource_registry::DatasourceRegistry;
pub use model_registry::ModelRegistry;
