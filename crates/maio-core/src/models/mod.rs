//! Domain types shared by the registries, the lifecycle manager and the
//! transport layer. JSON field names are camelCase.

mod algorithm;
mod model;
mod page;
mod scheduler;
mod version;

pub use algorithm::*;
pub use model::*;
pub use page::*;
pub use scheduler::*;
pub use version::*;

pub(crate) use model::{validate_name, validate_tag};
pub(crate) use version::validate_training_percentage;
