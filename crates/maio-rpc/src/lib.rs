//! MAIO RPC - JSON-RPC 2.0 front end for the model-version lifecycle.
//!
//! Every method takes a single params object and answers with the
//! camelCase JSON form of the core types. Domain errors keep their stable
//! code under `error.data.code`.

mod handlers;
pub mod server;

pub use server::{router, start_server, AppState};
