//! Datasource registry.
//!
//! Datasources live in the datasource provider; this is the service-side
//! view with input validation and not-found reporting.

use crate::error::{MaioError, Result};
use crate::external::{Datasource, DatasourceProvider};
use crate::models::validate_name;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct DatasourceRegistry {
    datasources: Arc<dyn DatasourceProvider>,
}

impl DatasourceRegistry {
    pub fn new(datasources: Arc<dyn DatasourceProvider>) -> Self {
        Self { datasources }
    }

    pub async fn create(&self, name: &str) -> Result<Datasource> {
        validate_name("name", name)?;
        let datasource = self.datasources.create_datasource(name.trim()).await?;
        info!("Created datasource {} '{}'", datasource.id, datasource.name);
        Ok(datasource)
    }

    pub async fn get(&self, id: i64) -> Result<Datasource> {
        self.datasources
            .get_datasource(id)
            .await?
            .ok_or_else(|| MaioError::not_found("datasource", id))
    }

    pub async fn list(&self) -> Result<Vec<Datasource>> {
        self.datasources.list_datasources().await
    }
}
