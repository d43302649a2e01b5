//! Model registry.
//!
//! A model's signature (datasource, output tag and input tags) is fixed once
//! it has any version, since every version was trained against it.

use crate::error::{MaioError, Result};
use crate::external::DatasourceProvider;
use crate::models::{validate_name, validate_tag, Model, ModelPatch, NewModel};
use crate::store::{self, time, Store};
use rusqlite::Connection;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ModelRegistry {
    store: Store,
    datasources: Arc<dyn DatasourceProvider>,
    default_user_id: i64,
}

impl ModelRegistry {
    pub fn new(
        store: Store,
        datasources: Arc<dyn DatasourceProvider>,
        default_user_id: i64,
    ) -> Self {
        Self {
            store,
            datasources,
            default_user_id,
        }
    }

    pub async fn create(&self, input: NewModel) -> Result<Model> {
        validate_name("name", &input.name)?;
        validate_tag("outputTag", &input.output_tag)?;
        for tag in &input.input_tags {
            validate_tag("inputTags", tag)?;
        }
        self.require_datasource(input.datasource_id).await?;

        let model = self.store.write(|tx| {
            if store::models::name_taken(tx, &input.name, None)? {
                return Err(MaioError::DuplicateName {
                    entity: "model",
                    name: input.name.clone(),
                });
            }

            let now = time::now();
            let mut model = Model {
                id: 0,
                name: input.name.clone(),
                description: input.description.clone(),
                use_case: input.use_case.clone(),
                usage_guidelines: input.usage_guidelines.clone(),
                datasource_id: input.datasource_id,
                output_tag: input.output_tag.clone(),
                input_tags: input.input_tags.clone(),
                created_by: input.created_by.unwrap_or(self.default_user_id),
                created_at: now,
                updated_at: now,
                versions: Vec::new(),
            };
            model.id = store::models::insert(tx, &model)?;
            Ok(model)
        })?;

        info!("Created model {} '{}'", model.id, model.name);
        Ok(model)
    }

    /// Get a model with its versions.
    pub fn get(&self, id: i64) -> Result<Model> {
        self.store.read(|conn| load(conn, id))
    }

    pub fn list(&self) -> Result<Vec<Model>> {
        self.store.read(|conn| {
            let mut models = store::models::list(conn)?;
            for model in &mut models {
                model.versions = store::versions::list_by_model(conn, model.id)?;
            }
            Ok(models)
        })
    }

    pub async fn update(&self, id: i64, patch: ModelPatch) -> Result<Model> {
        if let Some(name) = &patch.name {
            validate_name("name", name)?;
        }
        if let Some(tag) = &patch.output_tag {
            validate_tag("outputTag", tag)?;
        }
        for tag in patch.input_tags.iter().flatten() {
            validate_tag("inputTags", tag)?;
        }

        let current = self.get(id)?;
        if let Some(datasource_id) = patch.datasource_id {
            if datasource_id != current.datasource_id {
                self.require_datasource(datasource_id).await?;
            }
        }

        let model = self.store.write(|tx| {
            let mut model = store::models::get(tx, id)?
                .ok_or_else(|| MaioError::not_found("model", id))?;

            if store::versions::count_by_model(tx, id)? > 0 {
                if let Some(field) = patch.signature_change(&model) {
                    return Err(MaioError::ImmutableSignature {
                        model_id: id,
                        field,
                    });
                }
            }

            if let Some(name) = patch.name {
                if store::models::name_taken(tx, &name, Some(id))? {
                    return Err(MaioError::DuplicateName {
                        entity: "model",
                        name,
                    });
                }
                model.name = name;
            }
            if let Some(description) = patch.description {
                model.description = Some(description);
            }
            if let Some(use_case) = patch.use_case {
                model.use_case = Some(use_case);
            }
            if let Some(guidelines) = patch.usage_guidelines {
                model.usage_guidelines = Some(guidelines);
            }
            if let Some(datasource_id) = patch.datasource_id {
                model.datasource_id = datasource_id;
            }
            if let Some(tag) = patch.output_tag {
                model.output_tag = tag;
            }
            if let Some(tags) = patch.input_tags {
                model.input_tags = tags;
            }

            model.updated_at = time::now();
            store::models::save(tx, &model)?;
            model.versions = store::versions::list_by_model(tx, id)?;
            Ok(model)
        })?;

        info!("Updated model {}", id);
        Ok(model)
    }

    /// Delete a model and, with it, all of its versions.
    ///
    /// Refused while any version is training or deployed; otherwise versions,
    /// deployments, schedulers and history go in the same transaction.
    pub fn delete(&self, id: i64) -> Result<()> {
        let removed = self.store.write(|tx| {
            let model = load(tx, id)?;
            if let Some(busy) = model.versions.iter().find(|v| v.status.is_locked()) {
                return Err(MaioError::InvalidState {
                    entity: "model",
                    id,
                    message: format!(
                        "version {} (#{}) is {}",
                        busy.id, busy.version, busy.status
                    ),
                });
            }
            store::models::delete(tx, id)?;
            Ok(model.versions.len())
        })?;

        info!("Deleted model {} with {} version(s)", id, removed);
        Ok(())
    }

    async fn require_datasource(&self, datasource_id: i64) -> Result<()> {
        match self.datasources.get_datasource(datasource_id).await? {
            Some(_) => Ok(()),
            None => Err(MaioError::not_found("datasource", datasource_id)),
        }
    }
}

fn load(conn: &Connection, id: i64) -> Result<Model> {
    let mut model = store::models::get(conn, id)?.ok_or_else(|| MaioError::not_found("model", id))?;
    model.versions = store::versions::list_by_model(conn, id)?;
    Ok(model)
}
