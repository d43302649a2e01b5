//! Algorithm registry with canonical-parameter deduplication.
//!
//! Algorithms form fork families: a root record plus forks whose
//! `base_algorithm_id` points at the root. A record that a version references
//! is never edited in place; asking for different parameters resolves to the
//! family member that already has them, or creates a fork.

use crate::canonical::{self, KeyCase};
use crate::error::{MaioError, Result};
use crate::models::{validate_name, Algorithm, AlgorithmPatch, NewAlgorithm};
use crate::store::{self, time, Store};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AlgorithmRegistry {
    store: Store,
    key_case: KeyCase,
}

impl AlgorithmRegistry {
    pub fn new(store: Store, key_case: KeyCase) -> Self {
        Self { store, key_case }
    }

    pub fn key_case(&self) -> KeyCase {
        self.key_case
    }

    /// Register a new root algorithm.
    pub fn create(&self, input: NewAlgorithm) -> Result<Algorithm> {
        validate_name("name", &input.name)?;
        let canonical = canonical::canonicalize(&input.parameters, self.key_case)?;

        let algorithm = self.store.write(|tx| {
            if store::algorithms::root_name_taken(tx, &input.name, None)? {
                return Err(MaioError::DuplicateName {
                    entity: "algorithm",
                    name: input.name.clone(),
                });
            }

            let now = time::now();
            let mut algorithm = Algorithm {
                id: 0,
                name: input.name.clone(),
                description: input.description.clone(),
                parameters: input.parameters.clone(),
                base_algorithm_id: None,
                created_at: now,
                updated_at: now,
            };
            algorithm.id = store::algorithms::insert(tx, &algorithm, &canonical)?.ok_or_else(
                || MaioError::DuplicateName {
                    entity: "algorithm",
                    name: input.name.clone(),
                },
            )?;
            Ok(algorithm)
        })?;

        info!("Created algorithm {} '{}'", algorithm.id, algorithm.name);
        Ok(algorithm)
    }

    pub fn get(&self, id: i64) -> Result<Algorithm> {
        self.store.read(|conn| {
            store::algorithms::get(conn, id)?.ok_or_else(|| MaioError::not_found("algorithm", id))
        })
    }

    pub fn list(&self) -> Result<Vec<Algorithm>> {
        self.store.read(store::algorithms::list)
    }

    /// Update an algorithm.
    ///
    /// Name and description may always change. Parameters may only change
    /// while no version references the record.
    pub fn update(&self, id: i64, patch: AlgorithmPatch) -> Result<Algorithm> {
        if let Some(name) = &patch.name {
            validate_name("name", name)?;
        }

        self.store.write(|tx| {
            let mut algorithm = store::algorithms::get(tx, id)?
                .ok_or_else(|| MaioError::not_found("algorithm", id))?;

            if let Some(name) = patch.name {
                if !algorithm.is_fork() && store::algorithms::root_name_taken(tx, &name, Some(id))?
                {
                    return Err(MaioError::DuplicateName {
                        entity: "algorithm",
                        name,
                    });
                }
                algorithm.name = name;
            }
            if let Some(description) = patch.description {
                algorithm.description = Some(description);
            }

            let canonical = match patch.parameters {
                Some(parameters) => {
                    let references = store::algorithms::reference_count(tx, id)?;
                    if references > 0 {
                        return Err(MaioError::InvalidState {
                            entity: "algorithm",
                            id,
                            message: format!(
                                "parameters are shared by {} version(s) and cannot be edited in place",
                                references
                            ),
                        });
                    }
                    let canonical = canonical::canonicalize(&parameters, self.key_case)?;
                    if let Some(other) =
                        store::algorithms::find_in_family(tx, algorithm.root_id(), &canonical)?
                    {
                        if other != id {
                            return Err(MaioError::InvalidState {
                                entity: "algorithm",
                                id,
                                message: format!(
                                    "algorithm {} already has these parameters",
                                    other
                                ),
                            });
                        }
                    }
                    algorithm.parameters = parameters;
                    canonical
                }
                None => canonical::canonicalize(&algorithm.parameters, self.key_case)?,
            };

            algorithm.updated_at = time::now();
            store::algorithms::save(tx, &algorithm, &canonical)?;
            debug!("Updated algorithm {}", id);
            Ok(algorithm)
        })
    }

    /// Delete an algorithm nobody references and nothing forks from.
    pub fn delete(&self, id: i64) -> Result<()> {
        self.store.write(|tx| {
            if store::algorithms::get(tx, id)?.is_none() {
                return Err(MaioError::not_found("algorithm", id));
            }
            let references = store::algorithms::reference_count(tx, id)?;
            if references > 0 {
                return Err(MaioError::InvalidState {
                    entity: "algorithm",
                    id,
                    message: format!("referenced by {} version(s)", references),
                });
            }
            let forks = store::algorithms::fork_count(tx, id)?;
            if forks > 0 {
                return Err(MaioError::InvalidState {
                    entity: "algorithm",
                    id,
                    message: format!("has {} fork(s)", forks),
                });
            }
            store::algorithms::delete(tx, id)?;
            Ok(())
        })?;
        info!("Deleted algorithm {}", id);
        Ok(())
    }

    /// Resolve `new_parameters` against algorithm `existing_id`.
    ///
    /// Returns `existing_id` when the parameters are equivalent, the id of a
    /// family member that already has them, or the id of a new fork.
    pub fn resolve_or_fork(&self, existing_id: i64, new_parameters: &Value) -> Result<i64> {
        let algorithm = self
            .store
            .write(|tx| self.resolve_or_fork_in(tx, existing_id, new_parameters))?;
        Ok(algorithm.id)
    }

    /// [`Self::resolve_or_fork`] inside a caller's transaction.
    pub(crate) fn resolve_or_fork_in(
        &self,
        conn: &Connection,
        existing_id: i64,
        new_parameters: &Value,
    ) -> Result<Algorithm> {
        let existing = store::algorithms::get(conn, existing_id)?
            .ok_or_else(|| MaioError::not_found("algorithm", existing_id))?;

        let wanted = canonical::canonicalize(new_parameters, self.key_case)?;
        if canonical::canonicalize(&existing.parameters, self.key_case)? == wanted {
            return Ok(existing);
        }

        let root_id = existing.root_id();
        if let Some(id) = store::algorithms::find_in_family(conn, root_id, &wanted)? {
            debug!("Parameters for algorithm {} resolved to {}", existing_id, id);
            return store::algorithms::get(conn, id)?
                .ok_or_else(|| MaioError::not_found("algorithm", id));
        }

        let now = time::now();
        let mut fork = Algorithm {
            id: 0,
            name: existing.name.clone(),
            description: existing.description.clone(),
            parameters: new_parameters.clone(),
            base_algorithm_id: Some(root_id),
            created_at: now,
            updated_at: now,
        };
        match store::algorithms::insert(conn, &fork, &wanted)? {
            Some(id) => {
                fork.id = id;
                info!(
                    "Forked algorithm {} from {} (family {})",
                    id, existing_id, root_id
                );
                Ok(fork)
            }
            None => {
                // Lost a race against an identical fork; use the winner.
                let id = store::algorithms::find_in_family(conn, root_id, &wanted)?
                    .ok_or_else(|| MaioError::Database {
                        message: format!("Fork of algorithm {} vanished after conflict", root_id),
                        source: None,
                    })?;
                store::algorithms::get(conn, id)?
                    .ok_or_else(|| MaioError::not_found("algorithm", id))
            }
        }
    }
}
