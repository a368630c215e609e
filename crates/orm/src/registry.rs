//! Declarative entity descriptions and their one-off compilation into
//! [`Structure`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::instrument;

use crate::count::CountSpec;
use crate::error::{Error, Result};
use crate::field::FieldSpec;
use crate::join::JoinSpec;
use crate::structure::{Capabilities, ExpressionSpec, Structure};
use crate::subrequest::{Shape, SubRequestSpec, ValueSelector};

fn default_parent_key() -> String {
    "id".to_string()
}

/// Description of one entity, as produced by schema discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescription {
    /// Entity name, used by sub-requests to refer to it.
    pub name: String,
    /// Main table.
    pub table: String,
    /// Capability flags.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Main-table fields.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Joined tables.
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    /// Aggregates.
    #[serde(default)]
    pub counts: Vec<CountSpec>,
    /// Computed columns.
    #[serde(default)]
    pub expressions: Vec<ExpressionSpec>,
    /// Hydrated collections.
    #[serde(default)]
    pub sub_requests: Vec<SubRequestDescription>,
}

/// Description of a hydrated collection; the child entity is named rather
/// than embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRequestDescription {
    /// Output key on the parent.
    pub key: String,
    /// Child entity name.
    pub entity: String,
    /// Parent output key the children refer to.
    #[serde(default = "default_parent_key")]
    pub parent_key: String,
    /// Child column holding the parent value.
    pub child_key: String,
    /// `(column, operator, value)` filters.
    #[serde(default)]
    pub conditions: Vec<(String, String, Json)>,
    /// `(column, ascending)` ordering.
    #[serde(default)]
    pub order: Vec<(String, bool)>,
    /// Arrangement.
    #[serde(default)]
    pub shape: Shape,
    /// Part of each child kept.
    #[serde(default)]
    pub value: Option<ValueSelector>,
}

/// Every compiled entity, keyed by name.
///
/// Built once at startup and read-only afterwards; structures are shared
/// through `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: BTreeMap<String, Arc<Structure>>,
}

impl Registry {
    /// Compiles a JSON array of [`EntityDescription`]s.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed JSON, otherwise as
    /// [`from_descriptions`](Self::from_descriptions).
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptions: Vec<EntityDescription> = serde_json::from_str(json)?;
        Self::from_descriptions(descriptions)
    }

    /// Compiles descriptions, each after the entities its sub-requests name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] for duplicate names, unknown or cyclic
    /// sub-request entities, and any error of [`StructureBuilder::build`](crate::StructureBuilder::build).
    #[instrument(skip_all, fields(count = descriptions.len()))]
    pub fn from_descriptions(descriptions: Vec<EntityDescription>) -> Result<Self> {
        let mut pending: Vec<EntityDescription> = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            if pending.iter().any(|p| p.name == description.name) {
                return Err(Error::Schema(format!("entity `{}` is described twice", description.name)));
            }
            pending.push(description);
        }

        let mut registry = Self::default();
        while !pending.is_empty() {
            let ready = pending.iter().position(|description| {
                description
                    .sub_requests
                    .iter()
                    .all(|sub| registry.entities.contains_key(&sub.entity))
            });

            let Some(index) = ready else {
                return Err(unresolved(&pending));
            };
            let description = pending.remove(index);
            let structure = registry.compile(description)?;
            registry.entities.insert(structure.name().to_string(), Arc::new(structure));
        }

        tracing::debug!(entities = registry.entities.len(), "compiled registry");
        Ok(registry)
    }

    /// The compiled entity with this name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Structure>> {
        self.entities.get(name).cloned()
    }

    /// The compiled entity with this name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when no entity has this name.
    pub fn structure(&self, name: &str) -> Result<Arc<Structure>> {
        self.get(name).ok_or_else(|| Error::Schema(format!("unknown entity `{name}`")))
    }

    /// Names of the compiled entities, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    fn compile(&self, description: EntityDescription) -> Result<Structure> {
        let mut builder = Structure::builder(description.name, description.table)
            .capabilities(description.capabilities);

        for field in description.fields {
            builder = builder.field(field);
        }
        for join in description.joins {
            builder = builder.join(join);
        }
        for count in description.counts {
            builder = builder.count(count);
        }
        for expression in description.expressions {
            builder = builder.expression(expression.expression, expression.field);
        }
        for sub in description.sub_requests {
            let structure = self.structure(&sub.entity)?;
            builder = builder.sub_request(SubRequestSpec {
                key: sub.key,
                structure,
                parent_key: sub.parent_key,
                child_key: sub.child_key,
                conditions: sub.conditions,
                order: sub.order,
                shape: sub.shape,
                value: sub.value,
            });
        }

        builder.build()
    }
}

// Explains why none of the pending descriptions can be compiled.
fn unresolved(pending: &[EntityDescription]) -> Error {
    for description in pending {
        for sub in &description.sub_requests {
            if !pending.iter().any(|p| p.name == sub.entity) {
                return Error::Schema(format!(
                    "`{}` sub-request `{}` refers to unknown entity `{}`",
                    description.name, sub.key, sub.entity
                ));
            }
        }
    }
    let names = pending.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
    Error::Schema(format!("sub-requests form a cycle between {names}"))
}
