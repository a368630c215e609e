use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::condition::ConditionBuilder;
use crate::error::{Error, Result};
use crate::options::MappingOptions;
use crate::selection::Selection;
use crate::structure::Structure;
use crate::value::{json_key, json_to_operand, json_to_value};
use crate::{Connection, Record};

/// How hydrated child rows are arranged on their parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Shape {
    /// A list of children.
    #[default]
    List,
    /// An object keyed by a child field; the last child wins on duplicates.
    Keyed {
        /// Output key of the child field.
        field: String,
    },
    /// An object keyed by a child field holding lists of children.
    KeyedList {
        /// Output key of the child field.
        field: String,
    },
}

/// Part of each child row kept in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSelector {
    /// A single value.
    Field(String),
    /// A record restricted to these keys.
    Fields(Vec<String>),
}

/// A one-to-many collection hydrated on already fetched parent records.
#[derive(Debug, Clone)]
pub struct SubRequestSpec {
    /// Output key of the collection on the parent.
    pub key: String,
    /// Child entity.
    pub structure: Arc<Structure>,
    /// Output key of the parent value the children refer to.
    pub parent_key: String,
    /// Child column holding the parent value.
    pub child_key: String,
    /// `(column, operator, value)` filters of the children.
    pub conditions: Vec<(String, String, Json)>,
    /// `(column, ascending)` ordering of the children.
    pub order: Vec<(String, bool)>,
    /// Arrangement of the collection.
    pub shape: Shape,
    /// Part of each child kept.
    pub value: Option<ValueSelector>,
}

impl SubRequestSpec {
    /// Hydrates `key` with the children of `structure` whose `child_key`
    /// equals the parent's identifier.
    #[must_use]
    pub fn new(key: impl Into<String>, structure: Arc<Structure>, child_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            structure,
            parent_key: "id".to_string(),
            child_key: child_key.into(),
            conditions: Vec::new(),
            order: Vec::new(),
            shape: Shape::List,
            value: None,
        }
    }

    /// Matches children against another parent output key.
    #[must_use]
    pub fn parent_key(mut self, key: impl Into<String>) -> Self {
        self.parent_key = key.into();
        self
    }

    /// Filters the children.
    #[must_use]
    pub fn condition(mut self, column: impl Into<String>, operator: impl Into<String>, value: Json) -> Self {
        self.conditions.push((column.into(), operator.into(), value));
        self
    }

    /// Orders the children.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push((column.into(), ascending));
        self
    }

    /// Sets the arrangement of the collection.
    #[must_use]
    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Keeps only part of each child.
    #[must_use]
    pub fn value(mut self, value: ValueSelector) -> Self {
        self.value = Some(value);
        self
    }

    /// Checks the child key is a field of the child entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when it is not.
    pub fn validate(&self) -> Result<()> {
        self.child_output_key().map(|_| ())
    }

    fn child_output_key(&self) -> Result<String> {
        self.structure.field(&self.child_key).map(crate::FieldSpec::output_key).ok_or_else(|| {
            Error::Schema(format!(
                "sub-request `{}` refers to `{}`, which is not a field of `{}`",
                self.key,
                self.child_key,
                self.structure.name()
            ))
        })
    }

    /// Fetches the children of every parent with one query and stores them
    /// under `key`, recursively hydrating the children's own collections.
    ///
    /// Parents without children receive an empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] for an invalid child key, compilation errors
    /// from [`Selection`], and [`Error::Execution`] when the query fails.
    pub fn request(
        &self, conn: &dyn Connection, options: &MappingOptions, parents: &mut [Record],
    ) -> Result<()> {
        let child_key = self.child_output_key()?;

        let mut ids: Vec<&Json> = Vec::new();
        for parent in parents.iter() {
            if let Some(id) = parent.get(&self.parent_key).filter(|id| !id.is_null())
                && !ids.contains(&id)
            {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            for parent in parents.iter_mut() {
                parent.insert(self.key.clone(), self.empty());
            }
            return Ok(());
        }

        let mut query = ConditionBuilder::new()
            .add(&self.child_key, "=", ids.iter().map(|id| json_to_value(id)).collect::<Vec<_>>());
        for (column, operator, value) in &self.conditions {
            query = query.add(column, operator, json_to_operand(value));
        }
        if self.structure.capabilities().soft_delete {
            query = query.add("isDeleted", "=", 0);
        }
        for (column, ascending) in &self.order {
            query = query.order_by(column, *ascending);
        }

        let structure = self.structure.as_ref();
        let mut selection = Selection::new(structure, options);
        selection.add_fields(false).add_joins(&[], true)?.add_counts()?;
        let rows = selection.request(conn, &query)?;
        let mut children = selection.resolve(&rows, &[]);
        hydrate(structure, conn, options, &mut children)?;

        tracing::debug!(
            key = %self.key,
            entity = structure.name(),
            parents = ids.len(),
            children = children.len(),
            "hydrated sub-request"
        );

        let mut buckets: HashMap<String, Json> = HashMap::new();
        for child in children {
            let owner = child.get(&child_key).map(json_key).unwrap_or_default();
            let group = child.get(self.group_field()).map(json_key).unwrap_or_default();
            let value = self.select(child);
            let bucket = buckets.entry(owner).or_insert_with(|| self.empty());

            match (&self.shape, bucket) {
                (Shape::List, Json::Array(items)) => items.push(value),
                (Shape::Keyed { .. }, Json::Object(map)) => {
                    map.insert(group, value);
                }
                (Shape::KeyedList { .. }, Json::Object(map)) => {
                    if let Json::Array(items) = map.entry(group).or_insert_with(|| Json::Array(Vec::new())) {
                        items.push(value);
                    }
                }
                _ => {}
            }
        }

        for parent in parents.iter_mut() {
            let owner = parent.get(&self.parent_key).map(json_key).unwrap_or_default();
            let collection = buckets.get(&owner).cloned().unwrap_or_else(|| self.empty());
            parent.insert(self.key.clone(), collection);
        }
        Ok(())
    }

    fn group_field(&self) -> &str {
        match &self.shape {
            Shape::List => "",
            Shape::Keyed { field } | Shape::KeyedList { field } => field,
        }
    }

    fn empty(&self) -> Json {
        match self.shape {
            Shape::List => Json::Array(Vec::new()),
            Shape::Keyed { .. } | Shape::KeyedList { .. } => Json::Object(Record::new()),
        }
    }

    fn select(&self, mut child: Record) -> Json {
        match &self.value {
            None => Json::Object(child),
            Some(ValueSelector::Field(key)) => child.remove(key).unwrap_or(Json::Null),
            Some(ValueSelector::Fields(keys)) => Json::Object(
                keys.iter()
                    .map(|key| (key.clone(), child.remove(key).unwrap_or(Json::Null)))
                    .collect(),
            ),
        }
    }
}

/// Runs every sub-request of `structure` over `records`.
///
/// # Errors
///
/// Returns the first error raised by a sub-request.
pub fn hydrate(
    structure: &Structure, conn: &dyn Connection, options: &MappingOptions, records: &mut [Record],
) -> Result<()> {
    for sub_request in structure.sub_requests() {
        sub_request.request(conn, options, records)?;
    }
    Ok(())
}
