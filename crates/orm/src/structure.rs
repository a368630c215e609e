use serde::{Deserialize, Serialize};

use crate::count::CountSpec;
use crate::error::{Error, Result};
use crate::field::{FieldSpec, FieldType};
use crate::join::JoinSpec;
use crate::subrequest::SubRequestSpec;

const fn default_true() -> bool {
    true
}

/// Entity-level capability flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Adds a `status` column.
    pub has_status: bool,
    /// Adds a `position` column kept dense within each scope.
    pub has_positions: bool,
    /// Adds `createdTime` and `modifiedTime`.
    pub has_timestamps: bool,
    /// Adds `createdUser` and `modifiedUser`.
    pub has_users: bool,
    /// Deletes set `isDeleted` instead of removing the row.
    pub soft_delete: bool,
    /// Rows may be created.
    #[serde(default = "default_true")]
    pub can_create: bool,
    /// Rows may be edited.
    #[serde(default = "default_true")]
    pub can_edit: bool,
    /// Rows may be deleted.
    #[serde(default = "default_true")]
    pub can_delete: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            has_status: false,
            has_positions: false,
            has_timestamps: false,
            has_users: false,
            soft_delete: false,
            can_create: true,
            can_edit: true,
            can_delete: true,
        }
    }
}

/// A column computed by an SQL expression over the main table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSpec {
    /// SQL expression, selected as `(expression) AS key`.
    pub expression: String,
    /// How the computed value is read back; `key` is the output key.
    #[serde(flatten)]
    pub field: FieldSpec,
}

/// The compiled description of one entity type.
///
/// Built once with [`StructureBuilder`] (usually through a
/// [`Registry`](crate::Registry)) and only read afterwards.
#[derive(Debug, Clone)]
pub struct Structure {
    name: String,
    table: String,
    fields: Vec<FieldSpec>,
    joins: Vec<JoinSpec>,
    counts: Vec<CountSpec>,
    expressions: Vec<ExpressionSpec>,
    sub_requests: Vec<SubRequestSpec>,
    capabilities: Capabilities,
}

impl Structure {
    /// Starts describing an entity stored in `table`.
    #[must_use]
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> StructureBuilder {
        StructureBuilder::new(name, table)
    }

    /// Entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Main table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields of the main table, synthetic fields first.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Joined tables.
    #[must_use]
    pub fn joins(&self) -> &[JoinSpec] {
        &self.joins
    }

    /// Aggregates.
    #[must_use]
    pub fn counts(&self) -> &[CountSpec] {
        &self.counts
    }

    /// Computed columns.
    #[must_use]
    pub fn expressions(&self) -> &[ExpressionSpec] {
        &self.expressions
    }

    /// Collections hydrated after the main query.
    #[must_use]
    pub fn sub_requests(&self) -> &[SubRequestSpec] {
        &self.sub_requests
    }

    /// Capability flags.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The identifier field, if the entity declares one.
    #[must_use]
    pub fn identifier(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.flags.is_identifier)
    }

    /// Storage column of the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when the entity has no identifier.
    pub fn id_key(&self) -> Result<&str> {
        self.identifier()
            .map(|field| field.key.as_str())
            .ok_or_else(|| Error::Schema(format!("`{}` has no identifier field", self.name)))
    }

    /// Looks up a main-table field by storage column or output key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.key == key || field.output_key() == key)
    }

    /// Fields referencing the parent row.
    pub fn parent_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.flags.is_parent)
    }

    /// Boolean fields held by at most one row per scope.
    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|field| field.flags.is_unique && field.field_type == FieldType::Boolean)
    }
}

/// Append-only builder of a [`Structure`].
#[derive(Debug)]
pub struct StructureBuilder {
    name: String,
    table: String,
    fields: Vec<FieldSpec>,
    joins: Vec<JoinSpec>,
    counts: Vec<CountSpec>,
    expressions: Vec<ExpressionSpec>,
    sub_requests: Vec<SubRequestSpec>,
    capabilities: Capabilities,
}

impl StructureBuilder {
    fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            joins: Vec::new(),
            counts: Vec::new(),
            expressions: Vec::new(),
            sub_requests: Vec::new(),
            capabilities: Capabilities::default(),
        }
    }

    /// Sets the capability flags.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Adds a field of the main table.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a joined table.
    #[must_use]
    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    /// Adds an aggregate.
    #[must_use]
    pub fn count(mut self, count: CountSpec) -> Self {
        self.counts.push(count);
        self
    }

    /// Adds a computed column.
    #[must_use]
    pub fn expression(mut self, expression: impl Into<String>, field: FieldSpec) -> Self {
        self.expressions.push(ExpressionSpec {
            expression: expression.into(),
            field,
        });
        self
    }

    /// Adds a hydrated collection.
    #[must_use]
    pub fn sub_request(mut self, sub_request: SubRequestSpec) -> Self {
        self.sub_requests.push(sub_request);
        self
    }

    /// Validates the description and injects the synthetic fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when more than one identifier is declared,
    /// when a declared field collides with a synthetic one, or when a
    /// sub-request's child key is not a field of its target entity.
    pub fn build(self) -> Result<Structure> {
        let name = self.name;

        let identifiers = self.fields.iter().filter(|field| field.flags.is_identifier).count();
        if identifiers > 1 {
            return Err(Error::Schema(format!("`{name}` declares {identifiers} identifier fields")));
        }

        let synthetic = synthetic_fields(&self.capabilities);
        if let Some(clash) =
            self.fields.iter().find(|field| synthetic.iter().any(|s| s.key == field.key))
        {
            return Err(Error::Schema(format!(
                "`{name}` declares `{}`, which its capabilities already provide",
                clash.key
            )));
        }

        let mut fields = synthetic;
        fields.extend(self.fields.into_iter().map(named));

        let joins = self
            .joins
            .into_iter()
            .map(|mut join| {
                let prefix = join.output_prefix().to_string();
                join.fields = join
                    .fields
                    .into_iter()
                    .map(|mut field| {
                        field.prefix = Some(prefix.clone());
                        named(field)
                    })
                    .collect();
                join
            })
            .collect::<Vec<_>>();

        for (index, join) in joins.iter().enumerate() {
            if let Some(on) = &join.on
                && !joins[..index].iter().any(|earlier| &earlier.key == on)
            {
                return Err(Error::UnknownAlias {
                    table: self.table,
                    key: on.clone(),
                });
            }
        }

        for sub_request in &self.sub_requests {
            sub_request.validate()?;
        }

        let expressions = self
            .expressions
            .into_iter()
            .map(|mut expression| {
                expression.field = named(expression.field);
                expression
            })
            .collect();

        tracing::debug!(entity = %name, table = %self.table, fields = fields.len(), "compiled structure");

        Ok(Structure {
            name,
            table: self.table,
            fields,
            joins,
            counts: self.counts,
            expressions,
            sub_requests: self.sub_requests,
            capabilities: self.capabilities,
        })
    }
}

fn named(mut field: FieldSpec) -> FieldSpec {
    if field.name.is_empty() {
        field.name.clone_from(&field.key);
    }
    field
}

// Columns the capability flags add ahead of the declared fields.
fn synthetic_fields(capabilities: &Capabilities) -> Vec<FieldSpec> {
    let mut fields = Vec::new();
    if capabilities.has_timestamps {
        fields.push(FieldSpec::new("createdTime", FieldType::Timestamp).read_only());
        fields.push(FieldSpec::new("modifiedTime", FieldType::Timestamp).read_only());
    }
    if capabilities.has_users {
        fields.push(FieldSpec::new("createdUser", FieldType::Integer).read_only());
        fields.push(FieldSpec::new("modifiedUser", FieldType::Integer).read_only());
    }
    if capabilities.soft_delete {
        fields.push(FieldSpec::new("isDeleted", FieldType::Boolean).read_only());
    }
    if capabilities.has_positions {
        fields.push(FieldSpec::new("position", FieldType::Integer));
    }
    if capabilities.has_status {
        fields.push(FieldSpec::new("status", FieldType::Integer));
    }
    fields
}
