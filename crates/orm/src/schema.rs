//! Entity-level reads and writes.
//!
//! [`Schema`] ties a compiled [`Structure`] to a connection. Reads compile a
//! [`Selection`] per call; writes marshal input through the field
//! descriptions and keep ordinal positions and exclusivity flags consistent
//! within each scope.

use std::sync::Arc;

use chrono::Utc;
use sea_query::{Alias, Expr, SelectStatement, Value};
use serde_json::Value as Json;
use tracing::instrument;

use crate::condition::ConditionBuilder;
use crate::delete::DeleteBuilder;
use crate::error::{Error, Result};
use crate::field::FieldSpec;
use crate::insert::InsertBuilder;
use crate::options::MappingOptions;
use crate::query::{Query, QueryBuilder};
use crate::selection::Selection;
use crate::structure::Structure;
use crate::subrequest::hydrate;
use crate::update::UpdateBuilder;
use crate::value::{cell_i64, json_i64, values_to_datatypes};
use crate::{Connection, Record, Row};

const POSITION: &str = "position";
const DELETED: &str = "isDeleted";

/// Reads and writes rows of one entity.
///
/// ```ignore
/// let schema = Schema::new(registry.structure("Product")?, conn).with_user(7);
///
/// let id = schema.create(&json!({"name": "Widget", "price": 19.99}).as_object().cloned().unwrap_or_default())?;
/// let products = schema.get_entities(ConditionBuilder::new().add("name", "LIKE", "wid"))?;
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    structure: Arc<Structure>,
    conn: Arc<dyn Connection>,
    options: MappingOptions,
    user: Option<i64>,
    decrypt: bool,
}

impl Schema {
    /// Binds an entity to a connection with default mapping options.
    #[must_use]
    pub fn new(structure: Arc<Structure>, conn: Arc<dyn Connection>) -> Self {
        Self {
            structure,
            conn,
            options: MappingOptions::default(),
            user: None,
            decrypt: false,
        }
    }

    /// Replaces the mapping options.
    #[must_use]
    pub fn with_options(mut self, options: MappingOptions) -> Self {
        self.options = options;
        self
    }

    /// Records `user` as the creator or modifier of written rows.
    #[must_use]
    pub const fn with_user(mut self, user: i64) -> Self {
        self.user = Some(user);
        self
    }

    /// Reads encrypted fields in clear through the decrypt template of the
    /// mapping options; otherwise they read as empty strings.
    #[must_use]
    pub const fn with_decryption(mut self) -> Self {
        self.decrypt = true;
        self
    }

    /// The bound entity.
    #[must_use]
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Fetches the records matching `query`, with joins, aggregates and
    /// sub-requests resolved.
    ///
    /// Deleted rows of soft-deletable entities are skipped. Without an
    /// explicit order, rows are sorted by position (when tracked) and then
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns compilation errors from [`Selection`] and
    /// [`Error::Execution`] when a query fails.
    #[instrument(skip_all, fields(entity = %self.structure.name()))]
    pub fn get_entities(&self, query: ConditionBuilder) -> Result<Vec<Record>> {
        let mut query = self.visible(query);
        if !query.has_order() {
            if self.structure.capabilities().has_positions {
                query = query.order_by(POSITION, true);
            }
            if let Some(identifier) = self.structure.identifier() {
                query = query.order_by(&identifier.key, true);
            }
        }

        let mut selection = Selection::new(&self.structure, &self.options);
        selection.add_fields(self.decrypt).add_joins(&[], true)?.add_counts()?;
        let rows = selection.request(self.conn.as_ref(), &query)?;
        let mut records = selection.resolve(&rows, &[]);
        hydrate(&self.structure, self.conn.as_ref(), &self.options, &mut records)?;

        tracing::debug!(records = records.len(), "fetched entities");
        Ok(records)
    }

    /// Fetches one record by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when the entity has no identifier, otherwise
    /// as [`get_entities`](Self::get_entities).
    pub fn get_entity(&self, id: i64) -> Result<Option<Record>> {
        let query = ConditionBuilder::new().add(self.structure.id_key()?, "=", id).limit(0, Some(1));
        Ok(self.get_entities(query)?.into_iter().next())
    }

    /// Counts the rows matching `query`, ignoring its ordering and limits.
    ///
    /// # Errors
    ///
    /// As [`get_entities`](Self::get_entities).
    #[instrument(skip_all, fields(entity = %self.structure.name()))]
    pub fn get_total(&self, query: ConditionBuilder) -> Result<i64> {
        let query = self.visible(query);

        let mut selection = Selection::new(&self.structure, &self.options);
        selection.add_fields(false).add_joins(&[], false)?.add_counts()?;
        let statement = selection.get_total_expression(&query)?;
        let rows = self.conn.query(&statement.sql, &statement.params)?;

        Ok(cell_i64(rows.first().and_then(|row| row.get("total"))))
    }

    /// Inserts a row and returns its identifier.
    ///
    /// Editable fields are taken from `values` (by column or output key),
    /// falling back to their default. The row is placed at its requested
    /// position, or appended to its scope, and takes over any exclusivity
    /// flag it sets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPermitted`] when the entity forbids creation and
    /// [`Error::Execution`] when a statement fails.
    #[instrument(skip_all, fields(entity = %self.structure.name()))]
    pub fn create(&self, values: &Record) -> Result<i64> {
        let capabilities = self.structure.capabilities();
        if !capabilities.can_create {
            return Err(self.not_permitted("create"));
        }

        let mut row = self.marshal(values, None);
        let now = Json::from(Utc::now().timestamp());
        if capabilities.has_timestamps {
            row.insert("createdTime".to_string(), now.clone());
            row.insert("modifiedTime".to_string(), now);
        }
        if capabilities.has_users
            && let Some(user) = self.user
        {
            row.insert("createdUser".to_string(), Json::from(user));
            row.insert("modifiedUser".to_string(), Json::from(user));
        }
        if capabilities.soft_delete {
            row.insert(DELETED.to_string(), Json::from(0));
        }

        let scope = self.scope(&row);
        if capabilities.has_positions {
            let position = self.reorder(None, Some(&row), &scope)?;
            row.insert(POSITION.to_string(), Json::from(position));
        }

        let mut insert = InsertBuilder::new(self.structure.table());
        for field in self.structure.fields() {
            if let Some(value) = row.get(&field.key) {
                insert = insert.set(&field.key, field.to_stored_value(value));
            }
        }
        self.run(&insert.build()?)?;
        let id = self.conn.last_insert_id()?;

        for field in self.structure.unique_fields() {
            let flag = stored_flag(field, row.get(&field.key));
            if flag != 0 {
                self.ensure_unique(&scope, &field.key, id, 0, flag)?;
            }
        }

        tracing::debug!(id, "created entity");
        Ok(id)
    }

    /// Updates the editable fields present in `values`.
    ///
    /// A row whose parent reference changes leaves a closed gap in its old
    /// scope and is inserted into the new one; otherwise it moves within its
    /// scope when a new position is requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPermitted`] when the entity forbids editing,
    /// [`Error::NotFound`] when no row has this identifier and
    /// [`Error::Execution`] when a statement fails.
    #[instrument(skip(self, values), fields(entity = %self.structure.name()))]
    pub fn edit(&self, id: i64, values: &Record) -> Result<()> {
        let capabilities = self.structure.capabilities();
        if !capabilities.can_edit {
            return Err(self.not_permitted("edit"));
        }
        let old = self.current(id)?.ok_or_else(|| self.not_found(id))?;
        let mut new = self.marshal(values, Some(&old));

        let old_scope = self.scope(&old);
        let new_scope = self.scope(&new);
        let moved = self.structure.parent_fields().any(|field| {
            field.to_stored_value(value_of(&old, &field.key))
                != field.to_stored_value(value_of(&new, &field.key))
        });

        let mut update = UpdateBuilder::new(self.structure.table());
        for field in self.structure.fields().iter().filter(|field| field.is_editable() && field.key != POSITION) {
            if let Some(value) = input(values, field) {
                update = update.set(&field.key, field.to_stored_value(value));
            }
        }

        if capabilities.has_positions {
            let position = if moved {
                self.reorder(Some(&old), None, &old_scope)?;
                let mut entering = new.clone();
                let requested = self.structure.field(POSITION).and_then(|field| input(values, field));
                entering.insert(POSITION.to_string(), requested.cloned().unwrap_or_else(|| Json::from(0)));
                self.reorder(None, Some(&entering), &new_scope)?
            } else {
                self.reorder(Some(&old), Some(&new), &old_scope)?
            };
            new.insert(POSITION.to_string(), Json::from(position));
            update = update.set(POSITION, position);
        }

        if capabilities.has_timestamps {
            update = update.set("modifiedTime", Utc::now().timestamp());
        }
        if capabilities.has_users
            && let Some(user) = self.user
        {
            update = update.set("modifiedUser", user);
        }

        if !update.is_empty() {
            let filter = ConditionBuilder::new().add(self.structure.id_key()?, "=", id);
            self.run(&update.filter(filter).build()?)?;
        }

        for field in self.structure.unique_fields() {
            let before = stored_flag(field, old.get(&field.key));
            let after = stored_flag(field, new.get(&field.key));
            if moved {
                if before != 0 {
                    self.ensure_unique(&old_scope, &field.key, id, before, 0)?;
                }
                if after != 0 {
                    self.ensure_unique(&new_scope, &field.key, id, 0, after)?;
                }
            } else {
                self.ensure_unique(&new_scope, &field.key, id, before, after)?;
            }
        }

        tracing::debug!(id, moved, "edited entity");
        Ok(())
    }

    /// Deletes a row, or marks it deleted for soft-deletable entities.
    ///
    /// Later siblings move up one position and any exclusivity flag the row
    /// held passes to another row of its scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPermitted`] when the entity forbids deletion,
    /// [`Error::NotFound`] when no row has this identifier and
    /// [`Error::Execution`] when a statement fails.
    #[instrument(skip(self), fields(entity = %self.structure.name()))]
    pub fn delete(&self, id: i64) -> Result<()> {
        let capabilities = self.structure.capabilities();
        if !capabilities.can_delete {
            return Err(self.not_permitted("delete"));
        }
        let old = self.current(id)?.ok_or_else(|| self.not_found(id))?;
        let scope = self.scope(&old);

        if capabilities.has_positions {
            self.reorder(Some(&old), None, &scope)?;
        }

        let filter = ConditionBuilder::new().add(self.structure.id_key()?, "=", id);
        let statement = if capabilities.soft_delete {
            let mut update = UpdateBuilder::new(self.structure.table()).set(DELETED, 1);
            if capabilities.has_timestamps {
                update = update.set("modifiedTime", Utc::now().timestamp());
            }
            update.filter(filter).build()?
        } else {
            DeleteBuilder::new(self.structure.table()).filter(filter).build()?
        };
        self.run(&statement)?;

        for field in self.structure.unique_fields() {
            let flag = stored_flag(field, old.get(&field.key));
            if flag != 0 {
                self.ensure_unique(&scope, &field.key, id, flag, 0)?;
            }
        }

        tracing::debug!(id, soft = capabilities.soft_delete, "deleted entity");
        Ok(())
    }

    /// Keeps the positions of `scope` dense around a create (`old` absent),
    /// an edit (both present) or a delete (`new` absent), and returns the
    /// position to store on the row itself.
    ///
    /// Rows between the old and requested position shift by one in a single
    /// `UPDATE`. Without a requested position a created row is appended and
    /// an edited row keeps its place. Returns 0 when positions are not
    /// tracked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when a statement fails.
    pub fn reorder(&self, old: Option<&Record>, new: Option<&Record>, scope: &ConditionBuilder) -> Result<i64> {
        if !self.structure.capabilities().has_positions {
            return Ok(0);
        }
        let next = self.next_position(scope)?;

        let creating = old.is_none();
        let deleting = new.is_none();
        let old_position = old.map_or(next, position_of);
        let requested = new
            .map(position_of)
            .filter(|position| *position > 0)
            .unwrap_or(if creating { next } else { next - 1 });

        if creating && requested >= next {
            return Ok(next);
        }
        if !deleting && old_position == requested {
            return Ok(requested);
        }

        let target = if !creating && !deleting && requested >= next { next - 1 } else { requested };
        if !deleting && target == old_position {
            return Ok(target);
        }

        let (from, to, delta) =
            if target > old_position { (old_position + 1, target, -1) } else { (target, old_position - 1, 1) };
        if from <= to {
            let window = ConditionBuilder::new()
                .add_group(scope)
                .add(POSITION, ">=", from)
                .add(POSITION, "<=", to);
            let statement =
                UpdateBuilder::new(self.structure.table()).increment(POSITION, delta).filter(window).build()?;
            let shifted = self.run(&statement)?;
            tracing::debug!(from, to, delta, shifted, "shifted positions");
        }

        Ok(target)
    }

    /// Keeps `column` set on at most one row of `scope` when row `id` changes
    /// it from `old` to `new`.
    ///
    /// Setting the flag clears it on every other row of the scope. Clearing
    /// it hands it to one other row, chosen by the scope's ordering (else
    /// position, then identifier). Returns whether another row changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when the entity has no identifier and
    /// [`Error::Execution`] when a statement fails.
    pub fn ensure_unique(&self, scope: &ConditionBuilder, column: &str, id: i64, old: i64, new: i64) -> Result<bool> {
        if (old != 0) == (new != 0) {
            return Ok(false);
        }
        let table = self.structure.table();
        let id_key = self.structure.id_key()?;

        if new != 0 {
            let others = ConditionBuilder::new().add_group(scope).add(id_key, "<>", id).add(column, "=", 1);
            let statement = UpdateBuilder::new(table).set(column, 0).filter(others).build()?;
            return Ok(self.run(&statement)? > 0);
        }

        let mut candidates = ConditionBuilder::new().add_group(scope).add(id_key, "<>", id);
        if !candidates.has_order() {
            if self.structure.capabilities().has_positions {
                candidates = candidates.order_by(POSITION, true);
            }
            candidates = candidates.order_by(id_key, true);
        }
        let candidates = candidates.limit(0, Some(1));

        let mut statement = sea_query::Query::select();
        statement.column(Alias::new(id_key)).from(Alias::new(table));
        let rows = self.fetch(&statement, &candidates)?;
        let Some(other) = rows.first().map(|row| cell_i64(row.get(id_key))) else {
            return Ok(false);
        };

        let statement = UpdateBuilder::new(table)
            .set(column, 1)
            .filter(ConditionBuilder::new().add(id_key, "=", other))
            .build()?;
        self.run(&statement)?;

        tracing::debug!(column, from = id, to = other, "handed over exclusive flag");
        Ok(true)
    }

    // 1 + the highest position in scope.
    fn next_position(&self, scope: &ConditionBuilder) -> Result<i64> {
        let mut statement = sea_query::Query::select();
        statement
            .expr_as(Expr::col(Alias::new(POSITION)).max(), Alias::new("max"))
            .from(Alias::new(self.structure.table()));
        let rows = self.fetch(&statement, scope)?;
        Ok(cell_i64(rows.first().and_then(|row| row.get("max"))) + 1)
    }

    // Runs a single-table SELECT restricted by `filter`.
    fn fetch(&self, statement: &SelectStatement, filter: &ConditionBuilder) -> Result<Vec<Row>> {
        let (mut sql, values) = statement.build(QueryBuilder::default());
        let suffix = filter.get(true);
        if !suffix.is_empty() {
            sql.push(' ');
            sql.push_str(&suffix);
        }
        let params = values_to_datatypes(values.0.into_iter().chain(filter.params().iter().cloned()))?;

        tracing::debug!(
            table = %self.structure.table(),
            sql = %sql,
            param_count = params.len(),
            "Schema generated SQL"
        );
        Ok(self.conn.query(&sql, &params)?)
    }

    fn run(&self, statement: &Query) -> Result<u64> {
        Ok(self.conn.exec(&statement.sql, &statement.params)?)
    }

    // Adds the not-deleted predicate to a caller's query.
    fn visible(&self, query: ConditionBuilder) -> ConditionBuilder {
        let query = query.enclose();
        if self.structure.capabilities().soft_delete { query.add(DELETED, "=", 0) } else { query }
    }

    // Siblings of a row: same parent references, not deleted.
    fn scope(&self, row: &Record) -> ConditionBuilder {
        let mut scope = ConditionBuilder::new();
        for field in self.structure.parent_fields() {
            let value = field.to_stored_value(value_of(row, &field.key));
            scope = if matches!(value, Value::String(None)) {
                scope.add(&field.key, "IS NULL", value)
            } else {
                scope.add(&field.key, "=", value)
            };
        }
        if self.structure.capabilities().soft_delete {
            scope = scope.add(DELETED, "=", 0);
        }
        scope
    }

    // Current main-table values of a live row, keyed by column.
    fn current(&self, id: i64) -> Result<Option<Record>> {
        let query = self.visible(ConditionBuilder::new().add(self.structure.id_key()?, "=", id));

        let mut selection = Selection::new(&self.structure, &self.options);
        selection.add_fields(false);
        let rows = selection.request(self.conn.as_ref(), &query)?;

        Ok(selection.resolve(&rows, &[]).into_iter().next().map(|mut record| {
            self.structure
                .fields()
                .iter()
                .filter(|field| !field.flags.is_identifier)
                .filter_map(|field| record.remove(&field.output_key()).map(|value| (field.key.clone(), value)))
                .collect()
        }))
    }

    // Overlays the editable inputs on `base`; a new row takes field defaults.
    fn marshal(&self, values: &Record, base: Option<&Record>) -> Record {
        let mut row = base.cloned().unwrap_or_default();
        for field in self.structure.fields().iter().filter(|field| field.is_editable()) {
            match (input(values, field), &field.default) {
                (Some(value), _) => {
                    row.insert(field.key.clone(), value.clone());
                }
                (None, Some(default)) if base.is_none() => {
                    row.insert(field.key.clone(), default.clone());
                }
                _ => {}
            }
        }
        row
    }

    fn not_permitted(&self, operation: &str) -> Error {
        Error::NotPermitted {
            entity: self.structure.name().to_string(),
            operation: operation.to_string(),
        }
    }

    fn not_found(&self, id: i64) -> Error {
        Error::NotFound {
            entity: self.structure.name().to_string(),
            id,
        }
    }
}

fn input<'v>(values: &'v Record, field: &FieldSpec) -> Option<&'v Json> {
    values.get(&field.key).or_else(|| values.get(&field.output_key()))
}

static NULL: Json = Json::Null;

fn value_of<'r>(row: &'r Record, key: &str) -> &'r Json {
    row.get(key).unwrap_or(&NULL)
}

fn position_of(row: &Record) -> i64 {
    row.get(POSITION).map_or(0, json_i64)
}

fn stored_flag(field: &FieldSpec, value: Option<&Json>) -> i64 {
    match value.map(|value| field.to_stored_value(value)) {
        Some(Value::BigInt(Some(flag))) => flag,
        _ => 0,
    }
}
