use anyhow::{Context, Result};
use sea_query::{Alias, SimpleExpr, Value};

use crate::query::{Query, QueryBuilder};
use crate::value::values_to_datatypes;

/// Builder for constructing INSERT queries.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, Value)>,
}

impl InsertBuilder {
    /// Creates a new INSERT query builder for `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    /// Sets a column value for the insert, replacing an earlier value of the
    /// same column.
    #[must_use]
    pub fn set<V>(mut self, column: &str, value: V) -> Self
    where
        V: Into<Value>,
    {
        let value = value.into();
        if let Some(slot) = self.values.iter_mut().find(|(c, _)| c == column) {
            slot.1 = value;
        } else {
            self.values.push((column.to_string(), value));
        }
        self
    }

    /// Build the INSERT query.
    ///
    /// # Errors
    ///
    /// Returns an error if any query values cannot be converted to connection data types.
    pub fn build(self) -> Result<Query> {
        if self.values.is_empty() {
            let sql = format!("INSERT INTO \"{}\" DEFAULT VALUES", self.table);
            return Ok(Query {
                sql,
                params: Vec::new(),
            });
        }

        let mut statement = sea_query::Query::insert();
        statement.into_table(Alias::new(&self.table));

        let columns: Vec<_> = self.values.iter().map(|(column, _)| Alias::new(column)).collect();
        let row: Vec<SimpleExpr> =
            self.values.into_iter().map(|(_, value)| SimpleExpr::Value(value)).collect();

        statement.columns(columns);
        statement.values(row).context("insert row does not match its columns")?;

        let (sql, values) = statement.build(QueryBuilder::default());
        let params = values_to_datatypes(values.0)?;

        tracing::debug!(
            table = %self.table,
            sql = %sql,
            param_count = params.len(),
            "InsertBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
