use anyhow::Result;
use sea_query::{Alias, Expr, SimpleExpr, Value};

use crate::condition::ConditionBuilder;
use crate::query::{Query, QueryBuilder};
use crate::value::values_to_datatypes;

/// Builder for constructing UPDATE queries.
///
/// The `SET` list is generated by `sea-query`; the `WHERE` clause comes from
/// a [`ConditionBuilder`] over bare column names.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set_clauses: Vec<(String, SimpleExpr)>,
    filter: ConditionBuilder,
}

impl UpdateBuilder {
    /// Creates a new UPDATE query builder for `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set_clauses: Vec::new(),
            filter: ConditionBuilder::new(),
        }
    }

    /// Sets a column to a new value.
    #[must_use]
    pub fn set<V>(mut self, column: &str, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.set_clauses.push((column.to_string(), SimpleExpr::Value(value.into())));
        self
    }

    /// Adds `delta` to a numeric column.
    #[must_use]
    pub fn increment(mut self, column: &str, delta: i64) -> Self {
        let expr = Expr::col(Alias::new(column)).add(delta);
        self.set_clauses.push((column.to_string(), expr));
        self
    }

    /// Restricts the updated rows.
    #[must_use]
    pub fn filter(mut self, filter: ConditionBuilder) -> Self {
        self.filter = filter;
        self
    }

    /// Whether nothing would be set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set_clauses.is_empty()
    }

    /// Build the UPDATE query.
    ///
    /// # Errors
    ///
    /// Returns an error if query values cannot be converted to connection data types.
    pub fn build(self) -> Result<Query> {
        let mut statement = sea_query::Query::update();
        statement.table(Alias::new(&self.table));

        for (column, expr) in self.set_clauses {
            statement.value(Alias::new(column), expr);
        }

        let (mut sql, values) = statement.build(QueryBuilder::default());
        let conditions = self.filter.where_clause(true);
        if !conditions.is_empty() {
            sql.push(' ');
            sql.push_str(&conditions);
        }

        let values = values.0.into_iter().chain(self.filter.params().iter().cloned());
        let params = values_to_datatypes(values)?;

        tracing::debug!(
            table = %self.table,
            sql = %sql,
            param_count = params.len(),
            "UpdateBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
