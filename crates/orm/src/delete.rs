use anyhow::Result;
use sea_query::Alias;

use crate::condition::ConditionBuilder;
use crate::query::{Query, QueryBuilder};
use crate::value::values_to_datatypes;

/// Builder for constructing DELETE queries.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    filter: ConditionBuilder,
}

impl DeleteBuilder {
    /// Creates a new DELETE query builder for `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: ConditionBuilder::new(),
        }
    }

    /// Restricts the deleted rows.
    #[must_use]
    pub fn filter(mut self, filter: ConditionBuilder) -> Self {
        self.filter = filter;
        self
    }

    /// Build the DELETE query.
    ///
    /// # Errors
    ///
    /// Returns an error if any query values cannot be converted to connection data types.
    pub fn build(self) -> Result<Query> {
        let mut statement = sea_query::Query::delete();
        statement.from_table(Alias::new(&self.table));

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
            "DeleteBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
