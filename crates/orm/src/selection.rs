//! Compilation of a [`Structure`] and a [`ConditionBuilder`] into one
//! `SELECT` statement, and resolution of its rows into records.

use sea_query::{Alias, Asterisk, Expr, JoinType, SelectStatement, SimpleExpr, Value};
use serde_json::Value as Json;
use tracing::instrument;

use crate::condition::ConditionBuilder;
use crate::error::{Error, Result};
use crate::field::{FieldSpec, FieldType};
use crate::options::MappingOptions;
use crate::query::{Query, QueryBuilder, table_column};
use crate::structure::Structure;
use crate::value::{cell_i64, values_to_datatypes};
use crate::{Connection, Record, Row};

/// Query compiler for one entity.
///
/// A selection is stateful only while it is being assembled: aliases are
/// handed out as joins and counts are added, so a new selection is created
/// for every statement.
///
/// ```ignore
/// let mut selection = Selection::new(&structure, &options);
/// selection.add_fields(false).add_joins(&[], true)?.add_counts()?;
///
/// let rows = selection.request(conn.as_ref(), &ConditionBuilder::new().add("name", "LIKE", "wid"))?;
/// let records = selection.resolve(&rows, &[]);
/// ```
#[derive(Debug)]
pub struct Selection<'a> {
    structure: &'a Structure,
    options: &'a MappingOptions,
    from: SelectStatement,
    selects: Vec<(SimpleExpr, String)>,
    raw_joins: Vec<String>,
    aliases: Vec<(String, String)>,
    used: Vec<String>,
    join_selects: bool,
}

impl<'a> Selection<'a> {
    /// Starts a selection from the entity's main table.
    #[must_use]
    pub fn new(structure: &'a Structure, options: &'a MappingOptions) -> Self {
        let mut from = sea_query::Query::select();
        from.from(Alias::new(structure.table()));

        Self {
            structure,
            options,
            from,
            selects: Vec::new(),
            raw_joins: Vec::new(),
            aliases: Vec::new(),
            used: vec![structure.table().to_string()],
            join_selects: false,
        }
    }

    /// Selects every main-table field and computed column.
    ///
    /// The identifier is labelled `id`. With `decrypted`, encrypted fields are
    /// selected through the decrypt template as `{key}Decrypt`.
    pub fn add_fields(&mut self, decrypted: bool) -> &mut Self {
        let structure = self.structure;
        let table = structure.table();

        for field in structure.fields() {
            let label = field.output_key();
            if decrypted && field.field_type == FieldType::Encrypted {
                let column = format!("{table}.{}", field.key);
                self.selects.push((Expr::cust(self.options.decrypt(&column)), format!("{label}Decrypt")));
            } else {
                self.selects.push((Expr::col(table_column(table, &field.key)).into(), label));
            }
        }
        for expression in structure.expressions() {
            let computed = Expr::cust(format!("({})", expression.expression));
            self.selects.push((computed, expression.field.output_key()));
        }
        self
    }

    /// Adds a `LEFT JOIN` per join of the entity; `extra` raw join clauses
    /// follow them verbatim.
    ///
    /// Each join is aliased with its fixed alias, else with a fresh letter
    /// when its table is already part of the statement, else with the table
    /// name. With `with_selects`, the join's fields are selected under their
    /// prefixed output keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAlias`] when a join is attached to a join that
    /// has not been added.
    pub fn add_joins(&mut self, extra: &[&str], with_selects: bool) -> Result<&mut Self> {
        let structure = self.structure;

        for join in structure.joins() {
            let on_alias = self.on_alias(join.on.as_deref())?;
            let alias = self.assign_alias(&join.key, &join.table, join.alias.as_deref());

            let on = join.get_expression(&alias, &on_alias);
            self.from.join_as(JoinType::LeftJoin, Alias::new(&join.table), Alias::new(&alias), on);

            if with_selects {
                for field in &join.fields {
                    self.selects.push((Expr::col(table_column(&alias, &field.key)).into(), field.output_key()));
                }
            }
        }

        self.raw_joins.extend(extra.iter().map(ToString::to_string));
        self.join_selects = with_selects;
        Ok(self)
    }

    /// Adds a derived-table join per aggregate of the entity and selects the
    /// aggregate under its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAlias`] when an aggregate is attached to a join
    /// that has not been added.
    pub fn add_counts(&mut self) -> Result<&mut Self> {
        let structure = self.structure;

        for count in structure.counts() {
            let on_alias = self.on_alias(count.on.as_deref())?;
            let alias = self.assign_alias(&count.key, &count.table, count.alias.as_deref());

            let (derived, on) = count.get_expression(&alias, &on_alias);
            self.from.join_subquery(JoinType::LeftJoin, derived, Alias::new(&alias), on);
            self.selects.push((Expr::col(table_column(&alias, &count.key)).into(), count.key.clone()));
        }
        Ok(self)
    }

    /// Alias assigned to a join or aggregate key.
    #[must_use]
    pub fn alias_of(&self, key: &str) -> Option<&str> {
        self.aliases.iter().find(|(k, _)| k == key).map(|(_, alias)| alias.as_str())
    }

    /// Renders `SELECT ... FROM ... JOIN ... WHERE ... GROUP BY ... ORDER BY
    /// ... LIMIT ...` with join values bound ahead of condition values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColumn`] when a bare column of `query` matches
    /// nothing selectable, or [`Error::InvalidInput`] when a bound value
    /// cannot be passed to the connection.
    pub fn get_expression(&self, query: &ConditionBuilder) -> Result<Query> {
        let query = self.qualify(query)?;

        let mut statement = self.from.clone();
        if self.selects.is_empty() {
            statement.column(Asterisk);
        }
        for (expr, label) in &self.selects {
            statement.expr_as(expr.clone(), Alias::new(label));
        }

        self.finish(&statement, &query.get(true), query.params(), "Selection generated SQL")
    }

    /// Renders `SELECT COUNT(*) AS total ...` over the same tables and
    /// conditions, ignoring grouping, ordering and limits.
    ///
    /// # Errors
    ///
    /// Same as [`get_expression`](Self::get_expression).
    pub fn get_total_expression(&self, query: &ConditionBuilder) -> Result<Query> {
        let query = self.qualify(query)?;

        let mut statement = self.from.clone();
        statement.expr_as(Expr::col(Asterisk).count(), Alias::new("total"));

        self.finish(&statement, &query.where_clause(true), query.params(), "Selection generated count SQL")
    }

    /// Compiles and runs the statement, returning the raw rows.
    ///
    /// # Errors
    ///
    /// Compilation errors as for [`get_expression`](Self::get_expression);
    /// [`Error::Execution`] when the connection fails.
    #[instrument(skip_all, fields(table = %self.structure.table()))]
    pub fn request(&self, conn: &dyn Connection, query: &ConditionBuilder) -> Result<Vec<Row>> {
        let statement = self.get_expression(query)?;
        Ok(conn.query(&statement.sql, &statement.params)?)
    }

    /// Converts raw rows into records.
    ///
    /// Merges, in order: the identifier, the main fields, the computed
    /// columns, the join fields (when selected), the aggregates, then the
    /// `extra` columns copied as-is. Fields with a `merge_to` key fall back
    /// to that key's value when their own is empty.
    #[must_use]
    pub fn resolve(&self, rows: &[Row], extra: &[&str]) -> Vec<Record> {
        rows.iter().map(|row| self.resolve_row(row, extra)).collect()
    }

    fn resolve_row(&self, row: &Row, extra: &[&str]) -> Record {
        let structure = self.structure;
        let mut record = Record::new();

        if let Some(identifier) = structure.identifier() {
            let cell = row.get("id").or_else(|| row.get(&identifier.key));
            record.insert("id".to_string(), Json::from(cell_i64(cell)));
        }

        let main = structure.fields().iter().filter(|field| !field.flags.is_identifier);
        for field in main {
            record.extend(field.to_output_values(row, self.options));
        }
        for expression in structure.expressions() {
            record.extend(expression.field.to_output_values(row, self.options));
        }
        for field in self.joined_fields() {
            record.extend(field.to_output_values(row, self.options));
        }
        for count in structure.counts() {
            if self.alias_of(&count.key).is_some() {
                record.insert(count.key.clone(), count.get_value(row));
            }
        }
        for key in extra {
            let value = row.get(key).map_or(Json::Null, tessera_sql::DataType::to_json);
            record.insert((*key).to_string(), value);
        }

        let fallbacks = structure.fields().iter().chain(self.joined_fields());
        for field in fallbacks {
            let Some(target) = &field.merge_to else { continue };
            let key = field.output_key();
            if record.get(&key).is_none_or(FieldSpec::is_empty_output)
                && let Some(value) = record.get(target).cloned()
            {
                record.insert(key, value);
            }
        }

        record
    }

    fn joined_fields(&self) -> impl Iterator<Item = &'a FieldSpec> + '_ {
        let structure = self.structure;
        structure
            .joins()
            .iter()
            .filter(|join| self.join_selects && self.alias_of(&join.key).is_some())
            .flat_map(|join| join.fields.iter())
    }

    // Rewrites every bare column of the condition to the qualified column or
    // expression it designates.
    fn qualify(&self, query: &ConditionBuilder) -> Result<ConditionBuilder> {
        let mut query = query.clone();
        for column in query.columns() {
            if column.contains('.') || column.contains('(') {
                continue;
            }
            let qualified = self.resolve_column(&column)?;
            query.update_column(&column, &qualified);
        }
        Ok(query)
    }

    fn resolve_column(&self, column: &str) -> Result<String> {
        let structure = self.structure;
        let matches = |field: &FieldSpec| field.output_key() == column || field.key == column;

        if let Some(field) = structure.fields().iter().find(|field| matches(field)) {
            return Ok(format!("{}.{}", structure.table(), field.key));
        }
        for join in structure.joins() {
            if let Some(alias) = self.alias_of(&join.key)
                && let Some(field) = join.fields.iter().find(|field| matches(field))
            {
                return Ok(format!("{alias}.{}", field.key));
            }
        }
        for count in structure.counts() {
            if count.key == column
                && let Some(alias) = self.alias_of(&count.key)
            {
                return Ok(format!("{alias}.{}", count.key));
            }
        }
        if let Some(expression) =
            structure.expressions().iter().find(|expression| expression.field.output_key() == column)
        {
            return Ok(format!("({})", expression.expression));
        }

        Err(Error::UnknownColumn {
            table: structure.table().to_string(),
            column: column.to_string(),
        })
    }

    fn on_alias(&self, on: Option<&str>) -> Result<String> {
        match on {
            None => Ok(self.structure.table().to_string()),
            Some(key) => self.alias_of(key).map(ToString::to_string).ok_or_else(|| {
                Error::UnknownAlias {
                    table: self.structure.table().to_string(),
                    key: key.to_string(),
                }
            }),
        }
    }

    fn assign_alias(&mut self, key: &str, table: &str, fixed: Option<&str>) -> String {
        let alias = match fixed {
            Some(alias) => alias.to_string(),
            None if self.used.iter().any(|used| used == table) => self.fresh_alias(),
            None => table.to_string(),
        };

        self.used.push(table.to_string());
        self.used.push(alias.clone());
        self.aliases.push((key.to_string(), alias.clone()));
        alias
    }

    // First single letter not yet naming a table or alias of the statement.
    fn fresh_alias(&self) -> String {
        (b'a'..=b'z')
            .map(|letter| char::from(letter).to_string())
            .chain((1..).map(|n| format!("t{n}")))
            .find(|candidate| !self.used.contains(candidate))
            .unwrap_or_default()
    }

    // Renders the statement, then the raw joins and the condition suffix;
    // values bound by joins precede the condition's.
    fn finish(
        &self, statement: &SelectStatement, suffix: &str, condition_params: &[Value], message: &str,
    ) -> Result<Query> {
        let (mut sql, values) = statement.build(QueryBuilder::default());
        for clause in self.raw_joins.iter().map(String::as_str).chain([suffix]) {
            if !clause.is_empty() {
                sql.push(' ');
                sql.push_str(clause);
            }
        }

        let values = values.0.into_iter().chain(condition_params.iter().cloned());
        let params = values_to_datatypes(values).map_err(|err| Error::InvalidInput(err.to_string()))?;

        tracing::debug!(
            table = self.structure.table(),
            sql = %sql,
            param_count = params.len(),
            "{message}"
        );

        Ok(Query { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use tessera_sql::{DataType, Field};

    use super::*;
    use crate::count::CountSpec;
    use crate::join::JoinSpec;
    use crate::structure::Capabilities;

    fn unquoted(sql: &str) -> String {
        sql.replace('"', "")
    }

    fn orders() -> Structure {
        Structure::builder("Order", "orders")
            .capabilities(Capabilities {
                soft_delete: true,
                ..Capabilities::default()
            })
            .field(FieldSpec::identifier("orderId"))
            .field(FieldSpec::new("customerId", FieldType::Integer))
            .field(FieldSpec::new("total", FieldType::Decimal).decimals(2))
            .join(
                JoinSpec::left("customer", "customers", "customerId", "customerId")
                    .field(FieldSpec::new("name", FieldType::String)),
            )
            .count(CountSpec::count("lineCount", "orderLines", "orderId", "orderId"))
            .expression("orders.total * 2", FieldSpec::new("double", FieldType::Decimal).decimals(2))
            .build()
            .unwrap()
    }

    #[test]
    fn compiles_fields_joins_and_counts() {
        let structure = orders();
        let options = MappingOptions::default();
        let mut selection = Selection::new(&structure, &options);
        selection.add_fields(false).add_joins(&[], true).unwrap().add_counts().unwrap();

        let query = ConditionBuilder::new()
            .add("customerName", "LIKE", "ann")
            .add("lineCount", ">", 0)
            .add("double", ">", 10)
            .order_by("id", false);
        let statement = selection.get_expression(&query).unwrap();

        assert_eq!(
            unquoted(&statement.sql),
            "SELECT orders.isDeleted AS isDeleted, orders.orderId AS id, \
             orders.customerId AS customerId, orders.total AS total, \
             (orders.total * 2) AS double, customers.name AS customerName, \
             orderLines.lineCount AS lineCount \
             FROM orders \
             LEFT JOIN customers AS customers ON customers.customerId = orders.customerId \
             LEFT JOIN (SELECT orderId, COUNT(*) AS lineCount FROM orderLines GROUP BY orderId) \
             AS orderLines ON orderLines.orderId = orders.orderId \
             WHERE customers.name LIKE ? AND orderLines.lineCount > ? AND (orders.total * 2) > ? \
             ORDER BY orders.orderId DESC"
        );
        assert_eq!(statement.params.len(), 3);
        assert_eq!(statement.params[0], DataType::Str(Some("%ann%".to_string())));
    }

    #[test]
    fn unknown_column_fails() {
        let structure = orders();
        let options = MappingOptions::default();
        let mut selection = Selection::new(&structure, &options);
        selection.add_fields(false);

        // join fields are unknown until the join is added
        let err = selection
            .get_expression(&ConditionBuilder::new().add("customerName", "=", "x"))
            .unwrap_err();
        assert_eq!(
            err,
            Error::UnknownColumn {
                table: "orders".to_string(),
                column: "customerName".to_string()
            }
        );

        let statement = selection
            .get_expression(&ConditionBuilder::new().add("c.name", "=", "x").add("LOWER(x)", "=", "y"))
            .unwrap();
        assert!(statement.sql.ends_with("WHERE c.name = ? AND LOWER(x) = ?"));
    }

    #[test]
    fn repeated_tables_get_letters() {
        let structure = Structure::builder("Transfer", "accounts")
            .field(FieldSpec::identifier("accountId"))
            .join(JoinSpec::left("from", "accounts", "accountId", "parentId"))
            .join(JoinSpec::left("to", "accounts", "accountId", "childId"))
            .join(JoinSpec::left("owner", "users", "userId", "ownerId").alias("u"))
            .build()
            .unwrap();
        let options = MappingOptions::default();
        let mut selection = Selection::new(&structure, &options);
        selection.add_joins(&["LEFT JOIN audit AS z ON (z.accountId = accounts.accountId)"], false).unwrap();

        assert_eq!(selection.alias_of("from"), Some("a"));
        assert_eq!(selection.alias_of("to"), Some("b"));
        assert_eq!(selection.alias_of("owner"), Some("u"));

        let sql = unquoted(&selection.get_expression(&ConditionBuilder::new()).unwrap().sql);
        assert!(sql.starts_with("SELECT * FROM accounts LEFT JOIN accounts AS a ON a.accountId = accounts.parentId"));
        assert!(sql.ends_with("AS u ON u.userId = accounts.ownerId LEFT JOIN audit AS z ON (z.accountId = accounts.accountId)"));
    }

    #[test]
    fn join_params_precede_condition_params() {
        let structure = Structure::builder("Doc", "docs")
            .field(FieldSpec::identifier("docId"))
            .field(FieldSpec::new("title", FieldType::String))
            .join(JoinSpec::left("translation", "translations", "docId", "docId").param("lang", "fr".into()))
            .build()
            .unwrap();
        let options = MappingOptions::default();
        let mut selection = Selection::new(&structure, &options);
        selection.add_fields(false).add_joins(&[], true).unwrap();

        let statement = selection.get_expression(&ConditionBuilder::new().add("title", "=", "x")).unwrap();
        assert_eq!(
            statement.params,
            vec![DataType::Str(Some("fr".to_string())), DataType::Str(Some("x".to_string()))]
        );
    }

    #[test]
    fn decrypted_fields_use_template() {
        let structure = Structure::builder("User", "users")
            .field(FieldSpec::identifier("userId"))
            .field(FieldSpec::new("secret", FieldType::Encrypted))
            .build()
            .unwrap();
        let options = MappingOptions {
            decrypt_template: "dec({column})".to_string(),
            ..MappingOptions::default()
        };
        let mut selection = Selection::new(&structure, &options);
        selection.add_fields(true);

        let statement = selection.get_expression(&ConditionBuilder::new()).unwrap();
        assert_eq!(
            unquoted(&statement.sql),
            "SELECT users.userId AS id, dec(users.secret) AS secretDecrypt FROM users"
        );
    }

    #[test]
    fn total_ignores_order_and_limit() {
        let structure = orders();
        let options = MappingOptions::default();
        let mut selection = Selection::new(&structure, &options);
        selection.add_joins(&[], false).unwrap();

        let query = ConditionBuilder::new().add("customerId", "=", 3).order_by("id", true).paginate(2, 10);
        let statement = selection.get_total_expression(&query).unwrap();
        assert_eq!(
            unquoted(&statement.sql),
            "SELECT COUNT(*) AS total FROM orders \
             LEFT JOIN customers AS customers ON customers.customerId = orders.customerId \
             WHERE orders.customerId = ?"
        );
    }

    #[test]
    fn resolves_rows() {
        let structure = orders();
        let options = MappingOptions::default();
        let mut selection = Selection::new(&structure, &options);
        selection.add_fields(false).add_joins(&[], true).unwrap().add_counts().unwrap();

        let cell = |name: &str, value: DataType| Field {
            name: name.to_string(),
            value,
        };
        let rows = vec![Row {
            index: "0".to_string(),
            fields: vec![
                cell("isDeleted", DataType::Int64(Some(0))),
                cell("id", DataType::Int64(Some(9))),
                cell("customerId", DataType::Int64(Some(2))),
                cell("total", DataType::Int64(Some(1050))),
                cell("double", DataType::Int64(Some(2100))),
                cell("customerName", DataType::Str(None)),
                cell("lineCount", DataType::Str(None)),
                cell("note", DataType::Str(Some("raw".to_string()))),
            ],
        }];

        let records = selection.resolve(&rows, &["note"]);
        assert_eq!(
            Json::Object(records[0].clone()),
            serde_json::json!({
                "id": 9,
                "isDeleted": false,
                "customerId": 2,
                "total": 10.5,
                "double": 21.0,
                "customerName": "",
                "lineCount": 0,
                "note": "raw"
            })
        );
    }
}
