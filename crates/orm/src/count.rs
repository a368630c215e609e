use sea_query::{Alias, Asterisk, Expr, Func, SelectStatement, SimpleExpr, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::Row;
use crate::condition::ConditionBuilder;
use crate::field::{FieldType, scaled};
use crate::query::table_column;
use crate::value::{cell_f64, cell_i64, json_to_operand};

const fn default_multiplier() -> i64 {
    1
}

/// Aggregate computed per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Aggregate {
    /// `COUNT(*)`.
    Count,
    /// `SUM(multiplier * column)`.
    Sum {
        /// Summed column.
        column: String,
        /// Factor applied to every value.
        #[serde(default = "default_multiplier")]
        multiplier: i64,
    },
}

const fn default_aggregate() -> Aggregate {
    Aggregate::Count
}

const fn default_type() -> FieldType {
    FieldType::Integer
}

/// An aggregate over a related table, joined as a derived table and exposed
/// as one scalar column named `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSpec {
    /// Exposed column.
    pub key: String,
    /// Aggregated table.
    pub table: String,
    /// Fixed alias; when unset one is assigned during compilation.
    #[serde(default)]
    pub alias: Option<String>,
    /// Column of the aggregated table the rows are grouped by.
    pub group_key: String,
    /// Column of the table joined onto.
    pub right_key: String,
    /// Key of a join to attach to instead of the main table.
    #[serde(default)]
    pub on: Option<String>,
    /// Aggregate function.
    #[serde(default = "default_aggregate")]
    pub aggregate: Aggregate,
    /// `(column, operator, value)` filters of the aggregated rows.
    #[serde(default)]
    pub conditions: Vec<(String, String, Json)>,
    /// Only aggregate rows that are not soft-deleted.
    #[serde(default)]
    pub exclude_deleted: bool,
    /// Type of the exposed value; `Decimal` sums are scaled.
    #[serde(default = "default_type", rename = "type")]
    pub field_type: FieldType,
    /// Decimal places when `field_type` is `Decimal`.
    #[serde(default)]
    pub decimals: u32,
}

impl CountSpec {
    /// Counts the rows of `table` whose `group_key` equals `main.right_key`.
    #[must_use]
    pub fn count(
        key: impl Into<String>, table: impl Into<String>, group_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            table: table.into(),
            alias: None,
            group_key: group_key.into(),
            right_key: right_key.into(),
            on: None,
            aggregate: Aggregate::Count,
            conditions: Vec::new(),
            exclude_deleted: false,
            field_type: FieldType::Integer,
            decimals: 0,
        }
    }

    /// Sums `multiplier * column` instead of counting.
    #[must_use]
    pub fn sum(mut self, column: impl Into<String>, multiplier: i64) -> Self {
        self.aggregate = Aggregate::Sum {
            column: column.into(),
            multiplier,
        };
        self
    }

    /// Filters the aggregated rows.
    #[must_use]
    pub fn condition(mut self, column: impl Into<String>, operator: impl Into<String>, value: Json) -> Self {
        self.conditions.push((column.into(), operator.into(), value));
        self
    }

    /// Skips soft-deleted rows.
    #[must_use]
    pub const fn exclude_deleted(mut self) -> Self {
        self.exclude_deleted = true;
        self
    }

    /// Exposes the aggregate as a decimal with `decimals` places.
    #[must_use]
    pub const fn decimal(mut self, decimals: u32) -> Self {
        self.field_type = FieldType::Decimal;
        self.decimals = decimals;
        self
    }

    /// Builds the grouped derived table and the `ON` condition joining it,
    /// as `alias`, to `on_alias`.
    #[must_use]
    pub fn get_expression(&self, alias: &str, on_alias: &str) -> (SelectStatement, SimpleExpr) {
        let aggregate = match &self.aggregate {
            Aggregate::Count => Expr::col(Asterisk).count(),
            Aggregate::Sum { column, multiplier } => {
                let factor = SimpleExpr::Constant(Value::BigInt(Some(*multiplier)));
                Func::sum(Expr::col(Alias::new(column)).mul(factor)).into()
            }
        };

        let mut filter = ConditionBuilder::new();
        for (column, operator, value) in &self.conditions {
            filter = filter.add(column, operator, json_to_operand(value));
        }
        if self.exclude_deleted {
            filter = filter.add("isDeleted", "=", 0);
        }

        let mut derived = sea_query::Query::select();
        derived
            .column(Alias::new(&self.group_key))
            .expr_as(aggregate, Alias::new(&self.key))
            .from(Alias::new(&self.table));
        if !filter.is_empty() {
            derived.and_where(Expr::cust_with_values(filter.where_clause(false), filter.params().to_vec()));
        }
        derived.group_by_col(Alias::new(&self.group_key));

        let on = Expr::col(table_column(alias, &self.group_key)).equals(table_column(on_alias, &self.right_key));
        (derived, on)
    }

    /// Reads the aggregate from a result row; groups without rows read as 0.
    #[must_use]
    pub fn get_value(&self, row: &Row) -> Json {
        let cell = row.get(&self.key);
        match self.field_type {
            FieldType::Decimal => scaled(cell_f64(cell), self.decimals),
            _ => Json::from(cell_i64(cell)),
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_query::JoinType;
    use serde_json::json;
    use tessera_sql::{DataType, Field};

    use super::*;
    use crate::query::QueryBuilder;

    fn render(count: &CountSpec, alias: &str, on_alias: &str) -> (String, Vec<Value>) {
        let (derived, on) = count.get_expression(alias, on_alias);
        let mut statement = sea_query::Query::select();
        statement.column(Asterisk).from(Alias::new(on_alias)).join_subquery(
            JoinType::LeftJoin,
            derived,
            Alias::new(alias),
            on,
        );
        let (sql, values) = statement.build(QueryBuilder::default());
        (sql.replace('"', ""), values.0)
    }

    #[test]
    fn count_derived_table() {
        let count = CountSpec::count("orderCount", "orders", "customerId", "customerId")
            .condition("status", ">", json!(0))
            .exclude_deleted();
        let (sql, params) = render(&count, "orders", "customers");

        assert_eq!(
            sql,
            "SELECT * FROM customers \
             LEFT JOIN (SELECT customerId, COUNT(*) AS orderCount FROM orders \
             WHERE status > ? AND isDeleted = ? GROUP BY customerId) AS orders \
             ON orders.customerId = customers.customerId"
        );
        assert_eq!(params, vec![Value::BigInt(Some(0)), Value::Int(Some(0))]);
    }

    #[test]
    fn sum_with_multiplier() {
        let count = CountSpec::count("refunds", "payments", "orderId", "orderId").sum("amount", -1);
        let (sql, params) = render(&count, "a", "orders");
        assert_eq!(
            sql,
            "SELECT * FROM orders \
             LEFT JOIN (SELECT orderId, SUM(amount * -1) AS refunds FROM payments GROUP BY orderId) \
             AS a ON a.orderId = orders.orderId"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn value_defaults_and_scaling() {
        let row = Row {
            index: "0".to_string(),
            fields: vec![Field {
                name: "total".to_string(),
                value: DataType::Int64(Some(1250)),
            }],
        };

        let total = CountSpec::count("total", "lines", "orderId", "id").sum("price", 1).decimal(2);
        assert_eq!(total.get_value(&row), json!(12.5));

        let missing = CountSpec::count("lines", "lines", "orderId", "id");
        assert_eq!(missing.get_value(&row), json!(0));
    }

    #[test]
    fn deserialises_sum() {
        let count: CountSpec = serde_json::from_value(json!({
            "key": "stock",
            "table": "movements",
            "groupKey": "productId",
            "rightKey": "productId",
            "aggregate": {"kind": "sum", "column": "quantity"}
        }))
        .unwrap();

        assert_eq!(
            count.aggregate,
            Aggregate::Sum {
                column: "quantity".to_string(),
                multiplier: 1
            }
        );
        assert_eq!(count.field_type, FieldType::Integer);
    }
}
