use sea_query::{Expr, SimpleExpr};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::field::FieldSpec;
use crate::query::table_column;
use crate::value::json_to_value;

/// A related table pulled into the main query with a `LEFT JOIN`.
///
/// The join condition is `alias.left_key = on_alias.right_key` followed by the
/// optional extras, in this order: `extra`, `shared_key`, `and_keys`,
/// `or_keys`, `param`, `exclude_deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    /// Logical name of the join, also the default output prefix.
    pub key: String,
    /// Joined table.
    pub table: String,
    /// Fixed alias; when unset one is assigned during compilation.
    #[serde(default)]
    pub alias: Option<String>,
    /// Column of the joined table.
    pub left_key: String,
    /// Column of the table joined onto.
    pub right_key: String,
    /// Key of an earlier join to attach to instead of the main table.
    #[serde(default)]
    pub on: Option<String>,
    /// Raw predicate; `{alias}` is replaced with this join's alias.
    #[serde(default)]
    pub extra: Option<String>,
    /// Column equal on both sides.
    #[serde(default)]
    pub shared_key: Option<String>,
    /// `(left, right)` column pairs that must all be equal.
    #[serde(default)]
    pub and_keys: Vec<(String, String)>,
    /// `(left, right)` column pairs of which one must be equal.
    #[serde(default)]
    pub or_keys: Vec<(String, String)>,
    /// Joined column compared to a bound value.
    #[serde(default)]
    pub param: Option<(String, Json)>,
    /// Only join rows that are not soft-deleted.
    #[serde(default)]
    pub exclude_deleted: bool,
    /// Output prefix of the fields; defaults to `key`.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Columns selected from the joined table.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl JoinSpec {
    /// Joins `table` on `table.left_key = main.right_key`.
    #[must_use]
    pub fn left(
        key: impl Into<String>, table: impl Into<String>, left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            table: table.into(),
            alias: None,
            left_key: left_key.into(),
            right_key: right_key.into(),
            on: None,
            extra: None,
            shared_key: None,
            and_keys: Vec::new(),
            or_keys: Vec::new(),
            param: None,
            exclude_deleted: false,
            prefix: None,
            fields: Vec::new(),
        }
    }

    /// Sets a fixed alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Attaches the join to an earlier join instead of the main table.
    #[must_use]
    pub fn on(mut self, join_key: impl Into<String>) -> Self {
        self.on = Some(join_key.into());
        self
    }

    /// Adds a raw predicate.
    #[must_use]
    pub fn extra(mut self, predicate: impl Into<String>) -> Self {
        self.extra = Some(predicate.into());
        self
    }

    /// Requires a column to be equal on both sides.
    #[must_use]
    pub fn shared_key(mut self, column: impl Into<String>) -> Self {
        self.shared_key = Some(column.into());
        self
    }

    /// Requires `alias.left = on.right`.
    #[must_use]
    pub fn and_key(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.and_keys.push((left.into(), right.into()));
        self
    }

    /// Accepts `alias.left = on.right` as one of several alternatives.
    #[must_use]
    pub fn or_key(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.or_keys.push((left.into(), right.into()));
        self
    }

    /// Requires `alias.column = ?`.
    #[must_use]
    pub fn param(mut self, column: impl Into<String>, value: Json) -> Self {
        self.param = Some((column.into(), value));
        self
    }

    /// Skips soft-deleted rows of the joined table.
    #[must_use]
    pub const fn exclude_deleted(mut self) -> Self {
        self.exclude_deleted = true;
        self
    }

    /// Sets the output prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Adds a selected column.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Prefix given to the join's fields.
    #[must_use]
    pub fn output_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.key)
    }

    /// Builds the `ON` condition joining `alias` to `on_alias`; any value
    /// compared is bound rather than inlined.
    #[must_use]
    pub fn get_expression(&self, alias: &str, on_alias: &str) -> SimpleExpr {
        let pair = |left: &str, right: &str| Expr::col(table_column(alias, left)).equals(table_column(on_alias, right));

        let mut on = pair(&self.left_key, &self.right_key);
        if let Some(extra) = &self.extra {
            on = on.and(Expr::cust(extra.replace("{alias}", alias)));
        }
        if let Some(shared) = &self.shared_key {
            on = on.and(pair(shared, shared));
        }
        for (left, right) in &self.and_keys {
            on = on.and(pair(left, right));
        }
        let any = self.or_keys.iter().map(|(left, right)| pair(left, right)).reduce(SimpleExpr::or);
        if let Some(any) = any {
            on = on.and(any);
        }
        if let Some((column, value)) = &self.param {
            on = on.and(Expr::col(table_column(alias, column)).eq(json_to_value(value)));
        }
        if self.exclude_deleted {
            on = on.and(Expr::col(table_column(alias, "isDeleted")).eq(0));
        }
        on
    }
}
