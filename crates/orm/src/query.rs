use sea_query::backend::{
    EscapeBuilder, OperLeftAssocDecider, PrecedenceDecider, QuotedBuilder, TableRefBuilder,
};
use sea_query::prepare::SqlWriter;
use sea_query::{Alias, BinOper, ColumnRef, IntoIden, Oper, Quote, SimpleExpr, SubQueryStatement, Value};

use crate::DataType;

/// SQL text with its positional bind values, ready for a
/// [`Connection`](crate::Connection).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Bind values in placeholder order.
    pub params: Vec<DataType>,
}

/// `sea-query` backend for the statements handed to a connection.
///
/// Identifiers are double-quoted and placeholders are unnumbered `?`, the
/// form [`ConditionBuilder`](crate::ConditionBuilder) emits, so generated and
/// hand-built clauses can share one statement.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    quote: Quote,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            quote: Quote::new(b'"'),
        }
    }
}

impl QuotedBuilder for QueryBuilder {
    fn quote(&self) -> Quote {
        self.quote
    }
}

impl EscapeBuilder for QueryBuilder {}

impl TableRefBuilder for QueryBuilder {}

impl OperLeftAssocDecider for QueryBuilder {
    fn well_known_left_associative(&self, op: &BinOper) -> bool {
        matches!(
            op,
            BinOper::And | BinOper::Or | BinOper::Add | BinOper::Sub | BinOper::Mul | BinOper::Mod
        )
    }
}

impl PrecedenceDecider for QueryBuilder {
    // Operands without operators of their own bind tighter than anything.
    // Comparisons nest in `AND`/`OR` unparenthesised and arithmetic nests in
    // comparisons; anything else is parenthesised.
    fn inner_expr_well_known_greater_precedence(
        &self, inner: &SimpleExpr, outer_oper: &Oper,
    ) -> bool {
        match inner {
            SimpleExpr::Column(_)
            | SimpleExpr::Tuple(_)
            | SimpleExpr::Value(_)
            | SimpleExpr::Constant(_)
            | SimpleExpr::Keyword(_)
            | SimpleExpr::FunctionCall(_)
            | SimpleExpr::SubQuery(..) => true,
            SimpleExpr::Binary(_, inner_oper, _) => {
                if is_arithmetic(*inner_oper) {
                    is_comparison(outer_oper) || is_logical(outer_oper)
                } else if is_comparison(&Oper::BinOper(*inner_oper)) {
                    is_logical(outer_oper)
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

const fn is_arithmetic(op: BinOper) -> bool {
    matches!(op, BinOper::Add | BinOper::Sub | BinOper::Mul | BinOper::Div | BinOper::Mod)
}

const fn is_comparison(op: &Oper) -> bool {
    matches!(
        op,
        Oper::BinOper(
            BinOper::Equal
                | BinOper::NotEqual
                | BinOper::SmallerThan
                | BinOper::SmallerThanOrEqual
                | BinOper::GreaterThan
                | BinOper::GreaterThanOrEqual
                | BinOper::Like
                | BinOper::NotLike
                | BinOper::In
                | BinOper::NotIn
                | BinOper::Is
                | BinOper::IsNot
        )
    )
}

const fn is_logical(op: &Oper) -> bool {
    matches!(op, Oper::BinOper(BinOper::And | BinOper::Or))
}

/// `table.column` as a qualified column reference.
pub fn table_column(table: &str, column: &str) -> ColumnRef {
    ColumnRef::TableColumn(Alias::new(table).into_iden(), Alias::new(column).into_iden())
}

impl sea_query::backend::QueryBuilder for QueryBuilder {
    fn prepare_query_statement(&self, query: &SubQueryStatement, sql: &mut dyn SqlWriter) {
        match query {
            SubQueryStatement::SelectStatement(select) => self.prepare_select_statement(select, sql),
            SubQueryStatement::InsertStatement(insert) => self.prepare_insert_statement(insert, sql),
            SubQueryStatement::UpdateStatement(update) => self.prepare_update_statement(update, sql),
            SubQueryStatement::DeleteStatement(delete) => self.prepare_delete_statement(delete, sql),
            SubQueryStatement::WithStatement(with) => self.prepare_with_query(with, sql),
        }
    }

    fn prepare_value(&self, value: &Value, sql: &mut dyn SqlWriter) {
        sql.push_param(value.clone(), self);
    }

    fn placeholder(&self) -> (&str, bool) {
        ("?", false)
    }
}
