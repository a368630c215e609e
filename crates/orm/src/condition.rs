use sea_query::Value;

/// Right-hand side of a condition: a single bind value or a list of them.
///
/// Guest code never builds this directly; natural Rust values (`i64`, `&str`,
/// `Vec<i64>`, `[&str; 3]`, ...) convert via `From`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One bind value, rendered as a single placeholder.
    Scalar(Value),
    /// Several bind values, rendered as a parenthesised placeholder list.
    List(Vec<Value>),
}

impl Operand {
    /// Whether the operand counts as "empty" for [`ConditionBuilder::add_if`]:
    /// SQL `NULL`, an empty string, an empty list, numeric zero or `false`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(values) => values.is_empty(),
            Self::Scalar(value) => is_empty_value(value),
        }
    }
}

macro_rules! scalar_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_operand!(bool, i32, i64, u32, u64, f64, String, &str, Value);

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(values: [T; N]) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Clone + Into<Value>> From<&[T]> for Operand {
    fn from(values: &[T]) -> Self {
        Self::List(values.iter().cloned().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

impl Connective {
    const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Connective(Connective),
    Open,
    Close,
    Column(String),
    Sql(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wildcard {
    Both,
    Start,
    End,
}

/// Options for [`ConditionBuilder::search_with`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Operator applied to every column, `LIKE` by default.
    pub operator: String,
    /// Lower-case the search tokens (no `BINARY` comparison).
    pub case_insensitive: bool,
    /// Split the search text into tokens.
    pub split_value: bool,
    /// Separator used when `split_value` is set.
    pub split_text: String,
    /// Accept rows matching any token instead of all of them.
    pub match_any: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            operator: "LIKE".to_string(),
            case_insensitive: true,
            split_value: false,
            split_text: " ".to_string(),
            match_any: false,
        }
    }
}

/// Mutable builder for a `WHERE` / `GROUP BY` / `ORDER BY` / `LIMIT` suffix
/// and its positional bind values.
///
/// Columns are recorded as bare names so that the compiler can later qualify
/// them with the alias of the table they belong to (see
/// [`Selection`](crate::Selection)). Bind values are kept in the order their
/// `?` placeholders appear in the rendered text.
///
/// ```ignore
/// let query = ConditionBuilder::new()
///     .add("status", "=", 1)
///     .add("id", "=", vec![1, 2, 3])
///     .start_or()
///     .add("name", "STARTS", "wid")
///     .add("name", "ENDS", "get")
///     .end_or()
///     .order_by("name", true)
///     .paginate(2, 20);
///
/// assert_eq!(
///     query.get(true),
///     "WHERE status = ? AND id IN (?,?,?) AND (name LIKE ? OR name LIKE ?) ORDER BY name ASC LIMIT 20, 20"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConditionBuilder {
    tokens: Vec<Token>,
    params: Vec<Value>,
    group_by: Vec<String>,
    order_by: Vec<(String, bool)>,
    limit: Option<(u64, Option<u64>)>,
    next: Option<Connective>,
    groups: Vec<Connective>,
}

impl ConditionBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `column operator ?`, joined to the previous condition by the
    /// pending connective.
    ///
    /// `=` / `<>` with a list become `IN` / `NOT IN`; `IN` / `NOT IN` with a
    /// single value become `=` / `<>`. `LIKE`, `STARTS` and `ENDS` (and their
    /// `NOT` forms) wrap the trimmed, lower-cased value in `%` wildcards.
    /// `IS NULL` / `IS NOT NULL` ignore the value.
    #[must_use]
    pub fn add(mut self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        self.push_condition(column, operator, value.into(), false);
        self
    }

    /// Same as [`add`](Self::add) but compares with `BINARY`, keeping the
    /// value's case.
    #[must_use]
    pub fn add_binary(mut self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        self.push_condition(column, operator, value.into(), true);
        self
    }

    /// Same as [`add`](Self::add), applied only when `condition` holds.
    #[must_use]
    pub fn add_when(
        self, condition: bool, column: &str, operator: &str, value: impl Into<Operand>,
    ) -> Self {
        if condition { self.add(column, operator, value) } else { self }
    }

    /// Same as [`add`](Self::add), skipped when the value is empty.
    #[must_use]
    pub fn add_if(self, column: &str, operator: &str, value: impl Into<Operand>) -> Self {
        let operand = value.into();
        if operand.is_empty() { self } else { self.add(column, operator, operand) }
    }

    /// Full-text style search over several columns.
    ///
    /// Uses the default [`SearchOptions`]: one `LIKE` token matched against
    /// any of the columns.
    #[must_use]
    pub fn search(self, columns: &[&str], value: &str) -> Self {
        self.search_with(columns, value, &SearchOptions::default())
    }

    /// Full-text style search over several columns.
    ///
    /// Each token produces one parenthesised `OR` group across `columns`.
    /// With more than one token the groups are wrapped in an outer group and
    /// joined by `AND` (every token must match) or by `OR` when
    /// `match_any` is set.
    #[must_use]
    pub fn search_with(mut self, columns: &[&str], value: &str, options: &SearchOptions) -> Self {
        let tokens: Vec<&str> = if options.split_value {
            value.split(options.split_text.as_str()).map(str::trim).filter(|t| !t.is_empty()).collect()
        } else {
            Some(value.trim()).into_iter().filter(|t| !t.is_empty()).collect()
        };
        if tokens.is_empty() || columns.is_empty() {
            return self;
        }

        let outer = tokens.len() > 1;
        if outer {
            let inner = if options.match_any { Connective::Or } else { Connective::And };
            self.open_group(inner);
        }

        for token in tokens {
            self.open_group(Connective::Or);
            for column in columns {
                self.push_condition(
                    column,
                    &options.operator,
                    Operand::from(token),
                    !options.case_insensitive,
                );
            }
            self.close_group();
        }

        if outer {
            self.close_group();
        }
        self
    }

    /// Opens a parenthesised group whose conditions are joined by `AND`.
    #[must_use]
    pub fn start_paren(mut self) -> Self {
        self.open_group(Connective::And);
        self
    }

    /// Closes the innermost group.
    #[must_use]
    pub fn end_paren(mut self) -> Self {
        self.close_group();
        self
    }

    /// Joins the next condition with `AND`.
    #[must_use]
    pub const fn and(mut self) -> Self {
        self.next = Some(Connective::And);
        self
    }

    /// Joins the next condition with `OR`.
    #[must_use]
    pub const fn or(mut self) -> Self {
        self.next = Some(Connective::Or);
        self
    }

    /// Opens a group whose conditions are joined by `AND`.
    #[must_use]
    pub fn start_and(mut self) -> Self {
        self.open_group(Connective::And);
        self
    }

    /// Closes a group opened by [`start_and`](Self::start_and). An empty group
    /// leaves no trace in the output.
    #[must_use]
    pub fn end_and(mut self) -> Self {
        self.close_group();
        self
    }

    /// Opens a group whose conditions are joined by `OR`.
    #[must_use]
    pub fn start_or(mut self) -> Self {
        self.open_group(Connective::Or);
        self
    }

    /// Closes a group opened by [`start_or`](Self::start_or). An empty group
    /// leaves no trace in the output.
    #[must_use]
    pub fn end_or(mut self) -> Self {
        self.close_group();
        self
    }

    /// Appends the conditions of `other` as one parenthesised group, joined
    /// by the pending connective, followed by its bind values and ordering.
    #[must_use]
    pub fn add_group(mut self, other: &Self) -> Self {
        let other = other.balanced();
        if !other.tokens.is_empty() {
            self.push_connective();
            self.tokens.push(Token::Open);
            self.tokens.extend(other.tokens.iter().cloned());
            self.tokens.push(Token::Close);
            self.params.extend(other.params.iter().cloned());
        }
        self.order_by.extend(other.order_by.iter().cloned());
        self
    }

    /// Wraps the conditions added so far in parentheses, so that later
    /// conditions apply to all of them at once. Open groups are closed first.
    #[must_use]
    pub fn enclose(mut self) -> Self {
        while !self.groups.is_empty() {
            self.close_group();
        }
        self.next = None;
        if !self.tokens.is_empty() {
            self.tokens.insert(0, Token::Open);
            self.tokens.push(Token::Close);
        }
        self
    }

    /// Adds a `GROUP BY` column.
    #[must_use]
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    /// Adds an `ORDER BY` column.
    #[must_use]
    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order_by.push((column.to_string(), ascending));
        self
    }

    /// Sets `LIMIT from` or, with `to`, `LIMIT from, to` (offset, count).
    #[must_use]
    pub const fn limit(mut self, from: u64, to: Option<u64>) -> Self {
        self.limit = Some((from, to));
        self
    }

    /// Limits the result to one page; pages are numbered from 1.
    #[must_use]
    pub const fn paginate(self, page: u64, page_size: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        self.limit(offset, Some(page_size))
    }

    /// Bind values in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Whether no `WHERE` condition has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.tokens.iter().any(|token| matches!(token, Token::Column(_) | Token::Sql(_)))
    }

    /// Whether an `ORDER BY` column has been added.
    #[must_use]
    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }

    /// Every bare column referenced by the `WHERE`, `GROUP BY` and
    /// `ORDER BY` clauses, first occurrence first, without duplicates.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let referenced = self
            .tokens
            .iter()
            .filter_map(|token| match token {
                Token::Column(column) => Some(column.as_str()),
                _ => None,
            })
            .chain(self.group_by.iter().map(String::as_str))
            .chain(self.order_by.iter().map(|(column, _)| column.as_str()));

        for column in referenced {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
        columns
    }

    /// Rewrites every reference to `old` with `new` (typically its
    /// table-qualified form) in the `WHERE`, `GROUP BY` and `ORDER BY`
    /// clauses.
    pub fn update_column(&mut self, old: &str, new: &str) {
        for token in &mut self.tokens {
            if let Token::Column(column) = token
                && column == old
            {
                new.clone_into(column);
            }
        }
        for column in &mut self.group_by {
            if column == old {
                new.clone_into(column);
            }
        }
        for (column, _) in &mut self.order_by {
            if column == old {
                new.clone_into(column);
            }
        }
    }

    /// Renders the `WHERE` clause alone; empty when there are no conditions.
    #[must_use]
    pub fn where_clause(&self, add_where: bool) -> String {
        let conditions = self.render_conditions();
        if conditions.is_empty() {
            return String::new();
        }
        if add_where { format!("WHERE {conditions}") } else { conditions }
    }

    /// Renders `WHERE ... GROUP BY ... ORDER BY ... LIMIT ...`, omitting empty
    /// clauses, with whitespace collapsed.
    #[must_use]
    pub fn get(&self, add_where: bool) -> String {
        let mut parts = Vec::with_capacity(4);

        let conditions = self.where_clause(add_where);
        if !conditions.is_empty() {
            parts.push(conditions);
        }
        if !self.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, ascending)| {
                    format!("{column} {}", if *ascending { "ASC" } else { "DESC" })
                })
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("ORDER BY {order}"));
        }
        if let Some((from, to)) = self.limit {
            parts.push(to.map_or_else(|| format!("LIMIT {from}"), |to| format!("LIMIT {from}, {to}")));
        }

        collapse_whitespace(&parts.join(" "))
    }

    fn group(&self) -> Connective {
        self.groups.last().copied().unwrap_or(Connective::And)
    }

    // Consumes the pending connective, emitting it unless this is the first
    // condition of the clause or of a group.
    fn push_connective(&mut self) {
        let connective = self.next.take().unwrap_or_else(|| self.group());
        if !self.tokens.is_empty() && self.tokens.last() != Some(&Token::Open) {
            self.tokens.push(Token::Connective(connective));
        }
    }

    fn open_group(&mut self, inner: Connective) {
        self.push_connective();
        self.tokens.push(Token::Open);
        self.groups.push(inner);
    }

    // An end without a matching start is ignored.
    fn close_group(&mut self) {
        if self.groups.pop().is_none() {
            return;
        }
        self.next = None;

        if self.tokens.last() == Some(&Token::Open) {
            self.tokens.pop();
            if matches!(self.tokens.last(), Some(Token::Connective(_))) {
                self.tokens.pop();
            }
        } else {
            self.tokens.push(Token::Close);
        }
    }

    fn push_condition(
        &mut self, column: &str, operator: &str, operand: Operand, case_sensitive: bool,
    ) {
        let mut operator = operator.trim().to_uppercase();
        let mut operand = operand;

        match (operator.as_str(), &operand) {
            ("=", Operand::List(_)) => operator = "IN".to_string(),
            ("<>" | "!=", Operand::List(_)) => operator = "NOT IN".to_string(),
            ("IN", Operand::Scalar(_)) => operator = "=".to_string(),
            ("NOT IN", Operand::Scalar(_)) => operator = "<>".to_string(),
            _ => {}
        }

        let wildcard = match operator.as_str() {
            "LIKE" | "NOT LIKE" => Some(Wildcard::Both),
            "STARTS" | "NOT STARTS" => Some(Wildcard::Start),
            "ENDS" | "NOT ENDS" => Some(Wildcard::End),
            _ => None,
        };
        if let Some(wildcard) = wildcard {
            if let Operand::Scalar(value) = &operand {
                let negated = operator.starts_with("NOT");
                operand = Operand::Scalar(like_pattern(value, wildcard, case_sensitive));
                operator = if negated { "NOT LIKE" } else { "LIKE" }.to_string();
            } else if wildcard != Wildcard::Both {
                tracing::warn!(column, operator = %operator, "list value bypasses pattern rewrite");
            }
        }

        self.push_connective();

        if matches!(operator.as_str(), "IS NULL" | "IS NOT NULL") {
            self.tokens.push(Token::Column(column.to_string()));
            self.tokens.push(Token::Sql(operator));
            return;
        }

        let binary = if case_sensitive { "BINARY " } else { "" };
        match operand {
            Operand::Scalar(value) => {
                self.tokens.push(Token::Column(column.to_string()));
                self.tokens.push(Token::Sql(format!("{operator} {binary}?")));
                self.params.push(value);
            }
            Operand::List(values) if values.is_empty() => {
                // nothing can be IN an empty list, everything is NOT IN it
                let always = if operator.starts_with("NOT") { "1 = 1" } else { "1 = 0" };
                self.tokens.push(Token::Sql(always.to_string()));
            }
            Operand::List(values) => {
                let placeholders = vec![format!("{binary}?"); values.len()].join(",");
                self.tokens.push(Token::Column(column.to_string()));
                self.tokens.push(Token::Sql(format!("{operator} ({placeholders})")));
                self.params.extend(values);
            }
        }
    }

    // A copy with every group still open closed.
    fn balanced(&self) -> Self {
        let mut closed = self.clone();
        while !closed.groups.is_empty() {
            closed.close_group();
        }
        closed
    }

    fn render_conditions(&self) -> String {
        if !self.groups.is_empty() {
            return self.balanced().render_conditions();
        }

        let mut sql = String::new();
        for token in &self.tokens {
            match token {
                Token::Close => sql.push(')'),
                Token::Open => push_word(&mut sql, "("),
                Token::Connective(connective) => push_word(&mut sql, connective.as_str()),
                Token::Column(word) | Token::Sql(word) => push_word(&mut sql, word),
            }
        }
        collapse_whitespace(&sql)
    }
}

fn push_word(sql: &mut String, word: &str) {
    if !sql.is_empty() && !sql.ends_with('(') {
        sql.push(' ');
    }
    sql.push_str(word);
}

pub(crate) fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn like_pattern(value: &Value, wildcard: Wildcard, case_sensitive: bool) -> Value {
    let text = value_text(value);
    let text = text.trim();
    let text = if case_sensitive { text.to_string() } else { text.to_lowercase() };

    let pattern = match wildcard {
        Wildcard::Both => format!("%{text}%"),
        Wildcard::Start => format!("{text}%"),
        Wildcard::End => format!("%{text}"),
    };
    pattern.into()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(Some(text)) => text.as_str().to_string(),
        Value::Char(Some(ch)) => ch.to_string(),
        Value::Bool(Some(v)) => u8::from(*v).to_string(),
        Value::TinyInt(Some(v)) => v.to_string(),
        Value::SmallInt(Some(v)) => v.to_string(),
        Value::Int(Some(v)) => v.to_string(),
        Value::BigInt(Some(v)) => v.to_string(),
        Value::TinyUnsigned(Some(v)) => v.to_string(),
        Value::SmallUnsigned(Some(v)) => v.to_string(),
        Value::Unsigned(Some(v)) => v.to_string(),
        Value::BigUnsigned(Some(v)) => v.to_string(),
        Value::Float(Some(v)) => v.to_string(),
        Value::Double(Some(v)) => v.to_string(),
        _ => String::new(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Bool(v) => !v.unwrap_or(false),
        Value::TinyInt(v) => v.unwrap_or(0) == 0,
        Value::SmallInt(v) => v.unwrap_or(0) == 0,
        Value::Int(v) => v.unwrap_or(0) == 0,
        Value::BigInt(v) => v.unwrap_or(0) == 0,
        Value::TinyUnsigned(v) => v.unwrap_or(0) == 0,
        Value::SmallUnsigned(v) => v.unwrap_or(0) == 0,
        Value::Unsigned(v) => v.unwrap_or(0) == 0,
        Value::BigUnsigned(v) => v.unwrap_or(0) == 0,
        Value::Float(v) => v.is_none_or(|v| v.abs() < f32::EPSILON),
        Value::Double(v) => v.is_none_or(|v| v.abs() < f64::EPSILON),
        Value::String(v) => v.as_ref().is_none_or(|v| v.is_empty()),
        Value::Char(v) => v.is_none(),
        Value::Bytes(v) => v.as_ref().is_none_or(|v| v.is_empty()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn empty_builder_renders_nothing() {
        let query = ConditionBuilder::new();
        assert_eq!(query.get(true), "");
        assert!(query.params().is_empty());
        assert!(query.is_empty());
    }

    #[test]
    fn conditions_default_to_and() {
        let query = ConditionBuilder::new().add("a", "=", 1).add("b", ">", 2).or().add("c", "<", 3);
        assert_eq!(query.get(true), "WHERE a = ? AND b > ? OR c < ?");
        assert_eq!(query.params(), &[Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn connective_resets_after_each_condition() {
        let query = ConditionBuilder::new().add("a", "=", 1).or().add("b", "=", 2).add("c", "=", 3);
        assert_eq!(query.get(false), "a = ? OR b = ? AND c = ?");
    }

    #[test]
    fn equality_with_list_becomes_in() {
        let query = ConditionBuilder::new().add("column", "=", vec![1, 2, 3]);
        assert_eq!(query.get(true), "WHERE column IN (?,?,?)");
        assert_eq!(query.params(), &[Value::from(1), Value::from(2), Value::from(3)]);

        let query = ConditionBuilder::new().add("column", "<>", ["x", "y"]);
        assert_eq!(query.get(true), "WHERE column NOT IN (?,?)");
    }

    #[test]
    fn in_with_scalar_becomes_equality() {
        let query = ConditionBuilder::new().add("a", "IN", 5).add("b", "not in", 6);
        assert_eq!(query.get(true), "WHERE a = ? AND b <> ?");
    }

    #[test]
    fn list_with_other_operator_is_not_converted() {
        let query = ConditionBuilder::new().add("a", ">", vec![1, 2]);
        assert_eq!(query.get(true), "WHERE a > (?,?)");
        assert_eq!(query.params().len(), 2);
    }

    #[test]
    fn empty_lists_short_circuit() {
        let query = ConditionBuilder::new()
            .add("a", "=", Vec::<i64>::new())
            .add("b", "<>", Vec::<i64>::new());
        assert_eq!(query.get(true), "WHERE 1 = 0 AND 1 = 1");
        assert!(query.params().is_empty());
    }

    #[test]
    fn like_wraps_trimmed_lowercase_value() {
        let query = ConditionBuilder::new().add("name", "like", "  Widget ");
        assert_eq!(query.get(true), "WHERE name LIKE ?");
        assert_eq!(query.params(), &[Value::from("%widget%")]);
    }

    #[test]
    fn starts_and_ends_rewrite_to_like() {
        let query = ConditionBuilder::new()
            .add("a", "STARTS", "ab")
            .add("b", "NOT STARTS", "cd")
            .add("c", "ENDS", "ef")
            .add("d", "NOT ENDS", "gh");
        assert_eq!(query.get(true), "WHERE a LIKE ? AND b NOT LIKE ? AND c LIKE ? AND d NOT LIKE ?");
        assert_eq!(
            query.params(),
            &[Value::from("ab%"), Value::from("cd%"), Value::from("%ef"), Value::from("%gh")]
        );
    }

    #[test]
    fn list_bypasses_starts_rewrite() {
        let query = ConditionBuilder::new().add("a", "STARTS", vec!["x", "y"]);
        assert_eq!(query.get(true), "WHERE a STARTS (?,?)");
    }

    #[test]
    fn binary_keeps_case() {
        let query = ConditionBuilder::new().add_binary("code", "=", "AbC").add_binary("name", "LIKE", "XyZ");
        assert_eq!(query.get(true), "WHERE code = BINARY ? AND name LIKE BINARY ?");
        assert_eq!(query.params(), &[Value::from("AbC"), Value::from("%XyZ%")]);
    }

    #[test]
    fn null_operators_take_no_value() {
        let query = ConditionBuilder::new().add("a", "IS NULL", Value::Int(None)).add("b", "is not null", 0);
        assert_eq!(query.get(true), "WHERE a IS NULL AND b IS NOT NULL");
        assert!(query.params().is_empty());
    }

    #[test]
    fn add_if_skips_empty_values() {
        let query = ConditionBuilder::new()
            .add_if("a", "=", "")
            .add_if("b", "=", 0)
            .add_if("c", "=", Vec::<i64>::new())
            .add_if("d", "=", false)
            .add_if("e", "=", 4);
        assert_eq!(query.get(true), "WHERE e = ?");
    }

    #[test]
    fn add_when_respects_explicit_condition() {
        let query = ConditionBuilder::new().add_when(false, "a", "=", 1).add_when(true, "b", "=", "");
        assert_eq!(query.get(true), "WHERE b = ?");
        assert_eq!(query.params(), &[Value::from("")]);
    }

    #[test]
    fn groups_nest_with_their_own_connective() {
        let query = ConditionBuilder::new()
            .add("a", "=", 1)
            .start_or()
            .add("b", "=", 2)
            .add("c", "=", 3)
            .start_and()
            .add("d", "=", 4)
            .add("e", "=", 5)
            .end_and()
            .end_or()
            .add("f", "=", 6);
        assert_eq!(
            query.get(true),
            "WHERE a = ? AND (b = ? OR c = ? OR (d = ? AND e = ?)) AND f = ?"
        );
        assert_eq!(placeholders(&query.get(true)), query.params().len());
    }

    #[test]
    fn leading_group_has_no_connective() {
        let query = ConditionBuilder::new().start_paren().add("a", "=", 1).or().add("b", "=", 2).end_paren();
        assert_eq!(query.get(true), "WHERE (a = ? OR b = ?)");
    }

    #[test]
    fn unmatched_end_is_ignored() {
        let query = ConditionBuilder::new().add("a", "=", 1).end_and().add("b", "=", 2).end_or();
        assert_eq!(query.get(true), "WHERE a = ? AND b = ?");
    }

    #[test]
    fn open_groups_close_on_render() {
        let query = ConditionBuilder::new().start_or().add("a", "=", 1).add("b", "=", 2);
        assert_eq!(query.get(true), "WHERE (a = ? OR b = ?)");

        let dangling = ConditionBuilder::new().add("a", "=", 1).start_and();
        assert_eq!(dangling.get(true), "WHERE a = ?");
        assert!(ConditionBuilder::new().start_or().is_empty());

        let scoped = ConditionBuilder::new().add("c", "=", 3).add_group(&query);
        assert_eq!(scoped.get(true), "WHERE c = ? AND ((a = ? OR b = ?))");
    }

    #[test]
    fn empty_groups_collapse() {
        let query = ConditionBuilder::new().start_and().end_and();
        assert_eq!(query.get(true), "");

        let query = ConditionBuilder::new().add("a", "=", 1).start_or().end_or().add("b", "=", 2);
        assert_eq!(query.get(true), "WHERE a = ? AND b = ?");
        assert!(!query.get(true).contains("()"));

        let query = ConditionBuilder::new().add("a", "=", 1).or().start_paren().end_paren();
        assert_eq!(query.get(true), "WHERE a = ?");
    }

    #[test]
    fn search_single_token() {
        let query = ConditionBuilder::new().search(&["a", "b"], "x");
        assert_eq!(query.get(true), "WHERE (a LIKE ? OR b LIKE ?)");
        assert_eq!(query.params(), &[Value::from("%x%"), Value::from("%x%")]);
    }

    #[test]
    fn search_split_tokens_must_all_match() {
        let options = SearchOptions {
            split_value: true,
            ..SearchOptions::default()
        };
        let query = ConditionBuilder::new().search_with(&["a", "b"], "x y", &options);
        assert_eq!(query.get(true), "WHERE ((a LIKE ? OR b LIKE ?) AND (a LIKE ? OR b LIKE ?))");
        assert_eq!(
            query.params(),
            &[Value::from("%x%"), Value::from("%x%"), Value::from("%y%"), Value::from("%y%")]
        );
    }

    #[test]
    fn search_match_any_token() {
        let options = SearchOptions {
            split_value: true,
            match_any: true,
            ..SearchOptions::default()
        };
        let query = ConditionBuilder::new().add("s", "=", 1).search_with(&["a"], "x  y", &options);
        assert_eq!(query.get(true), "WHERE s = ? AND ((a LIKE ?) OR (a LIKE ?))");
    }

    #[test]
    fn search_with_blank_value_is_noop() {
        let query = ConditionBuilder::new().search(&["a"], "   ");
        assert!(query.is_empty());
    }

    #[test]
    fn suffix_clauses_render_in_order() {
        let query = ConditionBuilder::new()
            .add("a", "=", 1)
            .group_by("a")
            .order_by("b", false)
            .order_by("c", true)
            .limit(10, None);
        assert_eq!(query.get(true), "WHERE a = ? GROUP BY a ORDER BY b DESC, c ASC LIMIT 10");
        assert_eq!(query.get(false), "a = ? GROUP BY a ORDER BY b DESC, c ASC LIMIT 10");
    }

    #[test]
    fn groups_of_other_builders() {
        let scope = ConditionBuilder::new().add("parentId", "=", 4).or().add("parentId", "=", 5);
        let query = ConditionBuilder::new()
            .add("status", "=", 1)
            .add_group(&scope)
            .add_group(&ConditionBuilder::new().order_by("position", true));

        assert_eq!(
            query.get(true),
            "WHERE status = ? AND (parentId = ? OR parentId = ?) ORDER BY position ASC"
        );
        assert_eq!(query.params(), &[Value::from(1), Value::from(4), Value::from(5)]);
    }

    #[test]
    fn enclose_binds_earlier_disjunction() {
        let query = ConditionBuilder::new()
            .add("a", "=", 1)
            .or()
            .add("b", "=", 2)
            .enclose()
            .add("isDeleted", "=", 0);
        assert_eq!(query.where_clause(true), "WHERE (a = ? OR b = ?) AND isDeleted = ?");

        let empty = ConditionBuilder::new().enclose().add("isDeleted", "=", 0);
        assert_eq!(empty.where_clause(false), "isDeleted = ?");
    }

    #[test]
    fn paginate_computes_offset() {
        assert_eq!(ConditionBuilder::new().paginate(3, 25).get(true), "LIMIT 50, 25");
        assert_eq!(ConditionBuilder::new().paginate(0, 25).get(true), "LIMIT 0, 25");
    }

    #[test]
    fn update_column_qualifies_every_clause() {
        let mut query = ConditionBuilder::new()
            .add("name", "=", "x")
            .add("names", "=", "y")
            .group_by("name")
            .order_by("name", true);
        query.update_column("name", "products.name");
        assert_eq!(
            query.get(true),
            "WHERE products.name = ? AND names = ? GROUP BY products.name ORDER BY products.name ASC"
        );
    }

    #[test]
    fn columns_are_listed_once() {
        let query = ConditionBuilder::new()
            .add("a", "=", 1)
            .add("b", "=", 2)
            .add("a", ">", 0)
            .order_by("c", true)
            .group_by("b");
        assert_eq!(query.columns(), vec!["a", "b", "c"]);
    }

    #[test]
    fn placeholder_count_matches_params() {
        let options = SearchOptions {
            split_value: true,
            ..SearchOptions::default()
        };
        let query = ConditionBuilder::new()
            .add("a", "=", vec![1, 2])
            .add("b", "IS NULL", 0)
            .or()
            .start_or()
            .add("c", "STARTS", "q")
            .add("d", "<>", ["x", "y", "z"])
            .end_or()
            .search_with(&["e", "f", "g"], "one two three", &options)
            .add("h", "=", Vec::<i64>::new());
        assert_eq!(placeholders(&query.get(true)), query.params().len());
        assert_eq!(query.params().len(), 2 + 1 + 3 + 9);
    }
}
