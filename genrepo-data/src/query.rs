use serde_json::Value;

use crate::filter::{Condition, Filter};

/// A fluent SQL builder driven by [`Filter`] trees.
///
/// Every identifier is validated, and quoted when the policy asks for it.
/// Values are never inlined: they come back as bind parameters in
/// placeholder order.
///
/// # Example
///
/// ```ignore
/// let (sql, params) = QueryBuilder::new("users")
///     .filter(Filter::eq("email", "a@b.com").and(Filter::like("name", "%alice%")))
///     .order_by("id", true)
///     .limit(10)
///     .build_select(&["id", "name"])?;
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum IdentifierPolicy {
    /// Validate identifiers, emit them as written.
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    filter: Option<Filter>,
    order: Vec<(String, bool)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
}

/// SQL text plus its bind parameters.
pub type Statement = (String, Vec<Value>);

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: None,
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Validate,
        }
    }

    /// Create a new builder with an explicit SQL dialect.
    pub fn new_with_dialect(table: &str, dialect: Dialect) -> Self {
        Self::new(table).dialect(dialect)
    }

    /// Set the SQL dialect (affects placeholder style and quoting).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configure identifier quoting.
    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    /// Add a filter. Successive calls are combined with AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.filter(Filter::like(column, pattern))
    }

    pub fn where_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::is_in(column, values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.filter(Filter::is_null(column))
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    /// `SELECT columns FROM table [WHERE] [ORDER BY] [LIMIT] [OFFSET]`.
    pub fn build_select(&self, columns: &[&str]) -> Result<Statement, QueryError> {
        let table = self.ident(&self.table, false, "table")?;
        let columns = self.column_list(columns, true)?;

        let mut sql = format!("SELECT {columns} FROM {table}");
        let mut params = Vec::new();
        self.append_where(&mut sql, &mut params)?;
        self.append_order(&mut sql)?;
        self.append_limit_offset(&mut sql);
        Ok((sql, params))
    }

    /// `SELECT COUNT(*) FROM table [WHERE]`.
    pub fn build_count(&self) -> Result<Statement, QueryError> {
        let table = self.ident(&self.table, false, "table")?;
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        let mut params = Vec::new();
        self.append_where(&mut sql, &mut params)?;
        Ok((sql, params))
    }

    /// `SELECT func(column) FROM table [WHERE]`.
    ///
    /// `MAX`, `MIN` and `SUM` keep the column's storage class. `AVG` reads
    /// the column as REAL.
    pub fn build_aggregate(&self, function: &str, column: &str) -> Result<Statement, QueryError> {
        if !matches!(function, "MAX" | "MIN" | "SUM" | "AVG") {
            return Err(QueryError::UnsupportedAggregate(function.to_string()));
        }
        let table = self.ident(&self.table, false, "table")?;
        let column = self.ident(column, false, "column")?;
        let mut sql = if function == "AVG" {
            format!("SELECT AVG(CAST({column} AS REAL)) FROM {table}")
        } else {
            format!("SELECT {function}({column}) FROM {table}")
        };
        let mut params = Vec::new();
        self.append_where(&mut sql, &mut params)?;
        Ok((sql, params))
    }

    /// `INSERT INTO table (columns) VALUES (placeholders)`.
    pub fn build_insert(&self, columns: &[&str]) -> Result<String, QueryError> {
        let table = self.ident(&self.table, false, "table")?;
        let names = self.column_list(columns, false)?;
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|i| self.dialect.placeholder(i))
            .collect();
        Ok(format!(
            "INSERT INTO {table} ({names}) VALUES ({})",
            placeholders.join(", ")
        ))
    }

    /// `UPDATE table SET col = ?, ... WHERE key = ? AND ...`.
    ///
    /// Placeholders are numbered SET columns first, then key columns.
    pub fn build_update(&self, set: &[&str], keys: &[&str]) -> Result<String, QueryError> {
        if keys.is_empty() {
            return Err(QueryError::MissingKey);
        }
        let table = self.ident(&self.table, false, "table")?;
        let mut idx = 1usize;
        let mut assignments = Vec::with_capacity(set.len());
        for col in set {
            let col = self.ident(col, false, "column")?;
            assignments.push(format!("{col} = {}", self.dialect.placeholder(idx)));
            idx += 1;
        }
        let mut predicates = Vec::with_capacity(keys.len());
        for col in keys {
            let col = self.ident(col, false, "column")?;
            predicates.push(format!("{col} = {}", self.dialect.placeholder(idx)));
            idx += 1;
        }
        Ok(format!(
            "UPDATE {table} SET {} WHERE {}",
            assignments.join(", "),
            predicates.join(" AND ")
        ))
    }

    /// `DELETE FROM table WHERE ...`. A delete without a filter is refused.
    pub fn build_delete(&self) -> Result<Statement, QueryError> {
        if self.filter.is_none() {
            return Err(QueryError::MissingKey);
        }
        let table = self.ident(&self.table, false, "table")?;
        let mut sql = format!("DELETE FROM {table}");
        let mut params = Vec::new();
        self.append_where(&mut sql, &mut params)?;
        Ok((sql, params))
    }

    fn append_where(&self, sql: &mut String, params: &mut Vec<Value>) -> Result<(), QueryError> {
        let Some(filter) = &self.filter else {
            return Ok(());
        };
        sql.push_str(" WHERE ");
        let mut placeholder_idx = 1usize;
        self.render(filter, true, sql, params, &mut placeholder_idx)
    }

    fn render(
        &self,
        filter: &Filter,
        top: bool,
        sql: &mut String,
        params: &mut Vec<Value>,
        placeholder_idx: &mut usize,
    ) -> Result<(), QueryError> {
        match filter {
            Filter::Cond(cond) => self.render_condition(cond, sql, params, placeholder_idx),
            Filter::And(members) | Filter::Or(members) if members.is_empty() => {
                sql.push_str(if matches!(filter, Filter::And(_)) {
                    "1 = 1"
                } else {
                    "1 = 0"
                });
                Ok(())
            }
            Filter::And(members) | Filter::Or(members) => {
                let joiner = if matches!(filter, Filter::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                let wrap = !top && members.len() > 1;
                if wrap {
                    sql.push('(');
                }
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(joiner);
                    }
                    self.render(member, false, sql, params, placeholder_idx)?;
                }
                if wrap {
                    sql.push(')');
                }
                Ok(())
            }
            Filter::Not(inner) => {
                sql.push_str("NOT (");
                self.render(inner, true, sql, params, placeholder_idx)?;
                sql.push(')');
                Ok(())
            }
        }
    }

    fn render_condition(
        &self,
        cond: &Condition,
        sql: &mut String,
        params: &mut Vec<Value>,
        placeholder_idx: &mut usize,
    ) -> Result<(), QueryError> {
        let col = self.ident(cond.column(), false, "column")?;
        let mut bind = |value: Value, params: &mut Vec<Value>| {
            let placeholder = self.dialect.placeholder(*placeholder_idx);
            *placeholder_idx += 1;
            params.push(value);
            placeholder
        };
        let fragment = match cond {
            Condition::Eq(_, v) => format!("{col} = {}", bind(v.clone(), params)),
            Condition::NotEq(_, v) => format!("{col} != {}", bind(v.clone(), params)),
            Condition::Gt(_, v) => format!("{col} > {}", bind(v.clone(), params)),
            Condition::Gte(_, v) => format!("{col} >= {}", bind(v.clone(), params)),
            Condition::Lt(_, v) => format!("{col} < {}", bind(v.clone(), params)),
            Condition::Lte(_, v) => format!("{col} <= {}", bind(v.clone(), params)),
            Condition::Like(_, pattern) => {
                format!("{col} LIKE {}", bind(Value::String(pattern.clone()), params))
            }
            Condition::In(_, values) if values.is_empty() => "1 = 0".to_string(),
            Condition::In(_, values) => {
                let placeholders: Vec<_> = values.iter().map(|v| bind(v.clone(), params)).collect();
                format!("{col} IN ({})", placeholders.join(", "))
            }
            Condition::IsNull(_) => format!("{col} IS NULL"),
            Condition::IsNotNull(_) => format!("{col} IS NOT NULL"),
        };
        sql.push_str(&fragment);
        Ok(())
    }

    fn append_order(&self, sql: &mut String) -> Result<(), QueryError> {
        if self.order.is_empty() {
            return Ok(());
        }
        sql.push_str(" ORDER BY ");
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, asc) in &self.order {
            let col = self.ident(col, false, "column")?;
            if *asc {
                clauses.push(format!("{col} ASC"));
            } else {
                clauses.push(format!("{col} DESC"));
            }
        }
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn append_limit_offset(&self, sql: &mut String) {
        match (self.limit_val, self.offset_val) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            // SQLite and MySQL need a LIMIT before OFFSET.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
    }

    fn column_list(&self, columns: &[&str], allow_star: bool) -> Result<String, QueryError> {
        let mut out = Vec::with_capacity(columns.len());
        for col in columns {
            out.push(self.ident(col, allow_star, "column")?);
        }
        Ok(out.join(", "))
    }

    fn ident(&self, ident: &str, allow_star: bool, kind: &'static str) -> Result<String, QueryError> {
        if !is_valid_identifier(ident, allow_star) {
            return Err(QueryError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect, allow_star)),
            IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
    UnsupportedAggregate(String),
    /// UPDATE or DELETE without a key or filter.
    MissingKey,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            QueryError::UnsupportedAggregate(func) => {
                write!(f, "Unsupported aggregate function: {func}")
            }
            QueryError::MissingKey => f.write_str("Refusing to build an unkeyed UPDATE or DELETE"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<QueryError> for crate::error::DataError {
    fn from(err: QueryError) -> Self {
        crate::error::DataError::InvalidArgument(err.to_string())
    }
}

fn is_valid_identifier(ident: &str, allow_star: bool) -> bool {
    if ident.is_empty() {
        return false;
    }
    let parts: Vec<&str> = ident.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if allow_star && *part == "*" {
            return idx + 1 == parts.len();
        }
        if !is_valid_segment(part) {
            return false;
        }
    }
    true
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(ident: &str, dialect: Dialect, allow_star: bool) -> String {
    let quote = dialect.quote_char();
    let parts: Vec<&str> = ident.split('.').collect();
    let last_idx = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, part)| {
            if allow_star && part == "*" && idx == last_idx {
                part.to_string()
            } else {
                format!("{quote}{part}{quote}")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_select() {
        let (sql, params) = QueryBuilder::new("users").build_select(&["*"]).unwrap();
        assert_eq!(sql, "SELECT * FROM users");
        assert!(params.is_empty());
    }

    #[test]
    fn test_where_eq() {
        let (sql, params) = QueryBuilder::new("users")
            .where_eq("email", "a@b.com")
            .build_select(&["*"])
            .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE email = ?");
        assert_eq!(params, vec![json!("a@b.com")]);
    }

    #[test]
    fn test_complex_query() {
        let (sql, params) = QueryBuilder::new("users")
            .where_eq("status", "active")
            .where_like("name", "%alice%")
            .order_by("id", true)
            .limit(10)
            .offset(20)
            .build_select(&["id", "name"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE status = ? AND name LIKE ? ORDER BY id ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![json!("active"), json!("%alice%")]);
    }

    #[test]
    fn test_nested_boolean_filters() {
        let filter = Filter::gte("age", 18)
            .and(Filter::eq("role", "admin").or(Filter::is_null("role")))
            .and(!Filter::like("name", "bot%"));
        let (sql, params) = QueryBuilder::new("users")
            .filter(filter)
            .build_count()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM users WHERE age >= ? AND (role = ? OR role IS NULL) AND NOT (name LIKE ?)"
        );
        assert_eq!(params, vec![json!(18), json!("admin"), json!("bot%")]);
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let (sql, params) = QueryBuilder::new("users")
            .where_in("id", Vec::<i64>::new())
            .build_select(&["*"])
            .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_postgres_placeholders() {
        let (sql, params) = QueryBuilder::new_with_dialect("users", Dialect::Postgres)
            .where_eq("status", "active")
            .where_in("role", ["admin", "user"])
            .build_select(&["*"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE status = $1 AND role IN ($2, $3)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_quoting() {
        let (sql, _) = QueryBuilder::new("users")
            .dialect(Dialect::Postgres)
            .identifier_policy(IdentifierPolicy::Quote)
            .where_eq("users.email", "a@b.com")
            .order_by("users.id", true)
            .build_select(&["users.id", "users.email"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"users\".\"id\", \"users\".\"email\" FROM \"users\" WHERE \"users\".\"email\" = $1 ORDER BY \"users\".\"id\" ASC"
        );
    }

    #[test]
    fn test_invalid_identifier() {
        let err = QueryBuilder::new("users;drop")
            .build_select(&["*"])
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_offset_without_limit() {
        let (sql, _) = QueryBuilder::new("users")
            .offset(5)
            .build_select(&["*"])
            .unwrap();
        assert_eq!(sql, "SELECT * FROM users LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_write_statements() {
        let qb = QueryBuilder::new_with_dialect("users", Dialect::Sqlite)
            .identifier_policy(IdentifierPolicy::Quote);
        assert_eq!(
            qb.build_insert(&["id", "name"]).unwrap(),
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES (?, ?)"
        );
        assert_eq!(
            qb.build_update(&["name", "age"], &["id"]).unwrap(),
            "UPDATE \"users\" SET \"name\" = ?, \"age\" = ? WHERE \"id\" = ?"
        );
        assert!(matches!(qb.build_delete(), Err(QueryError::MissingKey)));
        let (sql, params) = qb.filter(Filter::eq("id", 3)).build_delete().unwrap();
        assert_eq!(sql, "DELETE FROM \"users\" WHERE \"id\" = ?");
        assert_eq!(params, vec![json!(3)]);
    }

    #[test]
    fn test_aggregate() {
        let (sql, _) = QueryBuilder::new("orders")
            .where_eq("customer_id", 1)
            .build_aggregate("MAX", "total")
            .unwrap();
        assert_eq!(
            sql,
            "SELECT MAX(total) FROM orders WHERE customer_id = ?"
        );
        let (sql, _) = QueryBuilder::new("orders").build_aggregate("AVG", "total").unwrap();
        assert_eq!(sql, "SELECT AVG(CAST(total AS REAL)) FROM orders");
        assert!(QueryBuilder::new("orders").build_aggregate("DROP", "x").is_err());
    }
}
