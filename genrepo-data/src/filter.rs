//! Translatable boolean expressions over columns.
//!
//! A [`Filter`] can be evaluated in process against a record's serialized
//! fields or rendered to SQL by [`QueryBuilder`](crate::QueryBuilder). Both
//! follow SQL comparison rules: any comparison involving `NULL` is false, and
//! `LIKE` is case-insensitive for ASCII letters.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A single column comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    NotEq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Like(String, String),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _)
            | Condition::NotEq(c, _)
            | Condition::Gt(c, _)
            | Condition::Gte(c, _)
            | Condition::Lt(c, _)
            | Condition::Lte(c, _)
            | Condition::Like(c, _)
            | Condition::In(c, _)
            | Condition::IsNull(c)
            | Condition::IsNotNull(c) => c,
        }
    }

    fn matches(&self, fields: &Map<String, Value>) -> bool {
        let field = fields.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(_, v) => compare(field, v) == Some(Ordering::Equal),
            Condition::NotEq(_, v) => matches!(compare(field, v), Some(o) if o != Ordering::Equal),
            Condition::Gt(_, v) => compare(field, v) == Some(Ordering::Greater),
            Condition::Gte(_, v) => matches!(compare(field, v), Some(Ordering::Greater | Ordering::Equal)),
            Condition::Lt(_, v) => compare(field, v) == Some(Ordering::Less),
            Condition::Lte(_, v) => matches!(compare(field, v), Some(Ordering::Less | Ordering::Equal)),
            Condition::Like(_, pattern) => match field {
                Value::String(s) => like(pattern, s),
                Value::Number(n) => like(pattern, &n.to_string()),
                _ => false,
            },
            Condition::In(_, values) => values
                .iter()
                .any(|v| compare(field, v) == Some(Ordering::Equal)),
            Condition::IsNull(_) => field.is_null(),
            Condition::IsNotNull(_) => !field.is_null(),
        }
    }
}

/// Boolean expression tree of [`Condition`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Cond(Condition),
    /// True when every member is true; empty is true.
    And(Vec<Filter>),
    /// True when any member is true; empty is false.
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cond(Condition::Eq(column.into(), value.into()))
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cond(Condition::NotEq(column.into(), value.into()))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cond(Condition::Gt(column.into(), value.into()))
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cond(Condition::Gte(column.into(), value.into()))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cond(Condition::Lt(column.into(), value.into()))
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cond(Condition::Lte(column.into(), value.into()))
    }

    /// SQL `LIKE` with `%` and `_` wildcards.
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Cond(Condition::Like(column.into(), pattern.into()))
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::Cond(Condition::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::Cond(Condition::IsNull(column.into()))
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::Cond(Condition::IsNotNull(column.into()))
    }

    /// Conjunction of `filters`. A single filter is returned as is.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<Filter> = filters.into_iter().collect();
        if filters.len() == 1 {
            if let Some(only) = filters.pop() {
                return only;
            }
        }
        Filter::And(filters)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut members) => {
                members.push(other);
                Filter::And(members)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut members) => {
                members.push(other);
                Filter::Or(members)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Evaluate against serialized record fields. Missing fields read as
    /// null.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Filter::Cond(c) => c.matches(fields),
            Filter::And(members) => members.iter().all(|f| f.matches(fields)),
            Filter::Or(members) => members.iter().any(|f| f.matches(fields)),
            Filter::Not(inner) => !inner.matches(fields),
        }
    }

    /// Every column the filter references, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Cond(c) => out.push(c.column()),
            Filter::And(members) | Filter::Or(members) => {
                for m in members {
                    m.collect_columns(out);
                }
            }
            Filter::Not(inner) => inner.collect_columns(out),
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

/// SQL-style comparison. `None` when either side is null or the values are
/// not comparable. Booleans compare as 0/1 against numbers.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::Bool(x), Value::Number(n)) => (*x as u8 as f64).partial_cmp(&n.as_f64()?),
        (Value::Number(n), Value::Bool(y)) => n.as_f64()?.partial_cmp(&(*y as u8 as f64)),
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

/// `LIKE` matching: `%` is any run, `_` is one character, ASCII letters are
/// case-insensitive.
fn like(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '_' || p[pi].eq_ignore_ascii_case(&t[ti])) {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}
