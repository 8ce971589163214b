//! Metadata predicates applied before ranking.
//!
//! A filter compiles to a SQL boolean over `json_extract` of the entry's
//! metadata with every key and value bound as a parameter. Leaves evaluate
//! to false when the key is missing or the types are not comparable
//! (numbers compare with numbers and booleans, strings with strings), and
//! [`MetadataFilter::matches`] applies the same rules in memory.
use std::cmp::Ordering;

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::document::{Metadata, MetadataValue};
use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFilter {
    Eq { key: String, value: MetadataValue },
    Ne { key: String, value: MetadataValue },
    Gt { key: String, value: MetadataValue },
    Gte { key: String, value: MetadataValue },
    Lt { key: String, value: MetadataValue },
    Lte { key: String, value: MetadataValue },
    In { key: String, values: Vec<MetadataValue> },
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
    Not(Box<MetadataFilter>),
}

#[derive(Clone, Copy)]
enum Cmp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Cmp {
    fn sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Gt => ord == Ordering::Greater,
            Self::Gte => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Lte => ord != Ordering::Greater,
        }
    }
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn ne(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Ne {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn gte(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Gte {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn lte(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Lte {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Evaluate against in-memory metadata.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq { key, value } => metadata
                .get(key)
                .is_some_and(|v| compare(v, value) == Some(Ordering::Equal)),
            Self::Ne { key, value } => metadata
                .get(key)
                .is_some_and(|v| compare(v, value) != Some(Ordering::Equal)),
            Self::Gt { key, value } => leaf_cmp(metadata, key, value, Cmp::Gt),
            Self::Gte { key, value } => leaf_cmp(metadata, key, value, Cmp::Gte),
            Self::Lt { key, value } => leaf_cmp(metadata, key, value, Cmp::Lt),
            Self::Lte { key, value } => leaf_cmp(metadata, key, value, Cmp::Lte),
            Self::In { key, values } => metadata.get(key).is_some_and(|v| {
                values
                    .iter()
                    .any(|candidate| compare(v, candidate) == Some(Ordering::Equal))
            }),
            Self::And(parts) => parts.iter().all(|f| f.matches(metadata)),
            Self::Or(parts) => parts.iter().any(|f| f.matches(metadata)),
            Self::Not(inner) => !inner.matches(metadata),
        }
    }

    /// Append this predicate as a SQL boolean expression over `e.metadata`.
    pub(crate) fn to_sql(&self, sql: &mut String, params: &mut Vec<Value>) -> Result<()> {
        match self {
            Self::Eq { key, value } => {
                sql.push_str("COALESCE(json_extract(e.metadata, ?) = ?, 0)");
                params.push(json_path(key)?);
                params.push(to_sql_value(value));
            }
            Self::Ne { key, value } => {
                sql.push_str("COALESCE(json_extract(e.metadata, ?) <> ?, 0)");
                params.push(json_path(key)?);
                params.push(to_sql_value(value));
            }
            Self::Gt { key, value } => ordered_to_sql(key, value, Cmp::Gt, sql, params)?,
            Self::Gte { key, value } => ordered_to_sql(key, value, Cmp::Gte, sql, params)?,
            Self::Lt { key, value } => ordered_to_sql(key, value, Cmp::Lt, sql, params)?,
            Self::Lte { key, value } => ordered_to_sql(key, value, Cmp::Lte, sql, params)?,
            Self::In { key, values } => {
                if values.is_empty() {
                    sql.push('0');
                    return Ok(());
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!(
                    "COALESCE(json_extract(e.metadata, ?) IN ({placeholders}), 0)"
                ));
                params.push(json_path(key)?);
                params.extend(values.iter().map(to_sql_value));
            }
            Self::And(parts) => join_to_sql(parts, " AND ", '1', sql, params)?,
            Self::Or(parts) => join_to_sql(parts, " OR ", '0', sql, params)?,
            Self::Not(inner) => {
                sql.push_str("NOT (");
                inner.to_sql(sql, params)?;
                sql.push(')');
            }
        }
        Ok(())
    }
}

fn join_to_sql(
    parts: &[MetadataFilter],
    sep: &str,
    empty: char,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<()> {
    if parts.is_empty() {
        sql.push(empty);
        return Ok(());
    }
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(sep);
        }
        part.to_sql(sql, params)?;
    }
    sql.push(')');
    Ok(())
}

fn ordered_to_sql(
    key: &str,
    value: &MetadataValue,
    cmp: Cmp,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<()> {
    let types = match value {
        MetadataValue::String(_) => "'text'",
        _ => "'integer', 'real', 'true', 'false'",
    };
    sql.push_str(&format!(
        "COALESCE(json_type(e.metadata, ?) IN ({types}) AND json_extract(e.metadata, ?) {} ?, 0)",
        cmp.sql()
    ));
    let path = json_path(key)?;
    params.push(path.clone());
    params.push(path);
    params.push(to_sql_value(value));
    Ok(())
}

fn leaf_cmp(metadata: &Metadata, key: &str, value: &MetadataValue, cmp: Cmp) -> bool {
    metadata
        .get(key)
        .and_then(|v| compare(v, value))
        .is_some_and(|ord| cmp.holds(ord))
}

fn as_number(v: &MetadataValue) -> Option<f64> {
    match v {
        MetadataValue::Integer(i) => Some(*i as f64),
        MetadataValue::Float(f) => Some(*f),
        MetadataValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        MetadataValue::String(_) => None,
    }
}

fn compare(a: &MetadataValue, b: &MetadataValue) -> Option<Ordering> {
    match (a, b) {
        (MetadataValue::String(x), MetadataValue::String(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

fn to_sql_value(v: &MetadataValue) -> Value {
    match v {
        MetadataValue::Bool(b) => Value::Integer(i64::from(*b)),
        MetadataValue::Integer(i) => Value::Integer(*i),
        MetadataValue::Float(f) => Value::Real(*f),
        MetadataValue::String(s) => Value::Text(s.clone()),
    }
}

/// Quote `key` as a single JSON path member.
fn json_path(key: &str) -> Result<Value> {
    if key.is_empty() || key.contains(['"', '\\']) {
        return Err(RagError::InvalidConfig(format!(
            "unsupported metadata filter key: {key:?}"
        )));
    }
    Ok(Value::Text(format!("$.\"{key}\"")))
}
