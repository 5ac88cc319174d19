//! Helpers shared by every handler that talks to D1.
//!
//! D1 stores booleans as `INTEGER` 0/1 and timestamps as text, so rows are read
//! into `*Row` structs first and converted to the camelCase API shapes after.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer, Visitor};
use wasm_bindgen::JsValue;
use worker::{D1Database, RouteContext};

use crate::config::Config;
use crate::error::ApiResult;

pub fn database(ctx: &RouteContext<Config>) -> ApiResult<D1Database> {
    Ok(ctx.env.d1(&ctx.data.db_binding)?)
}

/// Binds `None` as SQL NULL.
pub fn nullable<T: Into<JsValue>>(value: Option<T>) -> JsValue {
    value.map(Into::into).unwrap_or(JsValue::NULL)
}

pub fn flag(value: bool) -> JsValue {
    JsValue::from(i32::from(value))
}

/// A bind parameter for statements assembled at runtime (partial updates).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i32),
    Real(f64),
    Text(String),
}

impl From<SqlValue> for JsValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => JsValue::NULL,
            SqlValue::Int(v) => v.into(),
            SqlValue::Real(v) => v.into(),
            SqlValue::Text(v) => v.into(),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Int(i32::from(value))
    }
}

/// `SET a = ?1, b = ?2` for a list of column assignments.
pub fn set_clause(columns: &[(&str, SqlValue)]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now() -> DateTime<Utc> {
    let millis = worker::Date::now().as_millis() as i64;
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 as written by this API and SQLite's `datetime('now')` form.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Deserializes an `INTEGER` 0/1 column (or a real boolean) into `bool`.
pub fn int_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FlagVisitor)
}

struct FlagVisitor;

impl<'de> Visitor<'de> for FlagVisitor {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a boolean or 0/1 integer")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
        Ok(v != 0)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
        Ok(v != 0)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<bool, E> {
        Ok(v != 0.0)
    }

    fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
        Ok(false)
    }

    fn visit_none<E: de::Error>(self) -> Result<bool, E> {
        Ok(false)
    }
}

/// Parses a JSON text column, passing anything unparseable through as a string.
pub fn json_column(raw: Option<String>) -> Option<serde_json::Value> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s)))
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// In-memory SQLite with the worker's migrations applied, for statement tests.
#[cfg(test)]
pub(crate) fn migrated() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().expect("open sqlite");
    conn.execute_batch(include_str!("../migrations/0001_initial_schema.sql"))
        .expect("apply migrations");
    conn
}
