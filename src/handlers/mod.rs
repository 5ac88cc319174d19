pub mod auth;
pub mod categories;
pub mod delivery_settings;
pub mod delivery_zones;
pub mod events;
pub mod monitoring;
pub mod products;
pub mod reports;
pub mod rewards;
pub mod stores;
pub mod system_config;
pub mod toppings;
pub mod vouchers;

use serde::Serialize;
use serde_json::{json, Value};
use worker::*;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

pub fn json_response<T: Serialize>(body: &T) -> ApiResult<Response> {
    Ok(Response::from_json(body)?)
}

pub fn created<T: Serialize>(body: &T) -> ApiResult<Response> {
    Ok(Response::from_json(body)?.with_status(201))
}

pub fn deleted() -> ApiResult<Response> {
    json_response(&json!({ "success": true }))
}

pub fn path_param(ctx: &RouteContext<Config>, name: &str) -> ApiResult<String> {
    ctx.param(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing path parameter: {name}")))
}

pub fn query_param(req: &Request, name: &str) -> ApiResult<Option<String>> {
    let url = req.url()?;
    Ok(url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// D1 reports a duplicate primary key as a failed UNIQUE constraint.
pub fn insert_error(e: worker::Error, what: &str) -> ApiError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        ApiError::bad_request(format!("{what} already exists"))
    } else {
        ApiError::Database(message)
    }
}

/// Bulk endpoints take either one object or an array of them.
pub fn batch_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        single => vec![single],
    }
}

/// Outcome of a bulk update, collected per item.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub updated: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Default for BatchOutcome {
    fn default() -> Self {
        Self {
            success: true,
            updated: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }
}

impl BatchOutcome {
    pub fn record(&mut self, result: std::result::Result<(), String>) {
        match result {
            Ok(()) => self.updated += 1,
            Err(e) => {
                self.failed += 1;
                self.errors.push(e);
            }
        }
        self.success = self.failed == 0;
    }
}

pub fn require_text(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_accepts_single_objects_and_arrays() {
        assert_eq!(batch_items(json!({"id": "a"})).len(), 1);
        assert_eq!(batch_items(json!([{"id": "a"}, {"id": "b"}])).len(), 2);
        assert!(batch_items(json!([])).is_empty());
    }

    #[test]
    fn batch_outcome_tracks_failures() {
        let mut outcome = BatchOutcome::default();
        outcome.record(Ok(()));
        assert!(outcome.success);
        outcome.record(Err("Product ID is required".into()));
        outcome.record(Ok(()));
        assert!(!outcome.success);
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.failed, 1);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["errors"][0], "Product ID is required");
    }

    #[test]
    fn empty_outcome_omits_errors() {
        let outcome = BatchOutcome::default();
        assert!(outcome.success);
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn required_text_is_trimmed() {
        assert_eq!(require_text(Some("  Mocha ".into()), "name").unwrap(), "Mocha");
        assert_eq!(require_text(Some("  ".into()), "name").unwrap_err().status(), 400);
        assert!(require_text(None, "name").is_err());
    }
}
