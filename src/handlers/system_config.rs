use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Value};
use wasm_bindgen::JsValue;
use worker::*;

use crate::auth::{require_admin, Admin};
use crate::config::Config;
use crate::db::{database, now, timestamp};
use crate::error::{read_json, ApiResult};
use crate::handlers::{batch_items, json_response, query_param, BatchOutcome};
use crate::models::{numeric, value_text, ConfigEntry, SystemConfigRow};

const SELECT_CONFIG: &str = "SELECT * FROM system_config WHERE key = ?1";
const UPDATE_CONFIG: &str =
    "UPDATE system_config SET value = ?1, updated_at = ?2, updated_by = ?3 WHERE key = ?4";

/// Row access for config updates. Errors carry the database message.
#[allow(async_fn_in_trait)]
pub trait ConfigStore {
    async fn find(&self, key: &str) -> std::result::Result<Option<SystemConfigRow>, String>;
    async fn write(&self, key: &str, text: &str, at: &str, by: &str) -> std::result::Result<(), String>;
}

impl ConfigStore for D1Database {
    async fn find(&self, key: &str) -> std::result::Result<Option<SystemConfigRow>, String> {
        self.prepare(SELECT_CONFIG)
            .bind(&[key.into()])
            .map_err(|e| e.to_string())?
            .first::<SystemConfigRow>(None)
            .await
            .map_err(|e| e.to_string())
    }

    async fn write(&self, key: &str, text: &str, at: &str, by: &str) -> std::result::Result<(), String> {
        self.prepare(UPDATE_CONFIG)
            .bind(&[text.into(), at.into(), by.into(), key.into()])
            .map_err(|e| e.to_string())?
            .run()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// Validates a new value against the stored entry and returns the text to store.
pub fn check_update(row: &SystemConfigRow, value: &Value) -> std::result::Result<String, String> {
    let key = &row.key;
    if row.is_locked {
        return Err(format!("Config '{key}' is locked and cannot be modified"));
    }
    if value.is_null() {
        return Err(format!("Config '{key}' requires a value"));
    }

    let min = row.min_value.as_ref().and_then(numeric);
    let max = row.max_value.as_ref().and_then(numeric);
    if min.is_some() || max.is_some() {
        let number = numeric(value).ok_or_else(|| format!("Config '{key}' must be a number"))?;
        if let Some(min) = min.filter(|min| number < *min) {
            return Err(format!("Config '{key}' must be at least {min}"));
        }
        if let Some(max) = max.filter(|max| number > *max) {
            return Err(format!("Config '{key}' must be at most {max}"));
        }
    }
    Ok(value_text(value))
}

pub fn group_entries(entries: &[ConfigEntry]) -> BTreeMap<String, Vec<ConfigEntry>> {
    let mut groups: BTreeMap<String, Vec<ConfigEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.category.clone()).or_default().push(entry.clone());
    }
    groups
}

pub async fn list_config(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let d1 = database(&ctx)?;

    let mut sql = String::from("SELECT * FROM system_config");
    let mut params: Vec<JsValue> = Vec::new();
    if let Some(category) = query_param(&req, "category")? {
        sql.push_str(" WHERE COALESCE(category, 'general') = ?1");
        params.push(category.into());
    }
    sql.push_str(" ORDER BY category ASC, key ASC");

    let configs: Vec<ConfigEntry> = d1
        .prepare(&sql)
        .bind(&params)?
        .all()
        .await?
        .results::<SystemConfigRow>()?
        .into_iter()
        .map(ConfigEntry::from)
        .collect();

    let by_category = group_entries(&configs);
    let categories: Vec<&String> = by_category.keys().collect();
    json_response(&json!({
        "configs": configs,
        "byCategory": by_category,
        "categories": categories,
    }))
}

pub async fn update_config(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let admin = require_admin(&req, &ctx)?;
    let body: Value = read_json(&mut req).await?;
    let d1 = database(&ctx)?;
    let at = timestamp(now());

    let mut outcome = BatchOutcome::default();
    for item in batch_items(body) {
        let result = match serde_json::from_value::<ConfigUpdate>(item) {
            Ok(update) => apply(&d1, &admin, &at, update).await,
            Err(e) => Err(format!("Invalid item: {e}")),
        };
        outcome.record(result);
    }

    tracing::info!(
        admin = %admin.id,
        updated = outcome.updated,
        failed = outcome.failed,
        "system config updated"
    );
    json_response(&outcome)
}

async fn apply<S: ConfigStore>(
    store: &S,
    admin: &Admin,
    at: &str,
    update: ConfigUpdate,
) -> std::result::Result<(), String> {
    let key = update
        .key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "Config key is required".to_string())?;

    let row = store
        .find(&key)
        .await
        .map_err(|e| {
            tracing::error!(key = %key, error = %e, "config lookup failed");
            format!("Failed to read config '{key}': {e}")
        })?
        .ok_or_else(|| format!("Config '{key}' not found"))?;

    let text = check_update(&row, &update.value).inspect_err(|reason| {
        tracing::warn!(key = %key, admin = %admin.id, reason = %reason, "config update refused");
    })?;

    store.write(&key, &text, at, &admin.id).await.map_err(|e| {
        tracing::error!(key = %key, error = %e, "config write failed");
        format!("Failed to update config '{key}': {e}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, OptionalExtension};

    struct Sqlite(Connection);

    impl ConfigStore for Sqlite {
        async fn find(&self, key: &str) -> std::result::Result<Option<SystemConfigRow>, String> {
            self.0
                .query_row(SELECT_CONFIG, [key], |r| {
                    let text = |col: &str| -> rusqlite::Result<Option<Value>> {
                        Ok(r.get::<_, Option<String>>(col)?.map(Value::String))
                    };
                    Ok(SystemConfigRow {
                        key: r.get("key")?,
                        value: Value::String(r.get("value")?),
                        category: r.get("category")?,
                        description: r.get("description")?,
                        is_locked: r.get::<_, i64>("is_locked")? != 0,
                        min_value: text("min_value")?,
                        max_value: text("max_value")?,
                        updated_at: r.get("updated_at")?,
                        updated_by: r.get("updated_by")?,
                    })
                })
                .optional()
                .map_err(|e| e.to_string())
        }

        async fn write(&self, key: &str, text: &str, at: &str, by: &str) -> std::result::Result<(), String> {
            self.0
                .execute(UPDATE_CONFIG, [text, at, by, key])
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
    }

    /// Finds rows but every write fails the way a full disk does.
    struct ReadOnly(Sqlite);

    impl ConfigStore for ReadOnly {
        async fn find(&self, key: &str) -> std::result::Result<Option<SystemConfigRow>, String> {
            self.0.find(key).await
        }

        async fn write(&self, _: &str, _: &str, _: &str, _: &str) -> std::result::Result<(), String> {
            Err("D1_ERROR: disk I/O error".into())
        }
    }

    const AT: &str = "2026-05-03T12:00:00.000Z";

    fn seeded() -> Sqlite {
        let conn = crate::db::migrated();
        conn.execute_batch(
            "INSERT INTO system_config (key, value, category, is_locked, min_value, max_value)
             VALUES ('payment_provider', 'vnpay', 'payments', 1, NULL, NULL),
                    ('undo_window_seconds', '30', 'orders', 0, '10', '60');",
        )
        .unwrap();
        Sqlite(conn)
    }

    fn stored(store: &Sqlite, key: &str) -> (String, Option<String>) {
        store
            .0
            .query_row(
                "SELECT value, updated_by FROM system_config WHERE key = ?1",
                [key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap()
    }

    fn admin() -> Admin {
        Admin { id: "system-admin".into() }
    }

    fn change(key: &str, value: Value) -> ConfigUpdate {
        ConfigUpdate { key: Some(key.into()), value }
    }

    fn row(key: &str, locked: bool, min: Option<Value>, max: Option<Value>) -> SystemConfigRow {
        SystemConfigRow {
            key: key.into(),
            value: json!("30"),
            category: Some("orders".into()),
            description: None,
            is_locked: locked,
            min_value: min,
            max_value: max,
            updated_at: None,
            updated_by: None,
        }
    }

    #[test]
    fn locked_entries_are_refused() {
        let locked = row("payment_provider", true, None, None);
        assert_eq!(
            check_update(&locked, &json!("other")).unwrap_err(),
            "Config 'payment_provider' is locked and cannot be modified"
        );
    }

    #[test]
    fn bounds_apply_to_numbers_and_numeric_strings() {
        let bounded = row("undo_window_seconds", false, Some(json!(10)), Some(json!("60")));
        assert_eq!(check_update(&bounded, &json!(45)).unwrap(), "45");
        assert_eq!(check_update(&bounded, &json!("12")).unwrap(), "12");
        assert_eq!(
            check_update(&bounded, &json!(5)).unwrap_err(),
            "Config 'undo_window_seconds' must be at least 10"
        );
        assert_eq!(
            check_update(&bounded, &json!(61)).unwrap_err(),
            "Config 'undo_window_seconds' must be at most 60"
        );
        assert!(check_update(&bounded, &json!("soon")).is_err());
    }

    #[test]
    fn unbounded_values_are_stored_as_text() {
        let open = row("welcome_message", false, None, None);
        assert_eq!(check_update(&open, &json!("Xin chào")).unwrap(), "Xin chào");
        assert_eq!(check_update(&open, &json!(true)).unwrap(), "true");
        assert_eq!(check_update(&open, &json!({"a": [1]})).unwrap(), r#"{"a":[1]}"#);
        assert!(check_update(&open, &Value::Null).is_err());
    }

    #[test]
    fn missing_value_deserializes_as_null() {
        let update: ConfigUpdate = serde_json::from_value(json!({"key": "k"})).unwrap();
        assert!(update.value.is_null());
    }

    #[test]
    fn entries_group_by_category() {
        let mut general = ConfigEntry::from(row("a", false, None, None));
        general.category = "general".into();
        let orders = ConfigEntry::from(row("b", false, None, None));
        let groups = group_entries(&[general, orders]);
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["general", "orders"]);
        assert_eq!(groups["orders"][0].key, "b");
    }

    #[tokio::test]
    async fn locked_rows_keep_their_stored_value() {
        let store = seeded();
        let err = apply(&store, &admin(), AT, change("payment_provider", json!("cash")))
            .await
            .unwrap_err();
        assert_eq!(err, "Config 'payment_provider' is locked and cannot be modified");
        assert_eq!(stored(&store, "payment_provider"), ("vnpay".into(), None));
    }

    #[tokio::test]
    async fn accepted_updates_are_stamped() {
        let store = seeded();
        apply(&store, &admin(), AT, change("undo_window_seconds", json!(45)))
            .await
            .unwrap();
        assert_eq!(
            stored(&store, "undo_window_seconds"),
            ("45".into(), Some("system-admin".into()))
        );

        let err = apply(&store, &admin(), AT, change("undo_window_seconds", json!(90)))
            .await
            .unwrap_err();
        assert_eq!(err, "Config 'undo_window_seconds' must be at most 60");
        assert_eq!(stored(&store, "undo_window_seconds").0, "45");
    }

    #[tokio::test]
    async fn unknown_keys_are_not_found() {
        let store = seeded();
        let err = apply(&store, &admin(), AT, change("tax_rate", json!(8)))
            .await
            .unwrap_err();
        assert_eq!(err, "Config 'tax_rate' not found");
    }

    #[tokio::test]
    async fn write_failures_keep_the_database_message() {
        let store = ReadOnly(seeded());
        let err = apply(&store, &admin(), AT, change("undo_window_seconds", json!(20)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            "Failed to update config 'undo_window_seconds': D1_ERROR: disk I/O error"
        );
    }
}
