use serde::Deserialize;
use serde_json::{json, Map, Value};
use wasm_bindgen::JsValue;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, flag, new_id, now, nullable, set_clause, timestamp, SqlValue};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, json_response, query_param};
use crate::models::{string_or_number, DeliveryZone, DeliveryZoneRow};

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Polygon,
    Real,
    Int,
    Flag,
}

/// Columns an update may touch: (payload key, column, kind). The column name is
/// also accepted as a payload key.
const UPDATABLE: &[(&str, &str, FieldKind)] = &[
    ("name", "name", FieldKind::Text),
    ("polygon", "polygon", FieldKind::Polygon),
    ("baseFee", "base_fee", FieldKind::Real),
    ("perKmFee", "per_km_fee", FieldKind::Real),
    ("maxDistanceKm", "max_distance_km", FieldKind::Real),
    ("minOrderAmount", "min_order_amount", FieldKind::Real),
    ("estimatedMinutesBase", "estimated_minutes_base", FieldKind::Int),
    ("estimatedMinutesPerKm", "estimated_minutes_per_km", FieldKind::Int),
    ("isActive", "is_active", FieldKind::Flag),
    ("priority", "priority", FieldKind::Int),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInput {
    #[serde(default, alias = "store_id", deserialize_with = "string_or_number")]
    pub store_id: Option<String>,
    pub name: Option<String>,
    pub polygon: Option<Value>,
    #[serde(alias = "base_fee")]
    pub base_fee: Option<f64>,
    #[serde(alias = "per_km_fee")]
    pub per_km_fee: Option<f64>,
    #[serde(alias = "max_distance_km")]
    pub max_distance_km: Option<f64>,
    #[serde(alias = "min_order_amount")]
    pub min_order_amount: Option<f64>,
    #[serde(alias = "estimated_minutes_base")]
    pub estimated_minutes_base: Option<i32>,
    #[serde(alias = "estimated_minutes_per_km")]
    pub estimated_minutes_per_km: Option<i32>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
}

/// A new zone with defaults filled in.
#[derive(Debug, PartialEq)]
pub struct NewZone {
    pub store_id: String,
    pub name: Option<String>,
    pub polygon: Option<String>,
    pub base_fee: f64,
    pub per_km_fee: f64,
    pub max_distance_km: f64,
    pub min_order_amount: f64,
    pub estimated_minutes_base: i32,
    pub estimated_minutes_per_km: i32,
    pub is_active: bool,
    pub priority: i32,
}

impl ZoneInput {
    pub fn into_new_zone(self) -> ApiResult<NewZone> {
        let store_id = self
            .store_id
            .ok_or_else(|| ApiError::bad_request("storeId is required"))?;
        let amounts = [
            self.base_fee,
            self.per_km_fee,
            self.max_distance_km,
            self.min_order_amount,
        ];
        if amounts.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ApiError::bad_request("fees and distances must not be negative"));
        }

        Ok(NewZone {
            store_id,
            name: self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            polygon: self.polygon.and_then(polygon_text),
            base_fee: self.base_fee.unwrap_or(0.0),
            per_km_fee: self.per_km_fee.unwrap_or(0.0),
            max_distance_km: self.max_distance_km.unwrap_or(10.0),
            min_order_amount: self.min_order_amount.unwrap_or(0.0),
            estimated_minutes_base: self.estimated_minutes_base.unwrap_or(30),
            estimated_minutes_per_km: self.estimated_minutes_per_km.unwrap_or(5),
            is_active: self.is_active.unwrap_or(true),
            priority: self.priority.unwrap_or(0),
        })
    }
}

/// GeoJSON arrives as an object, WKT as a string; both are stored as text.
fn polygon_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Builds the column assignments for a partial update from the whitelisted keys present.
pub fn zone_patch(body: &Map<String, Value>) -> std::result::Result<Vec<(&'static str, SqlValue)>, String> {
    let mut columns = Vec::new();
    for (key, column, kind) in UPDATABLE {
        let Some(value) = body.get(*key).or_else(|| body.get(*column)) else {
            continue;
        };
        let sql = match (kind, value) {
            (FieldKind::Text | FieldKind::Polygon, Value::Null) => SqlValue::Null,
            (FieldKind::Text, Value::String(s)) => SqlValue::Text(s.trim().to_string()),
            (FieldKind::Polygon, v) => polygon_text(v.clone()).map_or(SqlValue::Null, SqlValue::Text),
            (FieldKind::Real, Value::Number(n)) => match n.as_f64() {
                Some(v) if v >= 0.0 => SqlValue::Real(v),
                _ => return Err(format!("{key} must be a non-negative number")),
            },
            (FieldKind::Int, Value::Number(n)) => match n.as_i64().and_then(|v| i32::try_from(v).ok()) {
                Some(v) => SqlValue::Int(v),
                None => return Err(format!("{key} must be an integer")),
            },
            (FieldKind::Flag, Value::Bool(b)) => SqlValue::from(*b),
            _ => return Err(format!("{key} has an invalid value")),
        };
        columns.push((*column, sql));
    }
    Ok(columns)
}

async fn store_exists(d1: &D1Database, store_id: &str) -> ApiResult<bool> {
    let found = d1
        .prepare("SELECT id FROM stores WHERE id = ?1")
        .bind(&[store_id.into()])?
        .first::<String>(Some("id"))
        .await?;
    Ok(found.is_some())
}

pub async fn list_zones(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let d1 = database(&ctx)?;

    let mut sql = String::from(
        "SELECT z.*, s.name AS store_name, s.address AS store_address FROM delivery_zones z \
         LEFT JOIN stores s ON s.id = z.store_id",
    );
    let mut params: Vec<JsValue> = Vec::new();
    if let Some(store_id) = query_param(&req, "storeId")? {
        sql.push_str(" WHERE z.store_id = ?1");
        params.push(store_id.into());
    }
    sql.push_str(" ORDER BY z.created_at DESC");

    let zones: Vec<DeliveryZone> = d1
        .prepare(&sql)
        .bind(&params)?
        .all()
        .await?
        .results::<DeliveryZoneRow>()?
        .into_iter()
        .map(DeliveryZone::from)
        .collect();
    json_response(&json!({ "zones": zones }))
}

pub async fn create_zone(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let zone = read_json::<ZoneInput>(&mut req).await?.into_new_zone()?;
    let d1 = database(&ctx)?;

    if !store_exists(&d1, &zone.store_id).await? {
        return Err(ApiError::not_found("Store not found"));
    }

    let id = new_id();
    let row = d1
        .prepare(
            "INSERT INTO delivery_zones (id, store_id, name, polygon, base_fee, per_km_fee, \
             max_distance_km, min_order_amount, estimated_minutes_base, estimated_minutes_per_km, \
             is_active, priority, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) RETURNING *",
        )
        .bind(&[
            id.as_str().into(),
            zone.store_id.as_str().into(),
            nullable(zone.name),
            nullable(zone.polygon),
            zone.base_fee.into(),
            zone.per_km_fee.into(),
            zone.max_distance_km.into(),
            zone.min_order_amount.into(),
            zone.estimated_minutes_base.into(),
            zone.estimated_minutes_per_km.into(),
            flag(zone.is_active),
            zone.priority.into(),
            timestamp(now()).into(),
        ])?
        .first::<DeliveryZoneRow>(None)
        .await?
        .ok_or_else(|| ApiError::Database("Created zone could not be read back".into()))?;

    tracing::info!(zone = %id, store = %zone.store_id, "delivery zone created");
    created(&json!({ "success": true, "zone": DeliveryZone::from(row) }))
}

pub async fn update_zone(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let body: Map<String, Value> = read_json(&mut req).await?;

    let id = match body.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ApiError::bad_request("Zone ID is required")),
    };
    let columns = zone_patch(&body).map_err(ApiError::BadRequest)?;
    if columns.is_empty() {
        return Err(ApiError::bad_request("No valid fields to update"));
    }

    let sql = format!(
        "UPDATE delivery_zones SET {} WHERE id = ?{} RETURNING *",
        set_clause(&columns),
        columns.len() + 1
    );
    let mut params: Vec<JsValue> = columns.into_iter().map(|(_, v)| v.into()).collect();
    params.push(id.into());

    let d1 = database(&ctx)?;
    match d1.prepare(&sql).bind(&params)?.first::<DeliveryZoneRow>(None).await? {
        Some(row) => json_response(&json!({ "success": true, "zone": DeliveryZone::from(row) })),
        None => Err(ApiError::not_found("Zone not found")),
    }
}

pub async fn delete_zone(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = query_param(&req, "id")?.ok_or_else(|| ApiError::bad_request("Zone ID is required"))?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM delivery_zones WHERE id = ?1 RETURNING id")
        .bind(&[id.into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Zone not found")),
    }
}
