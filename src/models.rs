use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::db::{int_bool, json_column};

/// Ids arrive as strings from most screens, but a few send numbers.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// Products

#[derive(Debug, Deserialize)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub base_price: f64,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub image: Option<String>,
    #[serde(deserialize_with = "int_bool")]
    pub is_popular: bool,
    #[serde(deserialize_with = "int_bool")]
    pub is_new: bool,
    pub size_options: Option<String>,
    pub topping_options: Option<String>,
    #[serde(deserialize_with = "int_bool")]
    pub is_available: bool,
    #[serde(deserialize_with = "int_bool")]
    pub is_deliverable: bool,
    #[serde(deserialize_with = "int_bool")]
    pub best_in_store: bool,
    pub delivery_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub category_id: Option<String>,
    pub category: Option<String>,
    pub image: String,
    pub is_popular: bool,
    pub is_new: bool,
    pub size_options: Option<Value>,
    pub topping_options: Option<Value>,
    pub is_available: bool,
    pub is_deliverable: bool,
    pub best_in_store: bool,
    pub delivery_notes: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description.unwrap_or_default(),
            base_price: row.base_price,
            category_id: row.category_id,
            category: row.category_name,
            image: row.image.unwrap_or_default(),
            is_popular: row.is_popular,
            is_new: row.is_new,
            size_options: json_column(row.size_options),
            topping_options: json_column(row.topping_options),
            is_available: row.is_available,
            is_deliverable: row.is_deliverable,
            best_in_store: row.best_in_store,
            delivery_notes: row.delivery_notes,
        }
    }
}

// Categories and toppings

#[derive(Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ToppingRow {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(deserialize_with = "int_bool")]
    pub is_available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topping {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub is_available: bool,
}

impl From<ToppingRow> for Topping {
    fn from(row: ToppingRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            is_available: row.is_available,
        }
    }
}

// Events

#[derive(Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub subtitle: String,
    pub bg: String,
    pub icon: String,
}

// Vouchers

#[derive(Debug, Deserialize)]
pub struct VoucherRow {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub discount_percent: Option<i32>,
    pub discount: Option<i32>,
    pub min_order: i32,
    pub max_discount: Option<i32>,
    pub description: Option<String>,
    pub expires_at: Option<String>,
    pub image_url: Option<String>,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub discount_percent: Option<i32>,
    pub discount: Option<i32>,
    pub min_order: i32,
    pub max_discount: Option<i32>,
    pub description: Option<String>,
    pub expires_at: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
}

impl From<VoucherRow> for Voucher {
    fn from(row: VoucherRow) -> Self {
        Self {
            code: row.code,
            kind: row.kind,
            discount_percent: row.discount_percent,
            discount: row.discount,
            min_order: row.min_order,
            max_discount: row.max_discount,
            description: row.description,
            expires_at: row.expires_at,
            image_url: row.image_url,
            is_active: row.is_active,
        }
    }
}

// Rewards

#[derive(Debug, Deserialize)]
pub struct RewardRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub points_cost: i32,
    pub category: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub description: String,
    pub points_cost: i32,
    pub category: String,
    pub image: String,
}

impl From<RewardRow> for Reward {
    fn from(row: RewardRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description.unwrap_or_default(),
            points_cost: row.points_cost,
            category: row.category,
            image: row.image.unwrap_or_default(),
        }
    }
}

// Stores and delivery zones

#[derive(Debug, Deserialize)]
pub struct StoreRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub opening_time: String,
    pub closing_time: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub opening_time: String,
    pub closing_time: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            address: row.address,
            phone: row.phone,
            opening_time: row.opening_time,
            closing_time: row.closing_time,
            latitude: row.latitude,
            longitude: row.longitude,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeliveryZoneRow {
    pub id: String,
    pub store_id: String,
    pub name: Option<String>,
    pub polygon: Option<String>,
    pub base_fee: f64,
    pub per_km_fee: f64,
    pub max_distance_km: f64,
    pub min_order_amount: f64,
    pub estimated_minutes_base: i32,
    pub estimated_minutes_per_km: i32,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub priority: i32,
    pub created_at: String,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub store_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryZone {
    pub id: String,
    pub store_id: String,
    pub name: Option<String>,
    pub polygon: Option<Value>,
    pub base_fee: f64,
    pub per_km_fee: f64,
    pub max_distance_km: f64,
    pub min_order_amount: f64,
    pub estimated_minutes_base: i32,
    pub estimated_minutes_per_km: i32,
    pub is_active: bool,
    pub priority: i32,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_address: Option<String>,
}

impl From<DeliveryZoneRow> for DeliveryZone {
    fn from(row: DeliveryZoneRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            name: row.name,
            polygon: json_column(row.polygon),
            base_fee: row.base_fee,
            per_km_fee: row.per_km_fee,
            max_distance_km: row.max_distance_km,
            min_order_amount: row.min_order_amount,
            estimated_minutes_base: row.estimated_minutes_base,
            estimated_minutes_per_km: row.estimated_minutes_per_km,
            is_active: row.is_active,
            priority: row.priority,
            created_at: row.created_at,
            store_name: row.store_name,
            store_address: row.store_address,
        }
    }
}

// Moderation

#[derive(Debug, Clone, Deserialize)]
pub struct UserReportRow {
    pub id: String,
    pub reporter_id: Option<String>,
    pub reported_user_id: Option<String>,
    pub reason: String,
    pub details: Option<String>,
    pub status: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<String>,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReport {
    pub id: String,
    pub reporter_id: Option<String>,
    pub reported_user_id: Option<String>,
    pub reason: String,
    pub details: Option<String>,
    pub status: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<String>,
    pub resolution_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_ago: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_violation: Option<bool>,
}

impl From<UserReportRow> for UserReport {
    fn from(row: UserReportRow) -> Self {
        Self {
            id: row.id,
            reporter_id: row.reporter_id,
            reported_user_id: row.reported_user_id,
            reason: row.reason,
            details: row.details,
            status: row.status,
            created_at: row.created_at,
            reviewed_at: row.reviewed_at,
            reviewed_by: row.reviewed_by,
            resolution_notes: row.resolution_notes,
            hours_ago: None,
            sla_violation: None,
        }
    }
}

// System configuration

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfigRow {
    pub key: String,
    pub value: Value,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "int_bool")]
    pub is_locked: bool,
    pub min_value: Option<Value>,
    pub max_value: Option<Value>,
    pub updated_at: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub category: String,
    pub description: Option<String>,
    pub is_locked: bool,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub updated_at: Option<String>,
    pub updated_by: Option<String>,
}

impl From<SystemConfigRow> for ConfigEntry {
    fn from(row: SystemConfigRow) -> Self {
        Self {
            key: row.key,
            value: value_text(&row.value),
            category: row.category.unwrap_or_else(|| "general".to_string()),
            description: row.description,
            is_locked: row.is_locked,
            min_value: row.min_value.as_ref().and_then(numeric),
            max_value: row.max_value.as_ref().and_then(numeric),
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        }
    }
}

/// Text form of a stored or submitted config value; strings stay unquoted.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric reading of a config value, accepting numbers and numeric strings.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct WithId {
        #[serde(default, deserialize_with = "string_or_number")]
        id: Option<String>,
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        let parsed: WithId = serde_json::from_value(json!({"id": 1760000000000u64})).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("1760000000000"));
        let parsed: WithId = serde_json::from_value(json!({"id": " spring-menu "})).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("spring-menu"));
        let parsed: WithId = serde_json::from_value(json!({"id": ""})).unwrap();
        assert_eq!(parsed.id, None);
        let parsed: WithId = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed.id, None);
    }

    #[test]
    fn product_rows_become_camel_case() {
        let row: ProductRow = serde_json::from_value(json!({
            "id": "p1",
            "name": "Latte",
            "description": null,
            "base_price": 45000.0,
            "category_id": "c1",
            "category_name": "Coffee",
            "image": "/images/latte.jpg",
            "is_popular": 1,
            "is_new": 0,
            "size_options": "[\"S\",\"M\",\"L\"]",
            "topping_options": null,
            "is_available": 1,
            "is_deliverable": 1,
            "best_in_store": 0,
            "delivery_notes": null
        }))
        .unwrap();

        let json = serde_json::to_value(Product::from(row)).unwrap();
        assert_eq!(json["basePrice"], 45000.0);
        assert_eq!(json["category"], "Coffee");
        assert_eq!(json["categoryId"], "c1");
        assert_eq!(json["isPopular"], true);
        assert_eq!(json["isNew"], false);
        assert_eq!(json["description"], "");
        assert_eq!(json["sizeOptions"], json!(["S", "M", "L"]));
        assert!(json["toppingOptions"].is_null());
    }

    #[test]
    fn config_values_render_as_text() {
        let row: SystemConfigRow = serde_json::from_value(json!({
            "key": "undo_window_seconds",
            "value": 30,
            "category": null,
            "description": "Grace period",
            "is_locked": 0,
            "min_value": "10",
            "max_value": 60,
            "updated_at": null,
            "updated_by": null
        }))
        .unwrap();

        let entry = ConfigEntry::from(row);
        assert_eq!(entry.value, "30");
        assert_eq!(entry.category, "general");
        assert_eq!(entry.min_value, Some(10.0));
        assert_eq!(entry.max_value, Some(60.0));
    }

    #[test]
    fn numeric_reads_strings_and_numbers() {
        assert_eq!(numeric(&json!("2.5")), Some(2.5));
        assert_eq!(numeric(&json!(7)), Some(7.0));
        assert_eq!(numeric(&json!("fast")), None);
        assert_eq!(numeric(&json!(true)), None);
        assert_eq!(value_text(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
