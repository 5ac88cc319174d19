use serde::Deserialize;
use serde_json::{json, Value};
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, flag, new_id, nullable};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param, require_text};
use crate::models::{string_or_number, Store, StoreRow};

const STORE_COLUMNS: &str =
    "id, name, address, phone, opening_time, closing_time, latitude, longitude, is_active";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "opening_time")]
    pub opening_time: Option<String>,
    #[serde(alias = "closing_time")]
    pub closing_time: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
}

/// Read responses carry only the resource; `success` is for writes.
fn store_list(stores: &[Store]) -> Value {
    json!({ "stores": stores })
}

fn store_body(store: &Store) -> Value {
    json!({ "store": store })
}

impl StoreInput {
    pub fn into_store(self, id: String) -> ApiResult<Store> {
        if self.latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
            return Err(ApiError::bad_request("latitude must be between -90 and 90"));
        }
        if self.longitude.is_some_and(|lng| !(-180.0..=180.0).contains(&lng)) {
            return Err(ApiError::bad_request("longitude must be between -180 and 180"));
        }
        let text = |value: Option<String>| value.unwrap_or_default().trim().to_string();

        Ok(Store {
            id,
            name: require_text(self.name, "name")?,
            address: text(self.address),
            phone: text(self.phone),
            opening_time: text(self.opening_time),
            closing_time: text(self.closing_time),
            latitude: self.latitude,
            longitude: self.longitude,
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

pub async fn list_stores(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;
    let stores: Vec<Store> = d1
        .prepare(&format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY name ASC"))
        .all()
        .await?
        .results::<StoreRow>()?
        .into_iter()
        .map(Store::from)
        .collect();
    json_response(&store_list(&stores))
}

pub async fn get_store(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let store = d1
        .prepare(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = ?1"))
        .bind(&[id.into()])?
        .first::<StoreRow>(None)
        .await?;

    match store {
        Some(row) => json_response(&store_body(&Store::from(row))),
        None => Err(ApiError::not_found("Store not found")),
    }
}

pub async fn create_store(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let input: StoreInput = read_json(&mut req).await?;
    let id = input.id.clone().unwrap_or_else(new_id);
    let store = input.into_store(id)?;
    let d1 = database(&ctx)?;

    d1.prepare(&format!(
        "INSERT INTO stores ({STORE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ))
    .bind(&[
        store.id.as_str().into(),
        store.name.as_str().into(),
        store.address.as_str().into(),
        store.phone.as_str().into(),
        store.opening_time.as_str().into(),
        store.closing_time.as_str().into(),
        nullable(store.latitude),
        nullable(store.longitude),
        flag(store.is_active),
    ])?
    .run()
    .await
    .map_err(|e| insert_error(e, "Store"))?;

    tracing::info!(store = %store.id, "store created");
    created(&json!({ "success": true, "store": store }))
}

pub async fn update_store(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let store = read_json::<StoreInput>(&mut req).await?.into_store(id)?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare(&format!(
            "UPDATE stores SET name = ?1, address = ?2, phone = ?3, opening_time = ?4, \
             closing_time = ?5, latitude = ?6, longitude = ?7, is_active = ?8 \
             WHERE id = ?9 RETURNING {STORE_COLUMNS}"
        ))
        .bind(&[
            store.name.as_str().into(),
            store.address.as_str().into(),
            store.phone.as_str().into(),
            store.opening_time.as_str().into(),
            store.closing_time.as_str().into(),
            nullable(store.latitude),
            nullable(store.longitude),
            flag(store.is_active),
            store.id.as_str().into(),
        ])?
        .first::<StoreRow>(None)
        .await?;

    match updated {
        Some(row) => json_response(&json!({ "success": true, "store": Store::from(row) })),
        None => Err(ApiError::not_found("Store not found")),
    }
}

pub async fn delete_store(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM stores WHERE id = ?1 RETURNING id")
        .bind(&[id.into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Store not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_form_is_accepted() {
        let input: StoreInput = serde_json::from_value(json!({
            "name": "Riverside",
            "address": "12 Bach Dang",
            "phone": "0901 234 567",
            "opening_time": "07:00",
            "closing_time": "22:00",
            "latitude": 16.0678,
            "longitude": 108.2208,
            "is_active": false
        }))
        .unwrap();
        let store = input.into_store("s1".into()).unwrap();
        assert_eq!(store.opening_time, "07:00");
        assert!(!store.is_active);

        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["closingTime"], "22:00");
        assert_eq!(json["latitude"], 16.0678);
    }

    #[test]
    fn coordinates_are_optional_but_bounded() {
        let input: StoreInput = serde_json::from_value(json!({"name": "Kiosk"})).unwrap();
        let store = input.into_store("s2".into()).unwrap();
        assert_eq!(store.latitude, None);
        assert!(store.is_active);

        let input: StoreInput =
            serde_json::from_value(json!({"name": "Kiosk", "latitude": 91.0})).unwrap();
        assert!(input.into_store("s3".into()).is_err());
    }

    #[test]
    fn read_bodies_hold_only_the_resource() {
        let input: StoreInput = serde_json::from_value(json!({"name": "Kiosk"})).unwrap();
        let store = input.into_store("s4".into()).unwrap();

        let list = store_list(std::slice::from_ref(&store));
        let keys: Vec<&String> = list.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["stores"]);
        assert_eq!(list["stores"][0]["id"], "s4");

        let single = store_body(&store);
        let keys: Vec<&String> = single.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["store"]);
        assert_eq!(single["store"]["name"], "Kiosk");
    }
}
