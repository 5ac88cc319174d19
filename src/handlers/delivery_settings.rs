use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use wasm_bindgen::JsValue;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, set_clause, truncate_chars, SqlValue};
use crate::error::{read_json, ApiResult};
use crate::handlers::products::SELECT_PRODUCTS;
use crate::handlers::{batch_items, json_response, query_param, BatchOutcome};
use crate::models::{string_or_number, Product, ProductRow};

const MAX_NOTES_CHARS: usize = 500;
const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPatch {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(alias = "is_deliverable")]
    pub is_deliverable: Option<bool>,
    #[serde(alias = "best_in_store")]
    pub best_in_store: Option<bool>,
    /// Outer `None` when absent, `Some(None)` when sent as null.
    #[serde(default, alias = "delivery_notes", deserialize_with = "present")]
    pub delivery_notes: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl DeliveryPatch {
    /// Product id plus the column assignments this item asks for.
    pub fn columns(self) -> std::result::Result<(String, Vec<(&'static str, SqlValue)>), String> {
        let id = self.id.ok_or_else(|| "Product ID is required".to_string())?;

        let mut columns = Vec::new();
        if let Some(deliverable) = self.is_deliverable {
            columns.push(("is_deliverable", SqlValue::from(deliverable)));
        }
        if let Some(best) = self.best_in_store {
            columns.push(("best_in_store", SqlValue::from(best)));
        }
        if let Some(notes) = self.delivery_notes {
            let notes = notes
                .map(|n| truncate_chars(n.trim(), MAX_NOTES_CHARS))
                .filter(|n| !n.is_empty());
            columns.push(("delivery_notes", notes.map_or(SqlValue::Null, SqlValue::Text)));
        }

        if columns.is_empty() {
            return Err(format!("No valid updates for product {id}"));
        }
        Ok((id, columns))
    }
}

pub fn group_by_category(products: &[Product]) -> BTreeMap<String, Vec<Product>> {
    let mut groups: BTreeMap<String, Vec<Product>> = BTreeMap::new();
    for product in products {
        let name = product
            .category
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        groups.entry(name).or_default().push(product.clone());
    }
    groups
}

fn truthy(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("true") | Some("1"))
}

pub async fn list_delivery_settings(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let d1 = database(&ctx)?;

    let mut sql = SELECT_PRODUCTS.to_string();
    let mut params: Vec<JsValue> = Vec::new();
    if let Some(category_id) = query_param(&req, "categoryId")? {
        params.push(category_id.into());
        sql.push_str(&format!(" AND p.category_id = ?{}", params.len()));
    }
    if truthy(query_param(&req, "deliverableOnly")?) {
        sql.push_str(" AND p.is_deliverable = 1");
    }
    if truthy(query_param(&req, "bestInStoreOnly")?) {
        sql.push_str(" AND p.best_in_store = 1");
    }
    sql.push_str(" ORDER BY c.name ASC, p.name ASC");

    let products: Vec<Product> = d1
        .prepare(&sql)
        .bind(&params)?
        .all()
        .await?
        .results::<ProductRow>()?
        .into_iter()
        .map(Product::from)
        .collect();

    let by_category = group_by_category(&products);
    json_response(&json!({
        "products": products,
        "byCategory": by_category,
        "total": products.len(),
    }))
}

pub async fn update_delivery_settings(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let admin = require_admin(&req, &ctx)?;
    let body: Value = read_json(&mut req).await?;
    let d1 = database(&ctx)?;

    let mut outcome = BatchOutcome::default();
    for item in batch_items(body) {
        let result = match serde_json::from_value::<DeliveryPatch>(item) {
            Ok(patch) => apply(&d1, patch).await,
            Err(e) => Err(format!("Invalid item: {e}")),
        };
        outcome.record(result);
    }

    tracing::info!(
        admin = %admin.id,
        updated = outcome.updated,
        failed = outcome.failed,
        "delivery settings updated"
    );
    json_response(&outcome)
}

fn write_failure(id: &str, error: impl std::fmt::Display) -> String {
    format!("Failed to update product {id}: {error}")
}

async fn apply(d1: &D1Database, patch: DeliveryPatch) -> std::result::Result<(), String> {
    let (id, columns) = patch.columns()?;
    let sql = format!(
        "UPDATE products SET {} WHERE id = ?{} RETURNING id",
        set_clause(&columns),
        columns.len() + 1
    );
    let mut params: Vec<JsValue> = columns.into_iter().map(|(_, v)| v.into()).collect();
    params.push(id.as_str().into());

    let statement = d1.prepare(&sql).bind(&params).map_err(|e| write_failure(&id, e))?;
    match statement.first::<String>(Some("id")).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(format!("Product {id} not found")),
        Err(e) => {
            tracing::error!(product = %id, error = %e, "delivery settings update failed");
            Err(write_failure(&id, e))
        }
    }
}
