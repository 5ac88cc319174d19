use serde::Deserialize;
use serde_json::{json, Value};
use wasm_bindgen::JsValue;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, flag, new_id, nullable};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param, query_param, require_text};
use crate::models::{string_or_number, Product, ProductRow};

pub(crate) const SELECT_PRODUCTS: &str = "SELECT p.*, c.name AS category_name FROM products p \
     LEFT JOIN categories c ON c.id = p.category_id WHERE 1=1";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "price", alias = "base_price")]
    pub base_price: Option<f64>,
    #[serde(default, alias = "category_id", deserialize_with = "string_or_number")]
    pub category_id: Option<String>,
    pub image: Option<String>,
    #[serde(alias = "is_popular")]
    pub is_popular: Option<bool>,
    #[serde(alias = "is_new")]
    pub is_new: Option<bool>,
    #[serde(alias = "size_options")]
    pub size_options: Option<Value>,
    #[serde(alias = "topping_options")]
    pub topping_options: Option<Value>,
    #[serde(alias = "is_available")]
    pub is_available: Option<bool>,
    #[serde(alias = "is_deliverable")]
    pub is_deliverable: Option<bool>,
    #[serde(alias = "best_in_store")]
    pub best_in_store: Option<bool>,
    #[serde(alias = "delivery_notes")]
    pub delivery_notes: Option<String>,
}

/// A product payload that passed validation, ready to bind.
#[derive(Debug, PartialEq)]
pub struct ProductFields {
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub category_id: Option<String>,
    pub image: String,
    pub is_popular: bool,
    pub is_new: bool,
    pub size_options: Option<String>,
    pub topping_options: Option<String>,
    pub is_available: bool,
    pub is_deliverable: bool,
    pub best_in_store: bool,
    pub delivery_notes: Option<String>,
}

impl ProductInput {
    pub fn validate(self) -> ApiResult<ProductFields> {
        let name = require_text(self.name, "name")?;
        let base_price = self
            .base_price
            .ok_or_else(|| ApiError::bad_request("basePrice is required"))?;
        if !base_price.is_finite() || base_price < 0.0 {
            return Err(ApiError::bad_request("basePrice must be a non-negative number"));
        }
        let options = |value: Option<Value>| value.filter(|v| !v.is_null()).map(|v| v.to_string());

        Ok(ProductFields {
            name,
            description: self.description.unwrap_or_default().trim().to_string(),
            base_price,
            category_id: self.category_id,
            image: self.image.unwrap_or_default(),
            is_popular: self.is_popular.unwrap_or(false),
            is_new: self.is_new.unwrap_or(false),
            size_options: options(self.size_options),
            topping_options: options(self.topping_options),
            is_available: self.is_available.unwrap_or(true),
            is_deliverable: self.is_deliverable.unwrap_or(true),
            best_in_store: self.best_in_store.unwrap_or(false),
            delivery_notes: self.delivery_notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

impl ProductFields {
    fn bindings(self) -> Vec<JsValue> {
        vec![
            self.name.into(),
            self.description.into(),
            self.base_price.into(),
            nullable(self.category_id),
            self.image.into(),
            flag(self.is_popular),
            flag(self.is_new),
            nullable(self.size_options),
            nullable(self.topping_options),
            flag(self.is_available),
            flag(self.is_deliverable),
            flag(self.best_in_store),
            nullable(self.delivery_notes),
        ]
    }
}

async fn fetch_product(d1: &D1Database, id: &str) -> ApiResult<Option<Product>> {
    let sql = format!("{SELECT_PRODUCTS} AND p.id = ?1");
    let row = d1
        .prepare(&sql)
        .bind(&[id.into()])?
        .first::<ProductRow>(None)
        .await?;
    Ok(row.map(Product::from))
}

pub async fn list_products(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;

    let mut sql = SELECT_PRODUCTS.to_string();
    let mut params: Vec<JsValue> = Vec::new();

    if let Some(category_id) = query_param(&req, "categoryId")? {
        params.push(category_id.into());
        sql.push_str(&format!(" AND p.category_id = ?{}", params.len()));
    }
    if let Some(q) = query_param(&req, "q")? {
        params.push(format!("%{q}%").into());
        let n = params.len();
        sql.push_str(&format!(" AND (p.name LIKE ?{n} OR p.description LIKE ?{n})"));
    }
    sql.push_str(" ORDER BY p.name ASC");

    let rows = d1.prepare(&sql).bind(&params)?.all().await?.results::<ProductRow>()?;
    let products: Vec<Product> = rows.into_iter().map(Product::from).collect();
    json_response(&json!({ "products": products }))
}

pub async fn get_product(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    match fetch_product(&d1, &id).await? {
        Some(product) => json_response(&json!({ "product": product })),
        None => Err(ApiError::not_found("Product not found")),
    }
}

pub async fn create_product(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let input: ProductInput = read_json(&mut req).await?;
    let id = input.id.clone().unwrap_or_else(new_id);
    let fields = input.validate()?;
    let d1 = database(&ctx)?;

    let mut params = vec![JsValue::from(id.as_str())];
    params.extend(fields.bindings());

    d1.prepare(
        "INSERT INTO products (id, name, description, base_price, category_id, image, is_popular, is_new, \
         size_options, topping_options, is_available, is_deliverable, best_in_store, delivery_notes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )
    .bind(&params)?
    .run()
    .await
    .map_err(|e| insert_error(e, "Product"))?;

    tracing::info!(product = %id, "product created");
    let product = fetch_product(&d1, &id)
        .await?
        .ok_or_else(|| ApiError::Database("Created product could not be read back".into()))?;
    created(&json!({ "success": true, "product": product }))
}

pub async fn update_product(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let fields = read_json::<ProductInput>(&mut req).await?.validate()?;
    let d1 = database(&ctx)?;

    let mut params = fields.bindings();
    params.push(id.as_str().into());

    let updated = d1
        .prepare(
            "UPDATE products SET name=?1, description=?2, base_price=?3, category_id=?4, image=?5, \
             is_popular=?6, is_new=?7, size_options=?8, topping_options=?9, is_available=?10, \
             is_deliverable=?11, best_in_store=?12, delivery_notes=?13 WHERE id=?14 RETURNING id",
        )
        .bind(&params)?
        .first::<String>(Some("id"))
        .await?;

    if updated.is_none() {
        return Err(ApiError::not_found("Product not found"));
    }

    let product = fetch_product(&d1, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    json_response(&json!({ "success": true, "product": product }))
}

pub async fn delete_product(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM products WHERE id = ?1 RETURNING id")
        .bind(&[id.as_str().into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Product not found")),
    }
}
