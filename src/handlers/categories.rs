use serde::Deserialize;
use serde_json::json;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, new_id};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param, require_text};
use crate::models::{string_or_number, Category};

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl CategoryInput {
    pub fn into_category(self, id: String) -> ApiResult<Category> {
        Ok(Category {
            id,
            name: require_text(self.name, "name")?,
            kind: self
                .kind
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| "menu".to_string()),
        })
    }
}

pub async fn list_categories(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;
    let categories = d1
        .prepare("SELECT id, name, type FROM categories ORDER BY name ASC")
        .all()
        .await?
        .results::<Category>()?;
    json_response(&json!({ "categories": categories }))
}

pub async fn get_category(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let category = d1
        .prepare("SELECT id, name, type FROM categories WHERE id = ?1")
        .bind(&[id.into()])?
        .first::<Category>(None)
        .await?;

    match category {
        Some(category) => json_response(&json!({ "category": category })),
        None => Err(ApiError::not_found("Category not found")),
    }
}

pub async fn create_category(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let input: CategoryInput = read_json(&mut req).await?;
    let id = input.id.clone().unwrap_or_else(new_id);
    let category = input.into_category(id)?;
    let d1 = database(&ctx)?;

    d1.prepare("INSERT INTO categories (id, name, type) VALUES (?1, ?2, ?3)")
        .bind(&[
            category.id.as_str().into(),
            category.name.as_str().into(),
            category.kind.as_str().into(),
        ])?
        .run()
        .await
        .map_err(|e| insert_error(e, "Category"))?;

    created(&json!({ "success": true, "category": category }))
}

pub async fn update_category(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let category = read_json::<CategoryInput>(&mut req).await?.into_category(id)?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare("UPDATE categories SET name = ?1, type = ?2 WHERE id = ?3 RETURNING id, name, type")
        .bind(&[
            category.name.as_str().into(),
            category.kind.as_str().into(),
            category.id.as_str().into(),
        ])?
        .first::<Category>(None)
        .await?;

    match updated {
        Some(category) => json_response(&json!({ "success": true, "category": category })),
        None => Err(ApiError::not_found("Category not found")),
    }
}

/// Products keep their `category_id`; the schema has no cascade.
const DELETE_CATEGORY: &str = "DELETE FROM categories WHERE id = ?1 RETURNING id";

pub async fn delete_category(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare(DELETE_CATEGORY)
        .bind(&[id.into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Category not found")),
    }
}
