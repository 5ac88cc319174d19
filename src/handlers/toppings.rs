use serde::Deserialize;
use serde_json::json;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, flag, new_id};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param, require_text};
use crate::models::{string_or_number, Topping, ToppingRow};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToppingInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    #[serde(alias = "is_available")]
    pub is_available: Option<bool>,
}

impl ToppingInput {
    pub fn into_topping(self, id: String) -> ApiResult<Topping> {
        let price = self.price.unwrap_or(0.0);
        if !price.is_finite() || price < 0.0 {
            return Err(ApiError::bad_request("price must be a non-negative number"));
        }
        Ok(Topping {
            id,
            name: require_text(self.name, "name")?,
            price,
            is_available: self.is_available.unwrap_or(true),
        })
    }
}

pub async fn list_toppings(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;
    let toppings: Vec<Topping> = d1
        .prepare("SELECT id, name, price, is_available FROM toppings ORDER BY name ASC")
        .all()
        .await?
        .results::<ToppingRow>()?
        .into_iter()
        .map(Topping::from)
        .collect();
    json_response(&json!({ "toppings": toppings }))
}

pub async fn get_topping(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let topping = d1
        .prepare("SELECT id, name, price, is_available FROM toppings WHERE id = ?1")
        .bind(&[id.into()])?
        .first::<ToppingRow>(None)
        .await?;

    match topping {
        Some(row) => json_response(&json!({ "topping": Topping::from(row) })),
        None => Err(ApiError::not_found("Topping not found")),
    }
}

pub async fn create_topping(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let input: ToppingInput = read_json(&mut req).await?;
    let id = input.id.clone().unwrap_or_else(new_id);
    let topping = input.into_topping(id)?;
    let d1 = database(&ctx)?;

    d1.prepare("INSERT INTO toppings (id, name, price, is_available) VALUES (?1, ?2, ?3, ?4)")
        .bind(&[
            topping.id.as_str().into(),
            topping.name.as_str().into(),
            topping.price.into(),
            flag(topping.is_available),
        ])?
        .run()
        .await
        .map_err(|e| insert_error(e, "Topping"))?;

    created(&json!({ "success": true, "topping": topping }))
}

pub async fn update_topping(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let topping = read_json::<ToppingInput>(&mut req).await?.into_topping(id)?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare(
            "UPDATE toppings SET name = ?1, price = ?2, is_available = ?3 WHERE id = ?4 \
             RETURNING id, name, price, is_available",
        )
        .bind(&[
            topping.name.as_str().into(),
            topping.price.into(),
            flag(topping.is_available),
            topping.id.as_str().into(),
        ])?
        .first::<ToppingRow>(None)
        .await?;

    match updated {
        Some(row) => json_response(&json!({ "success": true, "topping": Topping::from(row) })),
        None => Err(ApiError::not_found("Topping not found")),
    }
}

pub async fn delete_topping(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM toppings WHERE id = ?1 RETURNING id")
        .bind(&[id.into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Topping not found")),
    }
}
