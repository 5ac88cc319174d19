use serde::Deserialize;
use serde_json::json;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::database;
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param, require_text};
use crate::models::{string_or_number, Reward, RewardRow};

const REWARD_COLUMNS: &str = "id, name, description, points_cost, category, image";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "points_cost")]
    pub points_cost: Option<i32>,
    pub category: Option<String>,
    pub image: Option<String>,
}

impl RewardInput {
    pub fn into_reward(self, id: Option<String>) -> ApiResult<Reward> {
        let name = require_text(self.name, "name")?;
        let points_cost = self
            .points_cost
            .ok_or_else(|| ApiError::bad_request("pointsCost is required"))?;
        if points_cost < 0 {
            return Err(ApiError::bad_request("pointsCost must not be negative"));
        }
        let id = id.or(self.id).unwrap_or_else(|| slugify(&name));
        if id.is_empty() {
            return Err(ApiError::bad_request("name must contain letters or digits"));
        }

        Ok(Reward {
            id,
            name,
            description: self.description.unwrap_or_default().trim().to_string(),
            points_cost,
            category: self
                .category
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "drink".to_string()),
            image: self.image.unwrap_or_default(),
        })
    }
}

/// "Free Iced Latte" -> "free-iced-latte"
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub async fn list_rewards(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;
    let rewards: Vec<Reward> = d1
        .prepare(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards ORDER BY points_cost ASC, name ASC"
        ))
        .all()
        .await?
        .results::<RewardRow>()?
        .into_iter()
        .map(Reward::from)
        .collect();
    json_response(&json!({ "rewards": rewards }))
}

pub async fn get_reward(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let reward = d1
        .prepare(&format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"))
        .bind(&[id.into()])?
        .first::<RewardRow>(None)
        .await?;

    match reward {
        Some(row) => json_response(&json!({ "reward": Reward::from(row) })),
        None => Err(ApiError::not_found("Reward not found")),
    }
}

pub async fn create_reward(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let reward = read_json::<RewardInput>(&mut req).await?.into_reward(None)?;
    let d1 = database(&ctx)?;

    d1.prepare(&format!(
        "INSERT INTO rewards ({REWARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    ))
    .bind(&[
        reward.id.as_str().into(),
        reward.name.as_str().into(),
        reward.description.as_str().into(),
        reward.points_cost.into(),
        reward.category.as_str().into(),
        reward.image.as_str().into(),
    ])?
    .run()
    .await
    .map_err(|e| insert_error(e, "Reward"))?;

    created(&json!({ "success": true, "reward": reward }))
}

pub async fn update_reward(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let reward = read_json::<RewardInput>(&mut req).await?.into_reward(Some(id))?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare(&format!(
            "UPDATE rewards SET name = ?1, description = ?2, points_cost = ?3, category = ?4, \
             image = ?5 WHERE id = ?6 RETURNING {REWARD_COLUMNS}"
        ))
        .bind(&[
            reward.name.as_str().into(),
            reward.description.as_str().into(),
            reward.points_cost.into(),
            reward.category.as_str().into(),
            reward.image.as_str().into(),
            reward.id.as_str().into(),
        ])?
        .first::<RewardRow>(None)
        .await?;

    match updated {
        Some(row) => json_response(&json!({ "success": true, "reward": Reward::from(row) })),
        None => Err(ApiError::not_found("Reward not found")),
    }
}

pub async fn delete_reward(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM rewards WHERE id = ?1 RETURNING id")
        .bind(&[id.into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Reward not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_name() {
        assert_eq!(slugify("Free Iced  Latte"), "free-iced-latte");
        assert_eq!(slugify("10% Off!"), "10-off");
        assert_eq!(slugify("  "), "");
    }

    #[test]
    fn id_defaults_to_slug() {
        let input: RewardInput =
            serde_json::from_value(json!({"name": "Free Croissant", "pointsCost": 120})).unwrap();
        let reward = input.into_reward(None).unwrap();
        assert_eq!(reward.id, "free-croissant");
        assert_eq!(reward.category, "drink");
        assert_eq!(serde_json::to_value(&reward).unwrap()["pointsCost"], 120);
    }

    #[test]
    fn path_id_wins_on_update() {
        let input: RewardInput = serde_json::from_value(
            json!({"id": "other", "name": "Mug", "pointsCost": 900, "category": "Merch"}),
        )
        .unwrap();
        let reward = input.into_reward(Some("mug-2024".into())).unwrap();
        assert_eq!(reward.id, "mug-2024");
        assert_eq!(reward.category, "merch");
    }

    #[test]
    fn points_cost_is_required_and_non_negative() {
        let missing: RewardInput = serde_json::from_value(json!({"name": "Mug"})).unwrap();
        assert!(missing.into_reward(None).is_err());
        let negative: RewardInput =
            serde_json::from_value(json!({"name": "Mug", "pointsCost": -1})).unwrap();
        assert!(negative.into_reward(None).is_err());
    }
}
