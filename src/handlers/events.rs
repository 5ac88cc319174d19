use serde::Deserialize;
use serde_json::json;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, new_id};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param, require_text};
use crate::models::{string_or_number, Event};

const EVENT_COLUMNS: &str = "id, type, title, subtitle, bg, icon";

#[derive(Debug, Deserialize)]
pub struct EventInput {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub bg: Option<String>,
    pub icon: Option<String>,
}

impl EventInput {
    pub fn into_event(self, id: String) -> ApiResult<Event> {
        let or = |value: Option<String>, default: &str| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Ok(Event {
            id,
            title: require_text(self.title, "title")?,
            kind: or(self.kind, "Event"),
            subtitle: self.subtitle.unwrap_or_default().trim().to_string(),
            // empty bg lets the app cycle its own theme
            bg: self.bg.unwrap_or_default().trim().to_string(),
            icon: or(self.icon, "Calendar"),
        })
    }
}

pub async fn list_events(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;
    let events = d1
        .prepare(&format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY rowid DESC"))
        .all()
        .await?
        .results::<Event>()?;
    json_response(&json!({ "events": events }))
}

pub async fn get_event(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let event = d1
        .prepare(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"))
        .bind(&[id.into()])?
        .first::<Event>(None)
        .await?;

    match event {
        Some(event) => json_response(&json!({ "event": event })),
        None => Err(ApiError::not_found("Event not found")),
    }
}

pub async fn create_event(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let input: EventInput = read_json(&mut req).await?;
    let id = input.id.clone().unwrap_or_else(new_id);
    let event = input.into_event(id)?;
    let d1 = database(&ctx)?;

    d1.prepare(&format!(
        "INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    ))
    .bind(&[
        event.id.as_str().into(),
        event.kind.as_str().into(),
        event.title.as_str().into(),
        event.subtitle.as_str().into(),
        event.bg.as_str().into(),
        event.icon.as_str().into(),
    ])?
    .run()
    .await
    .map_err(|e| insert_error(e, "Event"))?;

    created(&json!({ "success": true, "event": event }))
}

pub async fn update_event(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let event = read_json::<EventInput>(&mut req).await?.into_event(id)?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare(&format!(
            "UPDATE events SET type = ?1, title = ?2, subtitle = ?3, bg = ?4, icon = ?5 \
             WHERE id = ?6 RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&[
            event.kind.as_str().into(),
            event.title.as_str().into(),
            event.subtitle.as_str().into(),
            event.bg.as_str().into(),
            event.icon.as_str().into(),
            event.id.as_str().into(),
        ])?
        .first::<Event>(None)
        .await?;

    match updated {
        Some(event) => json_response(&json!({ "success": true, "event": event })),
        None => Err(ApiError::not_found("Event not found")),
    }
}

pub async fn delete_event(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let id = path_param(&ctx, "id")?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM events WHERE id = ?1 RETURNING id")
        .bind(&[id.into()])?
        .first::<String>(Some("id"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Event not found")),
    }
}
