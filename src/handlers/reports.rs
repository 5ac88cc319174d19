use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use wasm_bindgen::JsValue;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, now, nullable, parse_timestamp, timestamp, truncate_chars};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{json_response, query_param};
use crate::models::{string_or_number, UserReport, UserReportRow};
use crate::monitoring::{breaches_sla, hours_between, round_to};

pub const STATUSES: [&str; 4] = ["pending", "reviewed", "actioned", "dismissed"];
const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;
const MAX_NOTES_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "resolution_notes")]
    pub resolution_notes: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct Review {
    pub id: String,
    pub status: String,
    pub notes: Option<String>,
}

impl ReportUpdate {
    pub fn into_review(self) -> ApiResult<Review> {
        let id = self
            .id
            .ok_or_else(|| ApiError::bad_request("Report ID is required"))?;
        let status = self
            .status
            .map(|s| s.trim().to_lowercase())
            .filter(|s| STATUSES.contains(&s.as_str()))
            .ok_or_else(|| {
                ApiError::bad_request(format!("Invalid status. Valid options: {}", STATUSES.join(", ")))
            })?;
        let notes = self
            .resolution_notes
            .map(|n| truncate_chars(n.trim(), MAX_NOTES_CHARS))
            .filter(|n| !n.is_empty());
        Ok(Review { id, status, notes })
    }
}

#[derive(Debug, PartialEq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn parse(limit: Option<&str>, offset: Option<&str>) -> Self {
        let limit = limit
            .and_then(|l| l.parse::<u32>().ok())
            .filter(|l| *l > 0)
            .map_or(DEFAULT_LIMIT, |l| l.min(MAX_LIMIT));
        let offset = offset.and_then(|o| o.parse::<u32>().ok()).unwrap_or(0);
        Self { limit, offset }
    }
}

/// Adds the age in hours and the SLA flag; only pending reports can breach.
pub fn annotate(row: UserReportRow, now: DateTime<Utc>) -> UserReport {
    let created = parse_timestamp(&row.created_at);
    let pending = row.status == "pending";
    let mut report = UserReport::from(row);
    report.hours_ago = created.map(|at| round_to(hours_between(at, now), 1));
    report.sla_violation = Some(pending && created.is_some_and(|at| breaches_sla(at, now)));
    report
}

#[derive(Deserialize)]
struct Count {
    total: u32,
}

#[derive(Deserialize)]
struct Created {
    created_at: String,
}

pub async fn list_reports(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let d1 = database(&ctx)?;
    let page = Page::parse(
        query_param(&req, "limit")?.as_deref(),
        query_param(&req, "offset")?.as_deref(),
    );

    let status = query_param(&req, "status")?.filter(|s| STATUSES.contains(&s.as_str()));
    let (filter, mut params): (&str, Vec<JsValue>) = match &status {
        Some(status) => (" WHERE status = ?1", vec![status.as_str().into()]),
        None => ("", Vec::new()),
    };

    let total = d1
        .prepare(&format!("SELECT COUNT(*) AS total FROM user_reports{filter}"))
        .bind(&params)?
        .first::<Count>(None)
        .await?
        .map_or(0, |c| c.total);

    let sql = format!(
        "SELECT * FROM user_reports{filter} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
        params.len() + 1,
        params.len() + 2
    );
    params.push(page.limit.into());
    params.push(page.offset.into());

    let at = now();
    let reports: Vec<UserReport> = d1
        .prepare(&sql)
        .bind(&params)?
        .all()
        .await?
        .results::<UserReportRow>()?
        .into_iter()
        .map(|row| annotate(row, at))
        .collect();

    let pending: Vec<Created> = d1
        .prepare("SELECT created_at FROM user_reports WHERE status = 'pending'")
        .all()
        .await?
        .results()?;
    let sla_violations = pending
        .iter()
        .filter_map(|r| parse_timestamp(&r.created_at))
        .filter(|created| breaches_sla(*created, at))
        .count();

    let has_more = page.offset as usize + reports.len() < total as usize;
    json_response(&json!({
        "reports": reports,
        "pagination": {
            "total": total,
            "limit": page.limit,
            "offset": page.offset,
            "hasMore": has_more,
        },
        "stats": {
            "pending": pending.len(),
            "slaViolations": sla_violations,
        },
    }))
}

pub async fn review_report(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let admin = require_admin(&req, &ctx)?;
    let review = read_json::<ReportUpdate>(&mut req).await?.into_review()?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare(
            "UPDATE user_reports SET status = ?1, reviewed_at = ?2, reviewed_by = ?3, \
             resolution_notes = COALESCE(?4, resolution_notes) WHERE id = ?5 RETURNING *",
        )
        .bind(&[
            review.status.as_str().into(),
            timestamp(now()).into(),
            admin.id.as_str().into(),
            nullable(review.notes),
            review.id.as_str().into(),
        ])?
        .first::<UserReportRow>(None)
        .await?;

    match updated {
        Some(row) => {
            tracing::info!(report = %review.id, status = %review.status, admin = %admin.id, "report reviewed");
            json_response(&json!({ "success": true, "report": UserReport::from(row) }))
        }
        None => Err(ApiError::not_found("Report not found")),
    }
}
