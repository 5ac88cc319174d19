use chrono::{DateTime, Utc};
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, now, parse_timestamp};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{json_response, query_param};
use crate::monitoring::{build_report, Dashboard, DashboardQuery, OrderRow, ReportRow, ZoneRow};

const ORDER_COLUMNS: &str = "status, source, delivery_option, delivery_fee, \
     delivery_eta_minutes, created_at, finalized_at, pending_until";
const SELECT_ZONES: &str = "SELECT is_active FROM delivery_zones";
const SELECT_REPORTS: &str = "SELECT status, reason, created_at, reviewed_at FROM user_reports";

/// Drops rows created before `start`. The SQL bound is by calendar day so it
/// matches both timestamp forms; this trims the rest.
pub fn within_window(orders: Vec<OrderRow>, start: DateTime<Utc>) -> Vec<OrderRow> {
    orders
        .into_iter()
        .filter(|o| parse_timestamp(&o.created_at).is_some_and(|at| at >= start))
        .collect()
}

pub async fn dashboard(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let query = DashboardQuery::parse(
        query_param(&req, "dashboard")?.as_deref(),
        query_param(&req, "days")?.as_deref(),
    )
    .map_err(ApiError::BadRequest)?;

    let at = now();
    let start = query.window_start(at);
    let d1 = database(&ctx)?;

    let orders = if query.dashboard.needs_orders() {
        let rows = d1
            .prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE created_at >= ?1"))
            .bind(&[start.format("%Y-%m-%d").to_string().into()])?
            .all()
            .await?
            .results::<OrderRow>()?;
        within_window(rows, start)
    } else {
        Vec::new()
    };

    let zones: Vec<ZoneRow> = if query.dashboard.includes(Dashboard::Delivery) {
        d1.prepare(SELECT_ZONES)
            .all()
            .await?
            .results()?
    } else {
        Vec::new()
    };

    let reports: Vec<ReportRow> = if query.dashboard.includes(Dashboard::Reports) {
        d1.prepare(SELECT_REPORTS)
            .all()
            .await?
            .results()?
    } else {
        Vec::new()
    };

    tracing::debug!(
        dashboard = query.dashboard.as_str(),
        days = query.days,
        orders = orders.len(),
        zones = zones.len(),
        reports = reports.len(),
        "monitoring dashboard built"
    );
    json_response(&build_report(query, at, &orders, &zones, &reports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // status doubles as a label here
    fn order(label: &str, created_at: &str) -> OrderRow {
        OrderRow {
            status: label.into(),
            created_at: created_at.into(),
            ..Default::default()
        }
    }

    #[test]
    fn window_keeps_rows_on_or_after_start() {
        let start = Utc.with_ymd_and_hms(2026, 5, 3, 12, 0, 0).unwrap();
        let kept = within_window(
            vec![
                order("early-same-day", "2026-05-03 08:00:00"),
                order("at-start", "2026-05-03T12:00:00.000Z"),
                order("later", "2026-05-09 18:30:00"),
                order("garbage", "n/a"),
            ],
            start,
        );
        let labels: Vec<&str> = kept.iter().map(|o| o.status.as_str()).collect();
        assert_eq!(labels, vec!["at-start", "later"]);
    }

    #[test]
    fn selected_columns_exist_and_fill_the_rows() {
        use serde::de::DeserializeOwned;
        use serde_json::{Map, Value};

        fn check<T: DeserializeOwned>(conn: &rusqlite::Connection, sql: &str) {
            let stmt = conn.prepare(sql).unwrap();
            let row: Map<String, Value> = stmt
                .column_names()
                .into_iter()
                .map(|name| {
                    let value = match name {
                        "is_active" | "delivery_fee" | "delivery_eta_minutes" => Value::from(1),
                        "created_at" => Value::from("2026-05-03 08:00:00"),
                        _ => Value::from("x"),
                    };
                    (name.to_string(), value)
                })
                .collect();
            serde_json::from_value::<T>(Value::Object(row)).unwrap();
        }

        let conn = crate::db::migrated();
        check::<OrderRow>(&conn, &format!("SELECT {ORDER_COLUMNS} FROM orders"));
        check::<ZoneRow>(&conn, SELECT_ZONES);
        check::<ReportRow>(&conn, SELECT_REPORTS);
    }
}
