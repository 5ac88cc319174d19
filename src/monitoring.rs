//! Monitoring dashboard aggregation.
//!
//! Every summary is computed from rows the handler has already fetched, so
//! this module is pure and takes `now` explicitly.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{int_bool, parse_timestamp};

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const MAX_WINDOW_DAYS: i64 = 365;
pub const MAX_UNDO_SECONDS: f64 = 30.0;
pub const REPORT_SLA_HOURS: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dashboard {
    All,
    Undo,
    Delivery,
    Ai,
    Reports,
}

impl Dashboard {
    pub fn as_str(self) -> &'static str {
        match self {
            Dashboard::All => "all",
            Dashboard::Undo => "undo",
            Dashboard::Delivery => "delivery",
            Dashboard::Ai => "ai",
            Dashboard::Reports => "reports",
        }
    }

    pub fn includes(self, section: Dashboard) -> bool {
        self == Dashboard::All || self == section
    }

    pub fn needs_orders(self) -> bool {
        self.includes(Dashboard::Undo)
            || self.includes(Dashboard::Delivery)
            || self.includes(Dashboard::Ai)
    }
}

impl FromStr for Dashboard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Dashboard::All),
            "undo" => Ok(Dashboard::Undo),
            "delivery" => Ok(Dashboard::Delivery),
            "ai" => Ok(Dashboard::Ai),
            "reports" => Ok(Dashboard::Reports),
            other => Err(format!(
                "Invalid dashboard '{other}'. Valid options: all, undo, delivery, ai, reports"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardQuery {
    pub dashboard: Dashboard,
    pub days: i64,
}

impl DashboardQuery {
    pub fn parse(dashboard: Option<&str>, days: Option<&str>) -> Result<Self, String> {
        let dashboard = match dashboard.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.parse()?,
            None => Dashboard::All,
        };
        let days = match days.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|d| (1..=MAX_WINDOW_DAYS).contains(d))
                .ok_or_else(|| format!("days must be an integer between 1 and {MAX_WINDOW_DAYS}"))?,
            None => DEFAULT_WINDOW_DAYS,
        };
        Ok(Self { dashboard, days })
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRow {
    pub status: String,
    pub source: Option<String>,
    pub delivery_option: Option<String>,
    pub delivery_fee: Option<f64>,
    pub delivery_eta_minutes: Option<f64>,
    pub created_at: String,
    pub finalized_at: Option<String>,
    pub pending_until: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneRow {
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRow {
    pub status: String,
    pub reason: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoUsage {
    pub total_orders: usize,
    pub cancelled_within_window: usize,
    pub undo_rate: f64,
    pub avg_time_to_undo_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPerformance {
    pub total_delivery_orders: usize,
    pub completed_delivery_orders: usize,
    pub avg_delivery_fee: f64,
    pub avg_eta_minutes: f64,
    pub active_zones: usize,
    pub total_zones: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceCounts {
    pub ai_suggested: usize,
    pub reorder: usize,
    pub favorite: usize,
    pub manual: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAdoption {
    pub total_orders: usize,
    pub by_source: SourceCounts,
    pub ai_suggested_percent: f64,
    pub quick_order_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub reviewed: usize,
    pub actioned: usize,
    pub dismissed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportsQueue {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_reason: BTreeMap<String, usize>,
    pub avg_resolution_hours: f64,
    pub sla_violations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub days: i64,
    pub start_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub dashboard: &'static str,
    pub period: Period,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_usage: Option<UndoUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_performance: Option<DeliveryPerformance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_adoption: Option<AiAdoption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports_queue: Option<ReportsQueue>,
}

pub fn build_report(
    query: DashboardQuery,
    now: DateTime<Utc>,
    orders: &[OrderRow],
    zones: &[ZoneRow],
    reports: &[ReportRow],
) -> DashboardReport {
    let dashboard = query.dashboard;
    DashboardReport {
        dashboard: dashboard.as_str(),
        period: Period {
            days: query.days,
            start_date: crate::db::timestamp(query.window_start(now)),
        },
        undo_usage: dashboard
            .includes(Dashboard::Undo)
            .then(|| undo_usage(orders)),
        delivery_performance: dashboard
            .includes(Dashboard::Delivery)
            .then(|| delivery_performance(orders, zones)),
        ai_adoption: dashboard.includes(Dashboard::Ai).then(|| ai_adoption(orders)),
        reports_queue: dashboard
            .includes(Dashboard::Reports)
            .then(|| reports_queue(reports, now)),
    }
}

pub fn undo_usage(orders: &[OrderRow]) -> UndoUsage {
    let cancelled: Vec<&OrderRow> = orders
        .iter()
        .filter(|o| o.status == "cancelled" && o.pending_until.is_some())
        .collect();

    let undo_seconds: Vec<f64> = cancelled
        .iter()
        .filter_map(|o| {
            let created = parse_timestamp(&o.created_at)?;
            let finalized = parse_timestamp(o.finalized_at.as_deref()?)?;
            Some((finalized - created).num_milliseconds() as f64 / 1000.0)
        })
        .filter(|secs| *secs > 0.0 && *secs <= MAX_UNDO_SECONDS)
        .collect();

    UndoUsage {
        total_orders: orders.len(),
        cancelled_within_window: cancelled.len(),
        undo_rate: round_to(percent(cancelled.len(), orders.len()), 2),
        avg_time_to_undo_seconds: round_to(mean(&undo_seconds), 1),
    }
}

pub fn delivery_performance(orders: &[OrderRow], zones: &[ZoneRow]) -> DeliveryPerformance {
    let delivery: Vec<&OrderRow> = orders
        .iter()
        .filter(|o| o.delivery_option.as_deref() == Some("delivery"))
        .collect();

    let fees: Vec<f64> = delivery.iter().map(|o| o.delivery_fee.unwrap_or(0.0)).collect();
    let etas: Vec<f64> = delivery
        .iter()
        .map(|o| o.delivery_eta_minutes.unwrap_or(0.0))
        .collect();

    DeliveryPerformance {
        total_delivery_orders: delivery.len(),
        completed_delivery_orders: delivery.iter().filter(|o| o.status == "completed").count(),
        avg_delivery_fee: mean(&fees).round(),
        avg_eta_minutes: mean(&etas).round(),
        active_zones: zones.iter().filter(|z| z.is_active).count(),
        total_zones: zones.len(),
    }
}

pub fn ai_adoption(orders: &[OrderRow]) -> AiAdoption {
    let mut by_source = SourceCounts::default();
    for order in orders {
        match order.source.as_deref() {
            Some("ai_suggested") => by_source.ai_suggested += 1,
            Some("reorder") => by_source.reorder += 1,
            Some("favorite") => by_source.favorite += 1,
            Some("manual") => by_source.manual += 1,
            _ => {}
        }
    }
    let quick = by_source.ai_suggested + by_source.reorder + by_source.favorite;

    AiAdoption {
        total_orders: orders.len(),
        ai_suggested_percent: round_to(percent(by_source.ai_suggested, orders.len()), 1),
        quick_order_percent: round_to(percent(quick, orders.len()), 1),
        by_source,
    }
}

pub fn reports_queue(reports: &[ReportRow], now: DateTime<Utc>) -> ReportsQueue {
    let mut by_status = StatusCounts::default();
    let mut by_reason = BTreeMap::new();
    let mut sla_violations = 0;
    let mut resolution_hours = Vec::new();

    for report in reports {
        match report.status.as_str() {
            "pending" => by_status.pending += 1,
            "reviewed" => by_status.reviewed += 1,
            "actioned" => by_status.actioned += 1,
            "dismissed" => by_status.dismissed += 1,
            _ => {}
        }
        *by_reason.entry(report.reason.clone()).or_insert(0) += 1;

        let created = parse_timestamp(&report.created_at);
        if report.status == "pending" && created.is_some_and(|at| breaches_sla(at, now)) {
            sla_violations += 1;
        }
        if let (Some(created), Some(reviewed)) = (
            created,
            report.reviewed_at.as_deref().and_then(parse_timestamp),
        ) {
            resolution_hours.push(hours_between(created, reviewed));
        }
    }

    ReportsQueue {
        total: reports.len(),
        by_status,
        by_reason,
        avg_resolution_hours: round_to(mean(&resolution_hours), 1),
        sla_violations,
    }
}

pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

pub fn breaches_sla(created: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    hours_between(created, now) > REPORT_SLA_HOURS
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn at(offset_secs: i64) -> String {
        crate::db::timestamp(now() + Duration::seconds(offset_secs))
    }

    fn order(status: &str, source: Option<&str>) -> OrderRow {
        OrderRow {
            status: status.into(),
            source: source.map(Into::into),
            created_at: at(-3600),
            ..Default::default()
        }
    }

    fn undone(after_secs: i64) -> OrderRow {
        OrderRow {
            finalized_at: Some(at(-3600 + after_secs)),
            pending_until: Some(at(-3600 + 30)),
            ..order("cancelled", Some("manual"))
        }
    }

    fn report(status: &str, reason: &str, age_hours: i64, reviewed_after: Option<i64>) -> ReportRow {
        let created = now() - Duration::hours(age_hours);
        ReportRow {
            status: status.into(),
            reason: reason.into(),
            created_at: crate::db::timestamp(created),
            reviewed_at: reviewed_after.map(|h| crate::db::timestamp(created + Duration::hours(h))),
        }
    }

    #[test]
    fn query_defaults_and_validation() {
        let q = DashboardQuery::parse(None, None).unwrap();
        assert_eq!(q, DashboardQuery { dashboard: Dashboard::All, days: 7 });

        let q = DashboardQuery::parse(Some("ai"), Some("30")).unwrap();
        assert_eq!(q.dashboard, Dashboard::Ai);
        assert_eq!(q.days, 30);

        assert!(DashboardQuery::parse(Some("sales"), None).is_err());
        assert!(DashboardQuery::parse(None, Some("0")).is_err());
        assert!(DashboardQuery::parse(None, Some("week")).is_err());
        assert!(DashboardQuery::parse(None, Some("366")).is_err());
    }

    #[test]
    fn window_start_is_days_before_now() {
        let q = DashboardQuery::parse(None, Some("2")).unwrap();
        assert_eq!(
            q.window_start(now()),
            Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn undo_rate_is_zero_without_orders() {
        let usage = undo_usage(&[]);
        assert_eq!(usage.total_orders, 0);
        assert_eq!(usage.undo_rate, 0.0);
        assert_eq!(usage.avg_time_to_undo_seconds, 0.0);
        assert!(!usage.undo_rate.is_nan());
    }

    #[test]
    fn undo_rate_and_time_to_undo() {
        let orders = vec![
            undone(4),
            undone(7),
            undone(95),
            order("cancelled", None),
            order("completed", Some("manual")),
            order("completed", Some("manual")),
        ];
        let usage = undo_usage(&orders);
        assert_eq!(usage.total_orders, 6);
        assert_eq!(usage.cancelled_within_window, 3);
        assert_eq!(usage.undo_rate, 50.0);
        // the 95s cancellation is outside the grace range and ignored
        assert_eq!(usage.avg_time_to_undo_seconds, 5.5);
    }

    #[test]
    fn undo_rate_rounds_to_two_decimals() {
        let mut orders = vec![undone(3)];
        orders.extend((0..2).map(|_| order("completed", None)));
        assert_eq!(undo_usage(&orders).undo_rate, 33.33);
    }

    #[test]
    fn delivery_averages_and_zone_coverage() {
        let delivery = |status: &str, fee: Option<f64>, eta: Option<f64>| OrderRow {
            delivery_option: Some("delivery".into()),
            delivery_fee: fee,
            delivery_eta_minutes: eta,
            ..order(status, None)
        };
        let orders = vec![
            delivery("completed", Some(15000.0), Some(25.0)),
            delivery("completed", Some(20000.0), Some(40.0)),
            delivery("preparing", None, None),
            OrderRow {
                delivery_option: Some("pickup".into()),
                delivery_fee: Some(99999.0),
                ..order("completed", None)
            },
        ];
        let zones = vec![
            ZoneRow { is_active: true, ..Default::default() },
            ZoneRow { is_active: false, ..Default::default() },
            ZoneRow { is_active: true, ..Default::default() },
        ];

        let perf = delivery_performance(&orders, &zones);
        assert_eq!(perf.total_delivery_orders, 3);
        assert_eq!(perf.completed_delivery_orders, 2);
        assert_eq!(perf.avg_delivery_fee, 11667.0);
        assert_eq!(perf.avg_eta_minutes, 22.0);
        assert_eq!(perf.active_zones, 2);
        assert_eq!(perf.total_zones, 3);
    }

    #[test]
    fn delivery_without_orders_is_zero() {
        let perf = delivery_performance(&[], &[]);
        assert_eq!(perf.avg_delivery_fee, 0.0);
        assert_eq!(perf.avg_eta_minutes, 0.0);
    }

    #[test]
    fn ai_adoption_percentages_share_one_order_set() {
        let orders = vec![
            order("completed", Some("ai_suggested")),
            order("completed", Some("ai_suggested")),
            order("completed", Some("reorder")),
            order("completed", Some("favorite")),
            order("completed", Some("manual")),
            order("completed", None),
        ];
        let adoption = ai_adoption(&orders);
        assert_eq!(adoption.total_orders, 6);
        assert_eq!(
            adoption.by_source,
            SourceCounts { ai_suggested: 2, reorder: 1, favorite: 1, manual: 1 }
        );
        assert_eq!(adoption.ai_suggested_percent, 33.3);
        assert_eq!(adoption.quick_order_percent, 66.7);
        assert!(adoption.ai_suggested_percent <= adoption.quick_order_percent);
    }

    #[test]
    fn ai_percentages_stay_in_bounds() {
        let sets: Vec<Vec<OrderRow>> = vec![
            vec![],
            vec![order("completed", Some("ai_suggested"))],
            (0..7).map(|_| order("completed", Some("favorite"))).collect(),
            (0..3).map(|_| order("completed", Some("weird"))).collect(),
        ];
        for orders in sets {
            let adoption = ai_adoption(&orders);
            for pct in [adoption.ai_suggested_percent, adoption.quick_order_percent] {
                assert!((0.0..=100.0).contains(&pct), "{pct} out of range");
            }
        }
    }

    #[test]
    fn pending_report_older_than_a_day_violates_sla() {
        let reports = vec![
            report("pending", "spam", 25, None),
            report("pending", "spam", 2, None),
            report("reviewed", "abuse", 48, Some(3)),
        ];
        let queue = reports_queue(&reports, now());
        assert_eq!(queue.sla_violations, 1);
        assert_eq!(queue.by_status.pending, 2);
        assert_eq!(queue.by_status.reviewed, 1);
    }

    #[test]
    fn resolution_time_and_reasons() {
        let reports = vec![
            report("reviewed", "abuse", 10, Some(2)),
            report("actioned", "abuse", 10, Some(5)),
            report("dismissed", "spam", 10, Some(1)),
            report("pending", "other", 1, None),
        ];
        let queue = reports_queue(&reports, now());
        assert_eq!(queue.total, 4);
        assert_eq!(queue.avg_resolution_hours, 2.7);
        assert_eq!(queue.by_reason.get("abuse"), Some(&2));
        assert_eq!(queue.by_reason.get("spam"), Some(&1));
        assert_eq!(queue.sla_violations, 0);
        assert_eq!(
            queue.by_status,
            StatusCounts { pending: 1, reviewed: 1, actioned: 1, dismissed: 1 }
        );
    }

    #[test]
    fn filter_limits_sections() {
        let query = DashboardQuery::parse(Some("reports"), None).unwrap();
        let report = build_report(query, now(), &[], &[], &[]);
        assert!(report.reports_queue.is_some());
        assert!(report.undo_usage.is_none());
        assert!(report.delivery_performance.is_none());
        assert!(report.ai_adoption.is_none());
        assert!(!query.dashboard.needs_orders());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dashboard"], "reports");
        assert_eq!(json["period"]["days"], 7);
        assert!(json.get("undoUsage").is_none());
        assert_eq!(json["reportsQueue"]["slaViolations"], 0);
    }

    #[test]
    fn all_sections_serialize_in_camel_case() {
        let query = DashboardQuery::parse(None, None).unwrap();
        let report = build_report(query, now(), &[undone(5)], &[], &[]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["undoUsage"]["cancelledWithinWindow"], 1);
        assert_eq!(json["undoUsage"]["undoRate"], 100.0);
        assert_eq!(json["aiAdoption"]["bySource"]["manual"], 1);
        assert_eq!(json["deliveryPerformance"]["totalZones"], 0);
        assert_eq!(json["period"]["startDate"], "2026-10-09T12:00:00.000Z");
    }
}
