//! Dashboard aggregation
//!
//! Counts are computed by the store. Time buckets use KST: timestamps are
//! stored in UTC and shifted by `+9 hours` inside SQLite.

use aedpics_common::time::{kst_day_start_utc, to_db_string};
use aedpics_common::Result;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::bind_scope;
use crate::scope::{device_clause, serial_clause, Scope};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_devices: i64,
    pub expired_battery: i64,
    pub expired_pads: i64,
    pub no_external_display: i64,
    pub inspections_today: i64,
    pub inspections_this_month: i64,
    pub pending_approvals: i64,
    /// 24 entries, index = KST hour
    pub hourly_today: Vec<i64>,
    pub daily: Vec<DailyCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(sqlx::FromRow)]
struct DeviceCounts {
    total_devices: i64,
    expired_battery: i64,
    expired_pads: i64,
    no_external_display: i64,
}

/// Aggregate the dashboard for `scope` as of the KST day `today`
pub async fn summary(pool: &SqlitePool, scope: &Scope, today: NaiveDate, daily_window_days: i64) -> Result<DashboardSummary> {
    let today_str = today.format("%Y-%m-%d").to_string();

    let device_sql = format!(
        "SELECT COUNT(*) AS total_devices,
                COALESCE(SUM(CASE WHEN a.battery_expiry_date IS NOT NULL AND a.battery_expiry_date != ''
                                   AND a.battery_expiry_date < ? THEN 1 ELSE 0 END), 0) AS expired_battery,
                COALESCE(SUM(CASE WHEN a.patch_expiry_date IS NOT NULL AND a.patch_expiry_date != ''
                                   AND a.patch_expiry_date < ? THEN 1 ELSE 0 END), 0) AS expired_pads,
                COALESCE(SUM(CASE WHEN a.external_display = 'N' THEN 1 ELSE 0 END), 0) AS no_external_display
         FROM aed_data a
         WHERE {}",
        device_clause("a")
    );
    let devices: DeviceCounts = bind_scope!(
        sqlx::query_as(&device_sql).bind(&today_str).bind(&today_str),
        scope
    )
    .fetch_one(pool)
    .await?;

    let day_start = kst_day_start_utc(today);
    let day_end = day_start + Duration::days(1);
    let month_start = today.with_day(1).map(kst_day_start_utc).unwrap_or(day_start);
    let window_start = kst_day_start_utc(today - Duration::days(daily_window_days.max(1) - 1));

    let inspections_today = count_inspections_between(pool, scope, &to_db_string(&day_start), &to_db_string(&day_end)).await?;
    let inspections_this_month =
        count_inspections_between(pool, scope, &to_db_string(&month_start), &to_db_string(&day_end)).await?;

    let pending_sql = format!(
        "SELECT COUNT(*) FROM inspections i WHERE i.approval_status = 'submitted' AND {}",
        serial_clause("i.equipment_serial")
    );
    let pending_approvals: i64 = bind_scope!(sqlx::query_scalar(&pending_sql), scope)
        .fetch_one(pool)
        .await?;

    let hourly_sql = format!(
        "SELECT CAST(strftime('%H', i.inspected_at, '+9 hours') AS INTEGER) AS hour, COUNT(*) AS n
         FROM inspections i
         WHERE i.inspected_at >= ? AND i.inspected_at < ? AND {}
         GROUP BY hour",
        serial_clause("i.equipment_serial")
    );
    let hourly_rows: Vec<(i64, i64)> = bind_scope!(
        sqlx::query_as(&hourly_sql)
            .bind(to_db_string(&day_start))
            .bind(to_db_string(&day_end)),
        scope
    )
    .fetch_all(pool)
    .await?;
    let mut hourly_today = vec![0i64; 24];
    for (hour, n) in hourly_rows {
        if let Some(slot) = usize::try_from(hour).ok().and_then(|h| hourly_today.get_mut(h)) {
            *slot = n;
        }
    }

    let daily_sql = format!(
        "SELECT date(i.inspected_at, '+9 hours') AS day, COUNT(*) AS n
         FROM inspections i
         WHERE i.inspected_at >= ? AND i.inspected_at < ? AND {}
         GROUP BY day",
        serial_clause("i.equipment_serial")
    );
    let daily_rows: Vec<(String, i64)> = bind_scope!(
        sqlx::query_as(&daily_sql)
            .bind(to_db_string(&window_start))
            .bind(to_db_string(&day_end)),
        scope
    )
    .fetch_all(pool)
    .await?;
    let by_day: HashMap<String, i64> = daily_rows.into_iter().collect();
    let daily = (0..daily_window_days.max(1))
        .rev()
        .map(|back| {
            let date = (today - Duration::days(back)).format("%Y-%m-%d").to_string();
            let count = by_day.get(&date).copied().unwrap_or(0);
            DailyCount { date, count }
        })
        .collect();

    Ok(DashboardSummary {
        total_devices: devices.total_devices,
        expired_battery: devices.expired_battery,
        expired_pads: devices.expired_pads,
        no_external_display: devices.no_external_display,
        inspections_today,
        inspections_this_month,
        pending_approvals,
        hourly_today,
        daily,
    })
}

async fn count_inspections_between(pool: &SqlitePool, scope: &Scope, from: &str, to: &str) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM inspections i WHERE i.inspected_at >= ? AND i.inspected_at < ? AND {}",
        serial_clause("i.equipment_serial")
    );
    Ok(bind_scope!(sqlx::query_scalar(&sql).bind(from).bind(to), scope)
        .fetch_one(pool)
        .await?)
}

/// Unauthenticated headline numbers
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicStats {
    pub total_devices: i64,
    pub total_inspections: i64,
    pub target_institutions: i64,
    pub confirmed_targets: i64,
}

pub async fn public_stats(pool: &SqlitePool) -> Result<PublicStats> {
    Ok(sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM aed_data) AS total_devices,
                (SELECT COUNT(*) FROM inspections) AS total_inspections,
                (SELECT COUNT(*) FROM target_list_2025) AS target_institutions,
                (SELECT COUNT(*) FROM target_list_2025 WHERE confirmed_2024 = 1) AS confirmed_targets",
    )
    .fetch_one(pool)
    .await?)
}
