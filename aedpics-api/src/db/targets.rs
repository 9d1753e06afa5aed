//! Mandatory-installation target list and its device mappings

use aedpics_common::db::{ComplianceTarget, Device, MatchedBy, TargetDeviceMapping};
use aedpics_common::time::{now, to_db_string};
use aedpics_common::{tnms, Error, Result};
use chrono::SubsecRound;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::bind_scope;
use crate::db::devices::DEVICE_COLUMNS;
use crate::pagination::{calculate_pagination, Page, PAGE_SIZE};
use crate::scope::{region_clause, Scope};

const TARGET_COLUMNS: &str = "t.target_key, t.institution_name, t.normalized_name, t.region_code, t.city_code,
     t.division, t.confirmed_2024, t.confirmed_by, t.confirmed_at";

const MAPPING_COLUMNS: &str =
    "m.target_institution_id, m.equipment_serial, m.matched_by, m.matched_at, m.matched_user";

pub async fn find(pool: &SqlitePool, target_key: &str) -> Result<Option<ComplianceTarget>> {
    let sql = format!("SELECT {} FROM target_list_2025 t WHERE t.target_key = ?", TARGET_COLUMNS);
    Ok(sqlx::query_as(&sql).bind(target_key).fetch_optional(pool).await?)
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub target: ComplianceTarget,
    pub device_count: i64,
}

pub struct TargetFilter<'a> {
    pub confirmed: Option<bool>,
    pub q: Option<&'a str>,
}

/// Targets in scope with their mapping counts, by name
pub async fn list(pool: &SqlitePool, scope: &Scope, filter: TargetFilter<'_>, page: i64) -> Result<Page<TargetSummary>> {
    let q = filter
        .q
        .map(tnms::normalize)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));
    let where_sql = format!(
        "{} AND (? IS NULL OR t.confirmed_2024 = ?) AND (? IS NULL OR t.normalized_name LIKE ?)",
        region_clause("t.region_code", "t.city_code")
    );

    let count_sql = format!("SELECT COUNT(*) FROM target_list_2025 t WHERE {}", where_sql);
    let total: i64 = bind_scope!(sqlx::query_scalar(&count_sql), scope)
        .bind(filter.confirmed)
        .bind(filter.confirmed)
        .bind(&q)
        .bind(&q)
        .fetch_one(pool)
        .await?;

    let pagination = calculate_pagination(total, page);
    let list_sql = format!(
        "SELECT {},
                (SELECT COUNT(*) FROM target_list_devices m WHERE m.target_institution_id = t.target_key) AS device_count
         FROM target_list_2025 t
         WHERE {}
         ORDER BY t.institution_name, t.target_key
         LIMIT ? OFFSET ?",
        TARGET_COLUMNS, where_sql
    );
    let items = bind_scope!(sqlx::query_as(&list_sql), scope)
        .bind(filter.confirmed)
        .bind(filter.confirmed)
        .bind(&q)
        .bind(&q)
        .bind(PAGE_SIZE)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;

    Ok(Page::new(items, total, pagination))
}

/// Record (or clear) the 2024 confirmation of a target
///
/// Returns the updated target, or `None` for an unknown key.
pub async fn set_confirmation(
    pool: &SqlitePool,
    target_key: &str,
    confirmed: bool,
    user_id: &str,
) -> Result<Option<ComplianceTarget>> {
    let (confirmed_by, confirmed_at) = if confirmed {
        (Some(user_id), Some(to_db_string(&now())))
    } else {
        (None, None)
    };

    let result = sqlx::query(
        "UPDATE target_list_2025 SET confirmed_2024 = ?, confirmed_by = ?, confirmed_at = ?
         WHERE target_key = ?",
    )
    .bind(confirmed)
    .bind(confirmed_by)
    .bind(confirmed_at)
    .bind(target_key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find(pool, target_key).await
}

pub async fn mappings(pool: &SqlitePool, target_key: &str) -> Result<Vec<TargetDeviceMapping>> {
    let sql = format!(
        "SELECT {} FROM target_list_devices m WHERE m.target_institution_id = ? ORDER BY m.equipment_serial",
        MAPPING_COLUMNS
    );
    Ok(sqlx::query_as(&sql).bind(target_key).fetch_all(pool).await?)
}

/// Stored TNMS name, or the name normalized now for rows loaded without one
fn normalized_name_of(target: &ComplianceTarget) -> String {
    if target.normalized_name.is_empty() {
        tnms::normalize(&target.institution_name)
    } else {
        target.normalized_name.clone()
    }
}

/// A device ranked against a target name
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub device: Device,
    pub distance: usize,
    pub similarity: f64,
    pub already_mapped: bool,
}

/// Devices in the target's region whose normalized institution name is close
/// to the target's, best first (ties broken by serial)
pub async fn candidates(pool: &SqlitePool, target: &ComplianceTarget, limit: usize) -> Result<Vec<Candidate>> {
    let normalized_target = normalized_name_of(target);

    let sql = format!(
        "SELECT {} FROM aed_data a WHERE a.region_code = ? AND a.institution_normalized != ''",
        DEVICE_COLUMNS
    );
    let devices: Vec<Device> = sqlx::query_as(&sql)
        .bind(&target.region_code)
        .fetch_all(pool)
        .await?;

    let mapped: std::collections::HashSet<String> = mappings(pool, &target.target_key)
        .await?
        .into_iter()
        .map(|m| m.equipment_serial)
        .collect();

    let mut ranked: Vec<Candidate> = devices
        .into_iter()
        .filter_map(|device| {
            let score = tnms::score(&normalized_target, &device.institution_normalized)?;
            Some(Candidate {
                already_mapped: mapped.contains(&device.equipment_serial),
                distance: score.distance,
                similarity: score.similarity,
                device,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.device.equipment_serial.cmp(&b.device.equipment_serial))
    });
    ranked.truncate(limit);
    Ok(ranked)
}

/// Map every device in the region whose normalized name equals the target's
///
/// Existing mappings are left untouched. Returns the number of new mappings.
pub async fn auto_match(pool: &SqlitePool, target: &ComplianceTarget, user_id: &str) -> Result<u64> {
    let normalized_target = normalized_name_of(target);
    if normalized_target.is_empty() {
        return Ok(0);
    }
    if target.normalized_name.is_empty() {
        sqlx::query("UPDATE target_list_2025 SET normalized_name = ? WHERE target_key = ?")
            .bind(&normalized_target)
            .bind(&target.target_key)
            .execute(pool)
            .await?;
    }

    let result = sqlx::query(
        "INSERT OR IGNORE INTO target_list_devices
            (target_institution_id, equipment_serial, matched_by, matched_at, matched_user)
         SELECT DISTINCT ?, a.equipment_serial, 'auto', ?, ?
         FROM aed_data a
         WHERE a.region_code = ? AND a.institution_normalized = ?",
    )
    .bind(&target.target_key)
    .bind(to_db_string(&now()))
    .bind(user_id)
    .bind(&target.region_code)
    .bind(&normalized_target)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Add a manual mapping; an existing pair is a conflict
pub async fn map_device(
    pool: &SqlitePool,
    target_key: &str,
    serial: &str,
    user_id: &str,
) -> Result<TargetDeviceMapping> {
    let matched_at = now().trunc_subsecs(0);
    let result = sqlx::query(
        "INSERT INTO target_list_devices
            (target_institution_id, equipment_serial, matched_by, matched_at, matched_user)
         VALUES (?, ?, 'manual', ?, ?)",
    )
    .bind(target_key)
    .bind(serial)
    .bind(to_db_string(&matched_at))
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(Error::from);

    match result {
        Ok(_) => Ok(TargetDeviceMapping {
            target_institution_id: target_key.to_string(),
            equipment_serial: serial.to_string(),
            matched_by: MatchedBy::Manual,
            matched_at,
            matched_user: Some(user_id.to_string()),
        }),
        Err(e) if e.is_unique_violation() => {
            Err(Error::Conflict("이미 연결된 장비입니다".to_string()))
        }
        Err(e) => Err(e),
    }
}

pub async fn unmap_device(pool: &SqlitePool, target_key: &str, serial: &str) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM target_list_devices WHERE target_institution_id = ? AND equipment_serial = ?",
    )
    .bind(target_key)
    .bind(serial)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Mark an existing mapping as checked by a person
pub async fn verify_mapping(pool: &SqlitePool, target_key: &str, serial: &str, user_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE target_list_devices SET matched_by = 'verified', matched_at = ?, matched_user = ?
         WHERE target_institution_id = ? AND equipment_serial = ?",
    )
    .bind(to_db_string(&now()))
    .bind(user_id)
    .bind(target_key)
    .bind(serial)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
