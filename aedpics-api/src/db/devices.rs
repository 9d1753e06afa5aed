//! AED device records (`aed_data`)

use aedpics_common::db::Device;
use aedpics_common::time::{now, to_db_string};
use aedpics_common::{tnms, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::bind_scope;
use crate::db::escape_like;
use crate::pagination::{calculate_pagination, Page, PAGE_SIZE};
use crate::scope::{device_clause, Scope};

pub(crate) const DEVICE_COLUMNS: &str = "a.id, a.equipment_serial, a.management_number, a.installation_institution,
     a.institution_normalized, a.installation_address, a.region_code, a.city_code,
     a.battery_expiry_date, a.patch_expiry_date, a.external_display, a.last_inspection_date,
     a.updated_at";

/// Devices in scope matching an optional free-text query
///
/// The query matches serial or management number as a prefix and the
/// institution by substring of its normalized name.
pub async fn search(pool: &SqlitePool, scope: &Scope, q: Option<&str>, page: i64) -> Result<Page<Device>> {
    let q = q.map(str::trim).filter(|q| !q.is_empty());
    let prefix = q.map(|q| format!("{}%", escape_like(q)));
    // Normalized text is alphanumeric only; nothing left means no name match
    let normalized = q
        .map(tnms::normalize)
        .filter(|n| !n.is_empty())
        .map(|n| format!("%{}%", n));

    let filter = format!(
        "{} AND (? IS NULL OR a.equipment_serial LIKE ? ESCAPE '\\' OR a.management_number LIKE ? ESCAPE '\\'
              OR a.institution_normalized LIKE ?)",
        device_clause("a")
    );

    let count_sql = format!("SELECT COUNT(*) FROM aed_data a WHERE {}", filter);
    let total: i64 = bind_scope!(sqlx::query_scalar(&count_sql), scope)
        .bind(q)
        .bind(&prefix)
        .bind(&prefix)
        .bind(&normalized)
        .fetch_one(pool)
        .await?;

    let pagination = calculate_pagination(total, page);
    let list_sql = format!(
        "SELECT {} FROM aed_data a WHERE {} ORDER BY a.equipment_serial, a.id LIMIT ? OFFSET ?",
        DEVICE_COLUMNS, filter
    );
    let items: Vec<Device> = bind_scope!(sqlx::query_as(&list_sql), scope)
        .bind(q)
        .bind(&prefix)
        .bind(&prefix)
        .bind(&normalized)
        .bind(PAGE_SIZE)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;

    Ok(Page::new(items, total, pagination))
}

/// Every row carrying the serial (serials are not unique)
pub async fn find_by_serial(pool: &SqlitePool, serial: &str) -> Result<Vec<Device>> {
    let sql = format!(
        "SELECT {} FROM aed_data a WHERE a.equipment_serial = ? ORDER BY a.id",
        DEVICE_COLUMNS
    );
    Ok(sqlx::query_as(&sql).bind(serial).fetch_all(pool).await?)
}

/// Whether any device with the serial lies in scope
pub async fn serial_in_scope(pool: &SqlitePool, scope: &Scope, serial: &str) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM aed_data a WHERE a.equipment_serial = ? AND {})",
        device_clause("a")
    );
    let exists: bool = bind_scope!(sqlx::query_scalar(&sql).bind(serial), scope)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSerial {
    pub equipment_serial: String,
    pub row_count: i64,
    /// Comma-separated management numbers of the colliding rows
    pub management_numbers: String,
}

/// Serials that appear on more than one device row within scope
pub async fn duplicate_serials(pool: &SqlitePool, scope: &Scope) -> Result<Vec<DuplicateSerial>> {
    let sql = format!(
        "SELECT a.equipment_serial, COUNT(*) AS row_count,
                GROUP_CONCAT(a.management_number, ',') AS management_numbers
         FROM aed_data a
         WHERE {}
         GROUP BY a.equipment_serial
         HAVING COUNT(*) > 1
         ORDER BY row_count DESC, a.equipment_serial",
        device_clause("a")
    );
    Ok(bind_scope!(sqlx::query_as(&sql), scope).fetch_all(pool).await?)
}

/// One device row in a batch import
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceImport {
    pub equipment_serial: String,
    pub management_number: String,
    pub installation_institution: String,
    pub installation_address: Option<String>,
    pub region_code: String,
    pub city_code: Option<String>,
    pub battery_expiry_date: Option<String>,
    pub patch_expiry_date: Option<String>,
    #[serde(default = "default_external_display")]
    pub external_display: String,
}

fn default_external_display() -> String {
    "Y".to_string()
}

/// Upsert a batch keyed by management number in one transaction
///
/// `last_inspection_date` is owned by the inspection workflow and never
/// overwritten by an import.
pub async fn upsert_batch(pool: &SqlitePool, rows: &[DeviceImport]) -> Result<u64> {
    let ts = to_db_string(&now());
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for row in rows {
        let result = sqlx::query(
            "INSERT INTO aed_data
                (equipment_serial, management_number, installation_institution, institution_normalized,
                 installation_address, region_code, city_code, battery_expiry_date, patch_expiry_date,
                 external_display, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(management_number) DO UPDATE SET
                equipment_serial = excluded.equipment_serial,
                installation_institution = excluded.installation_institution,
                institution_normalized = excluded.institution_normalized,
                installation_address = excluded.installation_address,
                region_code = excluded.region_code,
                city_code = excluded.city_code,
                battery_expiry_date = excluded.battery_expiry_date,
                patch_expiry_date = excluded.patch_expiry_date,
                external_display = excluded.external_display,
                updated_at = excluded.updated_at",
        )
        .bind(row.equipment_serial.trim())
        .bind(row.management_number.trim())
        .bind(&row.installation_institution)
        .bind(tnms::normalize(&row.installation_institution))
        .bind(&row.installation_address)
        .bind(&row.region_code)
        .bind(&row.city_code)
        .bind(&row.battery_expiry_date)
        .bind(&row.patch_expiry_date)
        .bind(&row.external_display)
        .bind(&ts)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}
