//! Organization lookup

use aedpics_common::db::Organization;
use aedpics_common::Result;
use sqlx::SqlitePool;

use crate::db::escape_like;

/// Upper bound on search results
pub const SEARCH_LIMIT: i64 = 20;

const ORG_COLUMNS: &str = "id, name, org_type, region_code, city_code, parent_id";

/// Organizations whose name contains `q` (case-insensitive), by name
pub async fn search(pool: &SqlitePool, q: &str) -> Result<Vec<Organization>> {
    let sql = format!(
        "SELECT {} FROM organizations WHERE name LIKE ? ESCAPE '\\' ORDER BY name LIMIT ?",
        ORG_COLUMNS
    );
    Ok(sqlx::query_as(&sql)
        .bind(format!("%{}%", escape_like(q.trim())))
        .bind(SEARCH_LIMIT)
        .fetch_all(pool)
        .await?)
}

/// Health centers, optionally narrowed by region and city
pub async fn health_centers(
    pool: &SqlitePool,
    region_code: Option<&str>,
    city_code: Option<&str>,
) -> Result<Vec<Organization>> {
    let sql = format!(
        "SELECT {} FROM organizations
         WHERE org_type = 'health_center'
           AND (? IS NULL OR region_code = ?)
           AND (? IS NULL OR city_code = ?)
         ORDER BY region_code, city_code, name",
        ORG_COLUMNS
    );
    Ok(sqlx::query_as(&sql)
        .bind(region_code)
        .bind(region_code)
        .bind(city_code)
        .bind(city_code)
        .fetch_all(pool)
        .await?)
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Organization>> {
    let sql = format!("SELECT {} FROM organizations WHERE id = ?", ORG_COLUMNS);
    Ok(sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_search_and_health_centers() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        aedpics_common::db::init_schema(&pool).await.unwrap();

        for (name, org_type, region, city) in [
            ("서울특별시", "province", "11", None),
            ("종로구보건소", "health_center", "11", Some("110")),
            ("중구보건소", "health_center", "11", Some("140")),
            ("부산 중구보건소", "health_center", "26", Some("260")),
        ] {
            sqlx::query("INSERT INTO organizations (name, org_type, region_code, city_code) VALUES (?, ?, ?, ?)")
                .bind(name)
                .bind(org_type)
                .bind(region)
                .bind(city)
                .execute(&pool)
                .await
                .unwrap();
        }

        let found = search(&pool, "중구").await.unwrap();
        assert_eq!(found.len(), 2);

        assert_eq!(health_centers(&pool, None, None).await.unwrap().len(), 3);
        assert_eq!(health_centers(&pool, Some("11"), None).await.unwrap().len(), 2);
        let jongno = health_centers(&pool, Some("11"), Some("110")).await.unwrap();
        assert_eq!(jongno.len(), 1);
        assert_eq!(jongno[0].name, "종로구보건소");

        assert!(find(&pool, jongno[0].id).await.unwrap().is_some());
    }
}
