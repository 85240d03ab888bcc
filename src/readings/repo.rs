use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A confirmed, durable meter reading. Only ever created through the
/// confirmation step; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeterReading {
    pub id: i64,
    pub user_id: i64,
    pub kwh: f64,
    pub image_path: String,
}

impl MeterReading {
    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        kwh: f64,
        image_path: &str,
    ) -> anyhow::Result<MeterReading> {
        let reading = sqlx::query_as::<_, MeterReading>(
            r#"
            INSERT INTO meter_readings (user_id, kwh, image_path)
            VALUES (?, ?, ?)
            RETURNING id, user_id, kwh, image_path
            "#,
        )
        .bind(user_id)
        .bind(kwh)
        .bind(image_path)
        .fetch_one(db)
        .await?;
        Ok(reading)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> anyhow::Result<Option<MeterReading>> {
        let reading = sqlx::query_as::<_, MeterReading>(
            r#"
            SELECT id, user_id, kwh, image_path
            FROM meter_readings
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(reading)
    }

    pub async fn list_by_user(db: &SqlitePool, user_id: i64) -> anyhow::Result<Vec<MeterReading>> {
        let rows = sqlx::query_as::<_, MeterReading>(
            r#"
            SELECT id, user_id, kwh, image_path
            FROM meter_readings
            WHERE user_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
