use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::domain::Movement;

use super::MIGRATION_001_INITIAL;

/// Column filters pushed down to SQL. Date bounds are applied by the
/// service on parsed dates.
#[derive(Debug, Clone, Default)]
pub struct MovementQuery<'a> {
    pub cuenta: Option<&'a str>,
    pub proyecto: Option<&'a str>,
    pub moneda: Option<&'a str>,
}

/// Repository for the local movement snapshot.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Insert a movement. Fails on a duplicate id.
    pub async fn save_movement(&self, movement: &Movement) -> Result<()> {
        let payload = serde_json::to_string(movement).context("Failed to encode movement")?;

        sqlx::query(
            r#"
            INSERT INTO movements (id, cuenta, proyecto, moneda, fecha_ms, payload, imported_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.cuenta)
        .bind(&movement.proyecto)
        .bind(&movement.moneda)
        .bind(movement.fecha_utc().map(|d| d.timestamp_millis()))
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save movement {}", movement.id))?;

        Ok(())
    }

    pub async fn movement_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM movements WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check movement")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    /// Get a movement by id.
    pub async fn get_movement(&self, id: &str) -> Result<Option<Movement>> {
        let row = sqlx::query("SELECT payload FROM movements WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch movement")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_movement(&row)?)),
            None => Ok(None),
        }
    }

    /// Delete a movement. Returns whether a row was removed.
    pub async fn delete_movement(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM movements WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete movement")?;
        Ok(result.rows_affected() > 0)
    }

    /// List movements matching the column filters, ordered by date then id.
    pub async fn list_movements(&self, query: &MovementQuery<'_>) -> Result<Vec<Movement>> {
        let mut sql = String::from("SELECT payload FROM movements WHERE 1=1");

        if query.cuenta.is_some() {
            sql.push_str(" AND cuenta = ?");
        }
        if query.proyecto.is_some() {
            sql.push_str(" AND proyecto = ?");
        }
        if query.moneda.is_some() {
            sql.push_str(" AND moneda = ?");
        }
        sql.push_str(" ORDER BY COALESCE(fecha_ms, 0), id");

        let mut sql_query = sqlx::query(&sql);
        if let Some(cuenta) = query.cuenta {
            sql_query = sql_query.bind(cuenta);
        }
        if let Some(proyecto) = query.proyecto {
            sql_query = sql_query.bind(proyecto);
        }
        if let Some(moneda) = query.moneda {
            sql_query = sql_query.bind(moneda);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list movements")?;

        rows.iter().map(Self::row_to_movement).collect()
    }

    pub async fn count_movements(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM movements")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count movements")?;
        Ok(row.get("count"))
    }

    fn row_to_movement(row: &sqlx::sqlite::SqliteRow) -> Result<Movement> {
        let payload: String = row.get("payload");
        serde_json::from_str(&payload).context("Invalid movement payload")
    }
}
