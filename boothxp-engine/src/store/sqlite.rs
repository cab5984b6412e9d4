//! SQLite-backed user store
//!
//! Reward fields live in their own `user_rewards` table keyed by the user
//! guid, so the store can sit next to whatever account table the host uses.

use crate::collaborators::UserStore;
use async_trait::async_trait;
use boothxp_common::{Error, Result, UserRewardState};
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// User store persisting reward records to SQLite
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Open (creating if needed) the database at `db_path` and ensure the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new reward database: {}", db_path.display());
        } else {
            info!("Opened existing reward database: {}", db_path.display());
        }

        // WAL lets readers proceed while a gain is being written
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, single connection so the data is shared
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the caller is responsible for `init_schema`
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the reward table (idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_rewards (
                guid TEXT PRIMARY KEY,
                exp INTEGER NOT NULL DEFAULT 0,
                points INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
                last_dispense_date TEXT,
                dispense_cycle_count INTEGER NOT NULL DEFAULT 0 CHECK (dispense_cycle_count >= 0),
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create the initial reward record for a new account
    ///
    /// Returns the existing record unchanged if the user already has one.
    pub async fn insert_new(&self, id: Uuid) -> Result<UserRewardState> {
        sqlx::query("INSERT OR IGNORE INTO user_rewards (guid) VALUES (?)")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        self.get_user(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("record for {} vanished after insert", id)))
    }

    /// Number of stored reward records
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_rewards")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn state_from_row(id: Uuid, row: &SqliteRow) -> Result<UserRewardState> {
    let last_dispense_date = row
        .try_get::<Option<String>, _>("last_dispense_date")?
        .map(|s| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                Error::Internal(format!("bad last_dispense_date '{}' for {}: {}", s, id, e))
            })
        })
        .transpose()?;

    Ok(UserRewardState {
        id,
        exp: row.try_get("exp")?,
        points: row.try_get("points")?,
        level: row.try_get::<i64, _>("level")?.max(1) as u32,
        last_dispense_date,
        dispense_cycle_count: row.try_get::<i64, _>("dispense_cycle_count")?.max(0) as u32,
    })
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRewardState>> {
        let row = sqlx::query(
            r#"
            SELECT exp, points, level, last_dispense_date, dispense_cycle_count
            FROM user_rewards
            WHERE guid = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| state_from_row(id, &row)).transpose()
    }

    async fn save(&self, state: &UserRewardState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_rewards
                (guid, exp, points, level, last_dispense_date, dispense_cycle_count, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(guid) DO UPDATE SET
                exp = excluded.exp,
                points = excluded.points,
                level = excluded.level,
                last_dispense_date = excluded.last_dispense_date,
                dispense_cycle_count = excluded.dispense_cycle_count,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(state.id.to_string())
        .bind(state.exp)
        .bind(state.points)
        .bind(i64::from(state.level))
        .bind(
            state
                .last_dispense_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
        )
        .bind(i64::from(state.dispense_cycle_count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let store = SqliteUserStore::in_memory().await.unwrap();
        assert_eq!(store.get_user(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_new_uses_initial_values() {
        let store = SqliteUserStore::in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let state = store.insert_new(id).await.unwrap();
        assert_eq!(state, UserRewardState::new(id));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let store = SqliteUserStore::in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let mut state = store.insert_new(id).await.unwrap();

        state.exp = 1234;
        state.points = -15;
        state.level = 4;
        state.last_dispense_date = NaiveDate::from_ymd_opt(2024, 6, 30);
        state.dispense_cycle_count = 71;
        store.save(&state).await.unwrap();

        let loaded = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_new_keeps_existing_record() {
        let store = SqliteUserStore::in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let mut state = store.insert_new(id).await.unwrap();
        state.points = 500;
        store.save(&state).await.unwrap();

        let again = store.insert_new(id).await.unwrap();
        assert_eq!(again.points, 500);
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("rewards.db");

        let store = SqliteUserStore::open(&db_path).await.unwrap();
        let id = Uuid::new_v4();
        store.insert_new(id).await.unwrap();
        assert!(db_path.exists());
        drop(store);

        let reopened = SqliteUserStore::open(&db_path).await.unwrap();
        assert!(reopened.get_user(id).await.unwrap().is_some());
    }
}
