use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection pool and run migrations.
    ///
    /// Foreign keys are enabled per connection — cascading deletes of
    /// subtrees and their items depend on it.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for locks to release before
        // returning SQLITE_BUSY, which covers transient contention between a
        // refresh batch and a structural mutation.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        // SQLite is single-writer; 5 connections covers concurrent
        // reconciliation writes plus tree reads.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(db)
    }

    /// Run schema migrations atomically within one transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY,
                owner_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                icon TEXT NOT NULL DEFAULT 'rss',
                parent_id INTEGER REFERENCES collections(id) ON DELETE CASCADE,
                sort_order INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                url TEXT,
                date_updated INTEGER,
                refresh_interval INTEGER NOT NULL DEFAULT 60,
                layout TEXT NOT NULL DEFAULT 'card'
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_items (
                id INTEGER PRIMARY KEY,
                collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT,
                full_text TEXT,
                thumbnail_url TEXT,
                date_published INTEGER,
                date_updated INTEGER NOT NULL,
                date_read INTEGER,
                categories TEXT,
                comments TEXT,
                reading_time INTEGER NOT NULL DEFAULT 1,
                UNIQUE(collection_id, url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_collections_parent ON collections(parent_id)")
            .execute(&mut *tx)
            .await?;
        // Duplicate-feed policy is owner-scoped, compared on normalized URL.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_collections_owner_url \
             ON collections(owner_id, url) WHERE url IS NOT NULL",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_items_collection ON collection_items(collection_id)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_items_unread \
             ON collection_items(collection_id) WHERE date_read IS NULL",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open(":memory:").await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM collections")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn test_migrate_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::open(":memory:").await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
