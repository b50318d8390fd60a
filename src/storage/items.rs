use std::collections::HashSet;

use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Item, ItemRow, ParsedItem, StoreError, ITEM_COLUMNS};

impl Database {
    // ========================================================================
    // Item Reads
    // ========================================================================

    /// All items of a collection, newest first.
    pub async fn items_for_collection(&self, collection_id: i64) -> Result<Vec<Item>, StoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM collection_items \
             WHERE collection_id = ? ORDER BY date_published DESC, id DESC"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Item::from_row).collect())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Complete a collection refresh atomically: reconcile fetched candidates
    /// against stored items and stamp the collection's `date_updated`.
    ///
    /// Upserts are keyed on (collection_id, url). Absent candidates insert as
    /// unread; present ones update every field except `date_read`, and the
    /// item-level `date_updated` is only reassigned when title, summary, or
    /// full text actually changed. Re-running with the same candidates is a
    /// no-op for counts and read state.
    ///
    /// Returns the number of newly inserted items.
    pub async fn complete_refresh(
        &self,
        collection_id: i64,
        items: &[ParsedItem],
        now: i64,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT url FROM collection_items WHERE collection_id = ?")
                .bind(collection_id)
                .fetch_all(&mut *tx)
                .await?;
        let existing: HashSet<String> = existing.into_iter().map(|(url,)| url).collect();

        let mut inserted = 0;
        for item in items {
            if !existing.contains(&item.url) {
                inserted += 1;
            }
            let categories = if item.categories.is_empty() {
                None
            } else {
                serde_json::to_string(&item.categories).ok()
            };

            sqlx::query(
                r#"
                INSERT INTO collection_items
                    (collection_id, url, title, summary, full_text, thumbnail_url,
                     date_published, date_updated, categories, comments, reading_time)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection_id, url) DO UPDATE SET
                    title = excluded.title,
                    summary = excluded.summary,
                    full_text = excluded.full_text,
                    thumbnail_url = excluded.thumbnail_url,
                    date_published = excluded.date_published,
                    categories = excluded.categories,
                    comments = excluded.comments,
                    reading_time = excluded.reading_time,
                    date_updated = CASE
                        WHEN collection_items.title IS NOT excluded.title
                          OR collection_items.summary IS NOT excluded.summary
                          OR collection_items.full_text IS NOT excluded.full_text
                        THEN excluded.date_updated
                        ELSE collection_items.date_updated
                    END
            "#,
            )
            .bind(collection_id)
            .bind(&item.url)
            .bind(&item.title)
            .bind(&item.summary)
            .bind(&item.full_text)
            .bind(&item.thumbnail_url)
            .bind(item.date_published)
            .bind(item.date_updated.unwrap_or(now))
            .bind(&categories)
            .bind(&item.comments)
            .bind(item.reading_time)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE collections SET date_updated = ? WHERE id = ?")
            .bind(now)
            .bind(collection_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    // ========================================================================
    // Read State
    // ========================================================================

    /// Mark every unread item in the given collections as read at `when`.
    /// Returns the number of items affected.
    pub async fn mark_items_read(
        &self,
        collection_ids: &[i64],
        when: i64,
    ) -> Result<u64, StoreError> {
        if collection_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE collection_items SET date_read = ");
        builder.push_bind(when);
        builder.push(" WHERE date_read IS NULL AND collection_id IN (");
        let mut separated = builder.separated(", ");
        for id in collection_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Set or clear one item's `date_read` — the reader action, and the only
    /// externally mutable item field. Owner-scoped through the collection.
    pub async fn set_item_read(
        &self,
        owner_id: i64,
        collection_id: i64,
        item_id: i64,
        when: Option<i64>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE collection_items SET date_read = ? \
             WHERE id = ? AND collection_id = ? \
               AND EXISTS(SELECT 1 FROM collections c \
                          WHERE c.id = collection_items.collection_id AND c.owner_id = ?)",
        )
        .bind(when)
        .bind(item_id)
        .bind(collection_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
