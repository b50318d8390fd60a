use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, Transaction};

use super::schema::Database;
use super::types::{
    Collection, CollectionRow, CollectionUpdate, Layout, StoreError, StoredCollection,
    COLLECTION_COLUMNS,
};
use crate::tree;

impl Database {
    // ========================================================================
    // Collection Reads
    // ========================================================================

    /// Fetch a single collection scoped to its owner.
    pub async fn collection(
        &self,
        owner_id: i64,
        id: i64,
    ) -> Result<Option<Collection>, StoreError> {
        let sql =
            format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ? AND owner_id = ?");
        let row: Option<CollectionRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Collection::from_row))
    }

    /// All of an owner's collections as a flat parent-pointer list.
    /// Tree order is materialized in memory by [`crate::tree`].
    pub async fn collections_for_owner(
        &self,
        owner_id: i64,
    ) -> Result<Vec<Collection>, StoreError> {
        let sql = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE owner_id = ? ORDER BY sort_order, id"
        );
        let rows: Vec<CollectionRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Collection::from_row).collect())
    }

    /// Direct unread item counts per collection. Collections with no items
    /// report 0, not null.
    pub async fn unread_counts(&self, owner_id: i64) -> Result<HashMap<i64, i64>, StoreError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                c.id,
                COUNT(CASE WHEN i.id IS NOT NULL AND i.date_read IS NULL THEN 1 END)
            FROM collections c
            LEFT JOIN collection_items i ON i.collection_id = c.id
            WHERE c.owner_id = ?
            GROUP BY c.id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Collections whose refresh interval has elapsed (or that never
    /// refreshed), urls only — never returns a collection without one.
    pub async fn due_collections(
        &self,
        owner_id: i64,
        now: i64,
    ) -> Result<Vec<Collection>, StoreError> {
        let sql = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections \
             WHERE owner_id = ? AND url IS NOT NULL \
               AND (date_updated IS NULL OR date_updated + refresh_interval * 60 <= ?) \
             ORDER BY sort_order, id"
        );
        let rows: Vec<CollectionRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Collection::from_row).collect())
    }

    /// Whether the owner already tracks this normalized feed URL,
    /// optionally excluding one collection (for updates).
    pub async fn has_collection_with_url(
        &self,
        owner_id: i64,
        url: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM collections \
             WHERE owner_id = ? AND url = ? AND (? IS NULL OR id != ?))",
        )
        .bind(owner_id)
        .bind(url)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 != 0)
    }

    // ========================================================================
    // Collection Mutations
    // ========================================================================

    /// Insert a collection appended after its siblings, renumbering the
    /// owner's groups in the same transaction.
    pub async fn create_collection(
        &self,
        new: &StoredCollection,
    ) -> Result<Collection, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (sibling_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM collections WHERE owner_id = ? AND parent_id IS ?",
        )
        .bind(new.owner_id)
        .bind(new.parent_id)
        .fetch_one(&mut *tx)
        .await?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO collections \
             (owner_id, title, slug, icon, parent_id, sort_order, description, url, refresh_interval, layout) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new.owner_id)
        .bind(&new.title)
        .bind(&new.slug)
        .bind(new.icon.as_str())
        .bind(new.parent_id)
        .bind(sibling_count)
        .bind(&new.description)
        .bind(&new.url)
        .bind(new.refresh_interval)
        .bind(new.layout.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        self.renumber_within(&mut tx, new.owner_id).await?;
        tx.commit().await?;

        self.collection(new.owner_id, id)
            .await?
            .ok_or(StoreError::Other(sqlx::Error::RowNotFound))
    }

    /// Replace a collection's fields. When `update.sort_order` is set (a
    /// reparenting update), the node lands there before renumbering makes
    /// the group dense again. Returns false if the row does not exist.
    pub async fn update_collection(
        &self,
        owner_id: i64,
        id: i64,
        update: &CollectionUpdate,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE collections SET \
                title = ?, slug = ?, icon = ?, parent_id = ?, description = ?, url = ?, \
                refresh_interval = ?, sort_order = COALESCE(?, sort_order) \
             WHERE id = ? AND owner_id = ?",
        )
        .bind(&update.title)
        .bind(&update.slug)
        .bind(update.icon.as_str())
        .bind(update.parent_id)
        .bind(&update.description)
        .bind(&update.url)
        .bind(update.refresh_interval)
        .bind(update.sort_order)
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.renumber_within(&mut tx, owner_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Reparent/reorder a node: one parent_id write plus the batch of
    /// sibling order assignments planned by [`tree::plan_move`], atomically.
    pub async fn move_collection(
        &self,
        owner_id: i64,
        id: i64,
        new_parent_id: Option<i64>,
        assignments: &[(i64, i64)],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE collections SET parent_id = ? WHERE id = ? AND owner_id = ?")
                .bind(new_parent_id)
                .bind(id)
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.apply_sort_orders(&mut tx, assignments).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Delete a node; descendants and their items go with it via
    /// `ON DELETE CASCADE`, remaining groups are renumbered in the same
    /// transaction. Returns false if the row does not exist.
    pub async fn delete_collection(&self, owner_id: i64, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM collections WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.renumber_within(&mut tx, owner_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Global invariant repair: reassign every sibling group 0..n-1, stable
    /// by previous order then id.
    pub async fn recalculate_order(&self, owner_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        self.renumber_within(&mut tx, owner_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Display-hint update; no structural effects.
    pub async fn set_layout(
        &self,
        owner_id: i64,
        id: i64,
        layout: Layout,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE collections SET layout = ? WHERE id = ? AND owner_id = ?")
            .bind(layout.as_str())
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Renumbering
    // ========================================================================

    async fn renumber_within(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        owner_id: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE owner_id = ? ORDER BY sort_order, id"
        );
        let rows: Vec<CollectionRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_all(&mut **tx)
            .await?;
        let collections: Vec<Collection> = rows.into_iter().map(Collection::from_row).collect();

        let assignments = tree::plan_renumber(&collections);
        self.apply_sort_orders(tx, &assignments).await
    }

    /// Persist a batch of (id, sort_order) assignments as one CASE update.
    /// A row-count mismatch means the plan raced something it shouldn't
    /// have and aborts the transaction.
    async fn apply_sort_orders(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        assignments: &[(i64, i64)],
    ) -> Result<(), StoreError> {
        if assignments.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE collections SET sort_order = CASE id ");
        for (id, sort_order) in assignments {
            builder.push("WHEN ");
            builder.push_bind(*id);
            builder.push(" THEN ");
            builder.push_bind(*sort_order);
            builder.push(" ");
        }
        builder.push("END WHERE id IN (");
        let mut separated = builder.separated(", ");
        for (id, _) in assignments {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&mut **tx).await?;
        if result.rows_affected() != assignments.len() as u64 {
            return Err(StoreError::RenumberMismatch {
                expected: assignments.len() as u64,
                actual: result.rows_affected(),
            });
        }
        Ok(())
    }
}
