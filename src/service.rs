//! The operation surface a request layer calls.
//!
//! [`Service`] is the explicitly constructed context shared by every
//! operation: the database pool, one HTTP client, configuration, a per-owner
//! mutation lock map, and the single-flight set for refreshes. Structural
//! mutations (create/update/move/delete) serialize per owner because sibling
//! renumbering touches whole groups; owners never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{self, FeedInfo};
use crate::refresh::{refresh_collections, InFlight, RefreshOutcome};
use crate::storage::{
    Collection, CollectionUpdate, Database, Icon, Item, Layout, StoredCollection,
    DEFAULT_REFRESH_INTERVAL_MINUTES,
};
use crate::tree::{self, CollectionNode};
use crate::util::{normalize_url, slugify};

/// Request-layer input for creating a collection. Id, slug, and sibling
/// order are derived, never supplied.
#[derive(Debug, Clone, Default)]
pub struct NewCollection {
    pub title: String,
    pub icon: Option<Icon>,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub refresh_interval: Option<i64>,
    pub layout: Option<Layout>,
}

/// Replacement fields for an update. Changing `parent_id` is a move and is
/// validated like one.
#[derive(Debug, Clone, Default)]
pub struct UpdateCollection {
    pub title: String,
    pub icon: Option<Icon>,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub refresh_interval: Option<i64>,
}

pub struct Service {
    db: Database,
    client: reqwest::Client,
    config: Config,
    owner_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    in_flight: InFlight,
}

impl Service {
    pub fn new(db: Database, client: reqwest::Client, config: Config) -> Self {
        Self {
            db,
            client,
            config,
            owner_locks: Mutex::new(HashMap::new()),
            in_flight: InFlight::new(),
        }
    }

    /// The lock serializing structural mutations for one owner.
    async fn owner_lock(&self, owner_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        locks.entry(owner_id).or_default().clone()
    }

    // ========================================================================
    // Tree Reads
    // ========================================================================

    /// The owner's forest in display order (depth, then sibling order), each
    /// node carrying its ancestor chain, depth, and subtree unread count.
    pub async fn list_tree(&self, owner_id: i64) -> Result<Vec<CollectionNode>> {
        let collections = self.db.collections_for_owner(owner_id).await?;
        let unread = self.db.unread_counts(owner_id).await?;
        Ok(tree::flatten_forest(collections, &unread))
    }

    /// Ids of the subtree rooted at `root_id`, the root included.
    pub async fn list_descendant_ids(&self, owner_id: i64, root_id: i64) -> Result<Vec<i64>> {
        let collections = self.db.collections_for_owner(owner_id).await?;
        let ids = tree::descendant_ids(&collections, root_id);
        if ids.is_empty() {
            return Err(Error::NotFound("collection"));
        }
        Ok(ids)
    }

    /// Items of one collection, newest first.
    pub async fn list_items(&self, owner_id: i64, collection_id: i64) -> Result<Vec<Item>> {
        if self.db.collection(owner_id, collection_id).await?.is_none() {
            return Err(Error::NotFound("collection"));
        }
        Ok(self.db.items_for_collection(collection_id).await?)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create_collection(&self, owner_id: i64, spec: NewCollection) -> Result<Collection> {
        let lock = self.owner_lock(owner_id).await;
        let _guard = lock.lock().await;

        let title = validated_title(&spec.title)?;
        let refresh_interval = validated_interval(spec.refresh_interval)?;
        let url = spec.url.as_deref().map(normalize_url).transpose()?;

        if let Some(url) = &url {
            if self.db.has_collection_with_url(owner_id, url, None).await? {
                return Err(Error::DuplicateFeed);
            }
        }
        if let Some(parent_id) = spec.parent_id {
            if self.db.collection(owner_id, parent_id).await?.is_none() {
                return Err(Error::NotFound("parent collection"));
            }
        }

        let stored = StoredCollection {
            owner_id,
            slug: slugify(&title),
            title,
            icon: spec.icon.unwrap_or_default(),
            parent_id: spec.parent_id,
            description: spec.description,
            url,
            refresh_interval,
            layout: spec.layout.unwrap_or_default(),
        };
        let created = self.db.create_collection(&stored).await?;
        tracing::info!(
            collection_id = created.id,
            owner_id = owner_id,
            "collection created"
        );
        Ok(created)
    }

    pub async fn update_collection(
        &self,
        owner_id: i64,
        id: i64,
        spec: UpdateCollection,
    ) -> Result<Collection> {
        let lock = self.owner_lock(owner_id).await;
        let _guard = lock.lock().await;

        let existing = self
            .db
            .collection(owner_id, id)
            .await?
            .ok_or(Error::NotFound("collection"))?;

        let title = validated_title(&spec.title)?;
        let refresh_interval = validated_interval(spec.refresh_interval)?;
        let url = spec.url.as_deref().map(normalize_url).transpose()?;
        if let Some(url) = &url {
            if self
                .db
                .has_collection_with_url(owner_id, url, Some(id))
                .await?
            {
                return Err(Error::DuplicateFeed);
            }
        }

        // A parent change is a move: reject cycles, land at the end of the
        // new sibling group, and let renumbering keep both groups dense.
        let mut sort_order = None;
        if spec.parent_id != existing.parent_id {
            let collections = self.db.collections_for_owner(owner_id).await?;
            if let Some(new_parent) = spec.parent_id {
                let subtree = tree::descendant_ids(&collections, id);
                if subtree.contains(&new_parent) {
                    return Err(Error::Validation(
                        "cannot move a collection into its own subtree".to_string(),
                    ));
                }
                if !collections.iter().any(|c| c.id == new_parent) {
                    return Err(Error::NotFound("parent collection"));
                }
            }
            let siblings = collections
                .iter()
                .filter(|c| c.parent_id == spec.parent_id && c.id != id)
                .count();
            sort_order = Some(siblings as i64);
        }

        let update = CollectionUpdate {
            slug: slugify(&title),
            title,
            icon: spec.icon.unwrap_or_default(),
            parent_id: spec.parent_id,
            description: spec.description,
            url,
            refresh_interval,
            sort_order,
        };
        if !self.db.update_collection(owner_id, id, &update).await? {
            return Err(Error::NotFound("collection"));
        }

        self.db
            .collection(owner_id, id)
            .await?
            .ok_or(Error::NotFound("collection"))
    }

    /// Reparent and/or reorder a node. After the call the moved node occupies
    /// `new_order` (clamped to `[0, child_count]`) among `new_parent_id`'s
    /// children and both affected sibling groups are contiguous again.
    /// Returns the updated tree.
    pub async fn move_collection(
        &self,
        owner_id: i64,
        id: i64,
        new_parent_id: Option<i64>,
        new_order: i64,
    ) -> Result<Vec<CollectionNode>> {
        let lock = self.owner_lock(owner_id).await;
        let guard = lock.lock().await;

        let collections = self.db.collections_for_owner(owner_id).await?;
        let subtree = tree::descendant_ids(&collections, id);
        if subtree.is_empty() {
            return Err(Error::NotFound("collection"));
        }
        if let Some(new_parent) = new_parent_id {
            if subtree.contains(&new_parent) {
                return Err(Error::Validation(
                    "cannot move a collection into its own subtree".to_string(),
                ));
            }
            if !collections.iter().any(|c| c.id == new_parent) {
                return Err(Error::NotFound("parent collection"));
            }
        }

        let plan = tree::plan_move(&collections, id, new_parent_id, new_order)
            .ok_or(Error::NotFound("collection"))?;
        if !self
            .db
            .move_collection(owner_id, id, new_parent_id, &plan.assignments)
            .await?
        {
            return Err(Error::NotFound("collection"));
        }
        tracing::info!(
            collection_id = id,
            new_parent = ?new_parent_id,
            new_order = plan.new_order,
            "collection moved"
        );

        drop(guard);
        self.list_tree(owner_id).await
    }

    /// Delete a node with all descendants and their items. Returns the
    /// deleted id set.
    pub async fn delete_collection(&self, owner_id: i64, id: i64) -> Result<Vec<i64>> {
        let lock = self.owner_lock(owner_id).await;
        let _guard = lock.lock().await;

        let collections = self.db.collections_for_owner(owner_id).await?;
        let ids = tree::descendant_ids(&collections, id);
        if ids.is_empty() {
            return Err(Error::NotFound("collection"));
        }

        if !self.db.delete_collection(owner_id, id).await? {
            return Err(Error::NotFound("collection"));
        }
        tracing::info!(
            collection_id = id,
            deleted = ids.len(),
            "collection subtree deleted"
        );
        Ok(ids)
    }

    /// Mark every unread item in the subtree rooted at `id` as read at
    /// `when`. Returns the affected collection ids so callers can refresh
    /// unread badges.
    pub async fn mark_subtree_read(&self, owner_id: i64, id: i64, when: i64) -> Result<Vec<i64>> {
        let collections = self.db.collections_for_owner(owner_id).await?;
        let ids = tree::descendant_ids(&collections, id);
        if ids.is_empty() {
            return Err(Error::NotFound("collection"));
        }
        self.db.mark_items_read(&ids, when).await?;
        Ok(ids)
    }

    pub async fn set_layout(&self, owner_id: i64, id: i64, layout: Layout) -> Result<()> {
        if !self.db.set_layout(owner_id, id, layout).await? {
            return Err(Error::NotFound("collection"));
        }
        Ok(())
    }

    /// Set or clear one item's read timestamp — the reader action.
    pub async fn set_item_read(
        &self,
        owner_id: i64,
        collection_id: i64,
        item_id: i64,
        when: Option<i64>,
    ) -> Result<()> {
        if !self
            .db
            .set_item_read(owner_id, collection_id, item_id, when)
            .await?
        {
            return Err(Error::NotFound("item"));
        }
        Ok(())
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    /// Validate a candidate feed URL without persisting anything. Fails with
    /// [`Error::DuplicateFeed`] if the owner already tracks the normalized
    /// URL.
    pub async fn probe_feed(&self, owner_id: i64, url: &str) -> Result<FeedInfo> {
        let normalized = normalize_url(url)?;
        if self
            .db
            .has_collection_with_url(owner_id, &normalized, None)
            .await?
        {
            return Err(Error::DuplicateFeed);
        }
        Ok(feed::probe_feed(
            &self.client,
            &normalized,
            self.config.fetch_timeout(),
            self.config.max_feed_size_bytes,
        )
        .await?)
    }

    /// Collections whose refresh interval has elapsed; never returns a
    /// collection without a url.
    pub async fn list_due(&self, owner_id: i64) -> Result<Vec<Collection>> {
        let now = chrono::Utc::now().timestamp();
        Ok(self.db.due_collections(owner_id, now).await?)
    }

    pub async fn refresh_one(&self, owner_id: i64, id: i64) -> Result<RefreshOutcome> {
        let collection = self
            .db
            .collection(owner_id, id)
            .await?
            .ok_or(Error::NotFound("collection"))?;
        let targets = if collection.url.is_some() {
            vec![collection]
        } else {
            Vec::new()
        };
        Ok(self.refresh_targets(targets).await)
    }

    /// Refresh every collection in the subtree rooted at `root_id` that has
    /// a url.
    pub async fn refresh_subtree(&self, owner_id: i64, root_id: i64) -> Result<RefreshOutcome> {
        let collections = self.db.collections_for_owner(owner_id).await?;
        let subtree = tree::descendant_ids(&collections, root_id);
        if subtree.is_empty() {
            return Err(Error::NotFound("collection"));
        }
        let targets = collections
            .into_iter()
            .filter(|c| subtree.contains(&c.id) && c.url.is_some())
            .collect();
        Ok(self.refresh_targets(targets).await)
    }

    /// Refresh every owned collection with a url.
    pub async fn refresh_all(&self, owner_id: i64) -> Result<RefreshOutcome> {
        let targets = self
            .db
            .collections_for_owner(owner_id)
            .await?
            .into_iter()
            .filter(|c| c.url.is_some())
            .collect();
        Ok(self.refresh_targets(targets).await)
    }

    /// Refresh everything currently due — the background trigger entry point.
    pub async fn refresh_due(&self, owner_id: i64) -> Result<RefreshOutcome> {
        let targets = self.list_due(owner_id).await?;
        Ok(self.refresh_targets(targets).await)
    }

    async fn refresh_targets(&self, targets: Vec<Collection>) -> RefreshOutcome {
        refresh_collections(
            &self.db,
            &self.client,
            &self.config,
            &self.in_flight,
            targets,
        )
        .await
    }
}

fn validated_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validated_interval(minutes: Option<i64>) -> Result<i64> {
    match minutes {
        None => Ok(DEFAULT_REFRESH_INTERVAL_MINUTES),
        Some(m) if m > 0 => Ok(m),
        Some(m) => Err(Error::Validation(format!(
            "refresh interval must be positive, got {m}"
        ))),
    }
}
