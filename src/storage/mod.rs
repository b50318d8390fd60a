mod collections;
mod items;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    Collection, CollectionUpdate, Icon, Item, Layout, ParsedItem, StoreError, StoredCollection,
    DEFAULT_REFRESH_INTERVAL_MINUTES,
};
