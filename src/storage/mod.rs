mod records;
mod schema;
mod types;

pub use schema::SqliteCacheStore;
pub use types::{CacheRecord, CacheStore, StoreError, TableSpec};
