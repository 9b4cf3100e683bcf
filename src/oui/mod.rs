//! IEEE OUI registry cache: download, parse, persist and look up vendors.

mod address;
pub mod cache;
pub mod fetcher;
pub mod parser;
mod store;
pub mod types;

pub use cache::{DEFAULT_SEARCH_LIMIT, OuiCache};
pub use fetcher::HttpRegistryFetcher;
pub use store::Store;
pub use types::{BatchEntry, CacheError, RefreshOutcome};
