#![warn(clippy::unwrap_used)]

pub mod model;
pub mod provider;
pub mod refresh;

pub use model::{Catalog, CatalogOs, CatalogSegment, Conversion, CreativeAdRef, CreativeSet};
pub use provider::CatalogProvider;
pub use refresh::{CatalogRefresher, CatalogSource, FetchError, RefreshOutcome};
