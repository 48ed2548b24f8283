//! Snapshot holder for the installed catalog.
//! Readers clone an `Arc` and keep using it while a refresh installs a new one.

use crate::model::Catalog;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

pub struct CatalogProvider {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Latest installed snapshot.
    pub fn current(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Replace the snapshot. Returns the one it replaced.
    pub fn install(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        info!(
            catalog_id = %next.catalog_id,
            version = next.version,
            creative_sets = next.len(),
            "Catalog installed"
        );
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl Default for CatalogProvider {
    fn default() -> Self {
        Self::new(Catalog::default())
    }
}
