//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::Database;
use crate::ident::Allocator;
use crate::lifecycle::LifecycleController;
use crate::notify::Notifier;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Database,
    allocator: Allocator,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        let allocator = Allocator::new(&db);
        Self {
            inner: Arc::new(AppStateInner {
                db,
                allocator,
                notifier,
            }),
        }
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    /// Get a reference to the identifier allocator.
    pub fn allocator(&self) -> &Allocator {
        &self.inner.allocator
    }

    /// Get a reference to the notification gateway.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    /// Build a lifecycle controller over this state's database and notifier.
    pub fn lifecycle(&self) -> LifecycleController {
        LifecycleController::new(self.inner.db.clone(), self.inner.notifier.clone())
    }
}
