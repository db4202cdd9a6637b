//! Scoped database handles
//!
//! Every request acquires exactly one [`DbHandle`] and hands it to the
//! collaborators it calls. The handle is released when it is dropped, so
//! early returns, errors and panics all give it back.

use std::fmt;
use std::sync::Arc;

/// Connection source for request-lifetime handles
///
/// The driver itself lives outside the gateway; this trait only models
/// acquisition and release.
pub trait Database: Send + Sync {
    /// Open a handle and return its ID
    fn open(&self) -> u64;

    /// Release a handle previously returned by [`Database::open`]
    fn release(&self, id: u64);

    /// Backend name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// A request-lifetime database handle, released on drop
pub struct DbHandle {
    id: u64,
    database: Arc<dyn Database>,
}

impl DbHandle {
    /// Acquire a handle from `database`
    pub fn acquire(database: &Arc<dyn Database>) -> Self {
        let id = database.open();
        Self {
            id,
            database: Arc::clone(database),
        }
    }

    /// Handle ID, unique per acquisition
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbHandle")
            .field("id", &self.id)
            .field("database", &self.database.name())
            .finish()
    }
}

impl Drop for DbHandle {
    fn drop(&mut self) {
        self.database.release(self.id);
    }
}
