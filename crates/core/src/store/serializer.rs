//! Write serialization for the shared store connection.
//!
//! SQLite tolerates one writer at a time. Every mutating operation across
//! every table adapter funnels through one [`WriteSerializer`] so concurrent
//! sync jobs and user actions never race on the connection. Reads do not go
//! through the serializer; they rely on the store's own locking.

use std::future::Future;

use tokio::sync::Mutex;

/// A one-permit async queue for mutating operations.
///
/// Operations run in arrival order. A failing or panicking operation releases
/// the permit on unwind, so it rejects its own caller without wedging the
/// queue for subsequent operations.
#[derive(Debug, Default)]
pub struct WriteSerializer {
    permit: Mutex<()>,
}

impl WriteSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` once the permit is acquired, releasing it on all exit paths.
    pub async fn run<T, F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.permit.lock().await;
        op().await
    }
}
