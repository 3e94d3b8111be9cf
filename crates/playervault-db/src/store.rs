//! The store seam: how the persistence layer talks to a backing store.
//!
//! The engine and the pool are generic over a [`Connector`], so the same
//! code runs against `PostgreSQL` in production and the in-memory backend
//! in tests. The futures these traits return are `Send`; pooled
//! connections cross worker tasks freely.

use std::future::Future;

use uuid::Uuid;

use crate::error::StoreError;
use crate::row::EntityRow;

/// Factory for store connections.
pub trait Connector: Send + Sync + 'static {
    /// The connection type this connector produces.
    type Conn: StoreConn;

    /// Open one new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Conn, StoreError>> + Send;
}

/// One live store connection.
///
/// Connections are owned exclusively by whoever checked them out; no
/// method takes `&self`. A connection that fails [`probe`](Self::probe)
/// must be closed, not reused.
pub trait StoreConn: Send + 'static {
    /// Whether the connection is still usable.
    fn probe(&mut self) -> impl Future<Output = bool> + Send;

    /// Create the wide table if absent and add any missing columns.
    ///
    /// Strictly additive: present columns are never dropped or retyped.
    fn ensure_schema(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or fully replace one entity's row.
    fn upsert(&mut self, row: &EntityRow) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch one entity's row, if it exists.
    fn fetch(
        &mut self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<EntityRow>, StoreError>> + Send;

    /// Remove one width limit: retype the named bounded column to
    /// unlimited text.
    fn widen_column(
        &mut self,
        column: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Close the connection, releasing its server-side resources.
    fn close(self) -> impl Future<Output = ()> + Send;
}
