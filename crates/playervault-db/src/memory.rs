//! In-memory store backend.
//!
//! Implements the full [`Connector`]/[`StoreConn`] contract against a
//! shared table in process memory, including the per-column width limits
//! that drive the widening path. Fault flags let tests knock out
//! connecting, probing, upserts, or widening at will, and the counters
//! expose exactly how many times each operation ran.
//!
//! This is the backend the test suites run against; nothing in it is
//! gated to test builds so embedding experiments can use it too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::row::{EntityRow, BOUNDED_COLUMNS};
use crate::store::{Connector, StoreConn};

/// Shared state behind every [`MemConn`].
#[derive(Debug, Default)]
pub struct MemTable {
    rows: Mutex<HashMap<Uuid, EntityRow>>,
    /// Current width limit per bounded column; absent means the declared
    /// default, `usize::MAX` means widened.
    widths: Mutex<HashMap<String, usize>>,
    /// Fail the next and all further [`Connector::connect`] calls.
    pub fail_connect: AtomicBool,
    /// Make every probe report the connection as dead.
    pub fail_probe: AtomicBool,
    /// Fail every upsert with [`StoreError::Unavailable`].
    pub fail_upsert: AtomicBool,
    /// Fail every widen call.
    pub fail_widen: AtomicBool,
    /// Artificial latency added to every upsert, in milliseconds.
    pub upsert_delay_ms: AtomicU64,
    /// Connections opened.
    pub connects: AtomicU64,
    /// Connections closed.
    pub closes: AtomicU64,
    /// Upserts attempted.
    pub upserts: AtomicU64,
    /// Fetches attempted.
    pub fetches: AtomicU64,
    /// Widen calls attempted.
    pub widen_calls: AtomicU64,
}

impl MemTable {
    /// Create an empty table with the declared column widths.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of rows stored.
    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    /// A copy of one entity's row, if stored.
    pub fn row(&self, id: Uuid) -> Option<EntityRow> {
        self.rows.lock().get(&id).cloned()
    }

    /// Override one bounded column's width limit.
    pub fn set_width(&self, column: &str, width: usize) {
        self.widths.lock().insert(column.to_owned(), width);
    }

    fn width_of(&self, column: &str) -> usize {
        if let Some(width) = self.widths.lock().get(column) {
            return *width;
        }
        BOUNDED_COLUMNS
            .iter()
            .find(|(name, _)| *name == column)
            .map_or(usize::MAX, |(_, width)| *width)
    }

    fn check_widths(&self, row: &EntityRow) -> Result<(), StoreError> {
        for &(column, _) in BOUNDED_COLUMNS {
            let limit = self.width_of(column);
            let too_wide = row
                .bounded_value(column)
                .is_some_and(|value| value.chars().count() > limit);
            if too_wide {
                return Err(StoreError::TooWide {
                    column: column.to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// Connector producing connections against one shared [`MemTable`].
#[derive(Clone)]
pub struct MemConnector {
    table: Arc<MemTable>,
}

impl MemConnector {
    /// Create a connector over the given table.
    pub const fn new(table: Arc<MemTable>) -> Self {
        Self { table }
    }

    /// The shared table, for inspection.
    pub fn table(&self) -> Arc<MemTable> {
        Arc::clone(&self.table)
    }
}

impl Connector for MemConnector {
    type Conn = MemConn;

    async fn connect(&self) -> Result<MemConn, StoreError> {
        if self.table.fail_connect.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(
                "memory backend refused the connection".to_owned(),
            ));
        }
        self.table.connects.fetch_add(1, Ordering::Relaxed);
        Ok(MemConn {
            table: Arc::clone(&self.table),
        })
    }
}

/// One in-memory connection.
#[derive(Debug)]
pub struct MemConn {
    table: Arc<MemTable>,
}

impl StoreConn for MemConn {
    async fn probe(&mut self) -> bool {
        !self.table.fail_probe.load(Ordering::Acquire)
    }

    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        // The table exists by construction; widths carry the schema.
        Ok(())
    }

    async fn upsert(&mut self, row: &EntityRow) -> Result<(), StoreError> {
        self.table.upserts.fetch_add(1, Ordering::Relaxed);
        let delay = self.table.upsert_delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.table.fail_upsert.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(
                "memory backend upsert fault".to_owned(),
            ));
        }
        self.table.check_widths(row)?;
        self.table.rows.lock().insert(row.id, row.clone());
        Ok(())
    }

    async fn fetch(&mut self, id: Uuid) -> Result<Option<EntityRow>, StoreError> {
        self.table.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.table.rows.lock().get(&id).cloned())
    }

    async fn widen_column(&mut self, column: &str) -> Result<(), StoreError> {
        self.table.widen_calls.fetch_add(1, Ordering::Relaxed);
        if self.table.fail_widen.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(
                "memory backend widen fault".to_owned(),
            ));
        }
        if !crate::row::is_bounded_column(column) {
            return Err(StoreError::UnknownColumn {
                column: column.to_owned(),
            });
        }
        self.table.set_width(column, usize::MAX);
        Ok(())
    }

    async fn close(self) {
        self.table.closes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use playervault_types::{Blob, EntityId, Snapshot};

    use super::*;

    fn row_for(name: &str) -> EntityRow {
        EntityRow::from_snapshot(&Snapshot::blank(EntityId::new(), name))
    }

    #[tokio::test]
    async fn upsert_then_fetch_round_trips() {
        let table = MemTable::new();
        let mut conn = MemConnector::new(Arc::clone(&table)).connect().await.unwrap();

        let row = row_for("Alice");
        conn.upsert(&row).await.unwrap();
        let fetched = conn.fetch(row.id).await.unwrap();
        assert_eq!(fetched, Some(row));
        assert_eq!(table.row_count(), 1);
    }

    #[tokio::test]
    async fn width_limit_rejects_and_widen_lifts_it() {
        let table = MemTable::new();
        let mut conn = MemConnector::new(Arc::clone(&table)).connect().await.unwrap();

        let mut snapshot = Snapshot::blank(EntityId::new(), "Alice");
        snapshot.offhand = Blob::new("x".repeat(2000));
        let row = EntityRow::from_snapshot(&snapshot);

        let err = conn.upsert(&row).await.unwrap_err();
        assert!(matches!(err, StoreError::TooWide { ref column } if column == "offhand"));

        conn.widen_column("offhand").await.unwrap();
        conn.upsert(&row).await.unwrap();
        assert_eq!(table.widen_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn widening_an_unknown_column_is_rejected() {
        let table = MemTable::new();
        let mut conn = MemConnector::new(table).connect().await.unwrap();
        let err = conn.widen_column("balance; DROP TABLE x").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn fault_flags_break_the_contracted_operations() {
        let table = MemTable::new();
        let connector = MemConnector::new(Arc::clone(&table));

        let mut conn = connector.connect().await.unwrap();
        table.fail_probe.store(true, Ordering::Release);
        assert!(!conn.probe().await);

        table.fail_upsert.store(true, Ordering::Release);
        assert!(conn.upsert(&row_for("Alice")).await.is_err());

        table.fail_connect.store(true, Ordering::Release);
        assert!(connector.connect().await.is_err());
    }
}
