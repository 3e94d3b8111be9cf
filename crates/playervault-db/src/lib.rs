//! Store layer for Playervault.
//!
//! `PostgreSQL` is the system of record: one wide table, one row per
//! entity, one column per synchronized attribute. This crate owns the
//! bounded connection pool above it, the capture-then-persist save/load
//! engine, and the [`PersistenceService`] facade an embedding host
//! drives from its tick loop.
//!
//! # Modules
//!
//! - [`engine`] -- Save/load engine with the self-healing column-widen
//!   path.
//! - [`error`] -- [`StoreError`] and [`PoolError`].
//! - [`memory`] -- In-memory backend used by the test suites.
//! - [`pool`] -- Bounded connection pool with capped backoff.
//! - [`postgres`] -- The `PostgreSQL` backend.
//! - [`row`] -- The wide-table row shape and schema description.
//! - [`service`] -- The [`PersistenceService`] facade.
//! - [`store`] -- The [`Connector`]/[`StoreConn`] backend seam.
//!
//! [`Connector`]: store::Connector
//! [`StoreConn`]: store::StoreConn

pub mod engine;
pub mod error;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod row;
pub mod service;
pub mod store;

pub use engine::PersistenceEngine;
pub use error::{PoolError, StoreError};
pub use memory::{MemConnector, MemTable};
pub use pool::ResourcePool;
pub use postgres::{PgConn, PgConnector};
pub use row::EntityRow;
pub use service::PersistenceService;
pub use store::{Connector, StoreConn};
