//! Threading seams, staged imports, caching, and configuration for
//! Playervault.
//!
//! This crate owns everything that runs against the host game runtime
//! without touching a database: the owner-thread capability seam, the
//! tick-driven task queue, the staged achievement-catalog build, the
//! per-entity completion-set import state machine, and the bounded
//! entity cache.
//!
//! # Modules
//!
//! - [`cache`] -- Bounded TTL + LRU cache for serialized entity state.
//! - [`catalog`] -- Process-wide achievement catalog with a staged,
//!   batch-per-tick build.
//! - [`config`] -- Configuration loading from YAML into strongly-typed
//!   structs.
//! - [`dispatch`] -- [`Dispatcher`] trait, the tick-drained owner task
//!   queue, and the `owner_call` round-trip helper.
//! - [`host`] -- [`Host`] trait abstracting the game runtime, plus
//!   [`StubHost`] for tests.
//! - [`import`] -- Per-entity staged completion-set import coordinator.
//! - [`walker`] -- Bounded batch walking over a paged source.
//!
//! [`Dispatcher`]: dispatch::Dispatcher
//! [`Host`]: host::Host
//! [`StubHost`]: host::StubHost

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod host;
pub mod import;
pub mod walker;

pub use cache::EntityCache;
pub use catalog::{AchievementCatalog, CatalogStatus};
pub use config::{CacheConfig, ConfigError, ImportConfig, PersistConfig, PoolConfig, VaultConfig};
pub use dispatch::{owner_call, Dispatcher, OwnerTask, TickQueue};
pub use host::{AttributeApply, Host, StubHost};
pub use import::{ImportCoordinator, ImportPhase};
pub use walker::{BatchWalker, Page, WalkStatus};
