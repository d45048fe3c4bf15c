//! Durable store of slave metadata and telemetry history.
//!
//! The hub only talks to the [`SlaveRepository`] and [`TelemetryRepository`]
//! traits. Two backends ship here: SQLite (sqlx) for real deployments and an
//! in-process map for tests and throwaway runs.

pub mod memory;
pub mod sqlite;
pub mod store;

pub use {
    memory::MemoryStore,
    sqlite::SqliteStore,
    store::{SlaveRepository, StoreError, StoreResult, TelemetryRepository, cancellable},
};
