//! Lumina Market Core
//!
//! Escrow ledger, storage, and row-locking foundation for the Lumina
//! marketplace, where completing a trade lights up the seller's province on
//! the buyer's map.
//!
//! # Architecture
//!
//! - **Atomic units**: Every multi-entity mutation stages into one RocksDB
//!   `WriteBatch` and commits exactly once
//! - **Pessimistic row locks**: Operations lock the rows they mutate before
//!   re-reading and validating them
//! - **Audit log**: Every balance move and transition records a structured
//!   event in the same unit as the mutation
//!
//! # Invariants
//!
//! - Escrow conservation: available + frozen changes only through ledger
//!   operations, and every release nets to zero across the two accounts
//! - Balances never negative: freeze/release/refund check before they move
//! - One reward per account pair per province, ever
//! - Order status only moves along the allowed-transition table

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod audit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use audit::{AuditEvent, AuditKind};
pub use config::Config;
pub use error::{Error, Result};
pub use locks::{KeyedLocks, LockKey, LockSet};
pub use metrics::Metrics;
pub use storage::{Storage, StorageStats, UnitOfWork};
pub use types::{
    Account, AccountId, Footprint, Order, OrderId, OrderStatus, PairKey, PairLock, Product,
    ProductId, ProductStatus, Province, ShippingAddress, Title,
};
