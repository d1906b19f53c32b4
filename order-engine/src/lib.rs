//! Lumina order engine
//!
//! Escrow marketplace flows on top of [`market_core`]: the order lifecycle
//! (create, ship, confirm, refund), the map-lighting reward pipeline with
//! its anti-fraud pair dedup, title promotion, and the auto-confirm sweep.
//!
//! # Lifecycle
//!
//! 1. **Create**: buyer's funds freeze into escrow, one unit of stock is taken
//! 2. **Ship**: seller records carrier details; the auto-confirm clock starts
//! 3. **Confirm**: escrow releases to the seller and the buyer's map may light
//! 4. **Refund**: buyer may request one before confirmation; arbitration
//!    either returns the money or resumes the order
//!
//! # Example
//!
//! ```no_run
//! use order_engine::{EngineConfig, OrderEngine};
//!
//! # fn main() -> order_engine::Result<()> {
//! let engine = OrderEngine::open(EngineConfig::default())?;
//! println!("{} titles configured", engine.titles().len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod catalog;
pub mod config;
pub mod directory;
pub mod engine;
pub mod lighting;
pub mod scheduler;
pub mod titles;
pub mod types;

// Re-exports
pub use market_core::{Error, Result};

pub use catalog::ProductCatalog;
pub use config::{default_titles, EngineConfig, TitleSeed};
pub use directory::AccountDirectory;
pub use engine::OrderEngine;
pub use scheduler::{AutoConfirmSweep, SweepStats};
pub use titles::TitleCatalog;
pub use types::{
    LightingOutcome, ListingRequest, MapProgress, OrderRole, ProductFilter, Shipment,
};
