//! Pool Ledger Common Library
//!
//! Shared types, constants, and utilities for the pooled-deposit ledger.
//!
//! ## Contents
//!
//! - **Constants**: fixed-point widths, rescale thresholds, emission parameters
//! - **Errors**: typed `LedgerError` with stable codes
//! - **Types**: depositor and front-end identity, snapshots, request and result records
//! - **Math**: 256-bit intermediates and the scaled-sum formulas
//! - **Events**: typed ledger events and the `EventLog` collector
//! - **Config**: runtime `LedgerConfig` with CBOR encoding

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod config;
#[macro_use]
pub mod macros;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use config::*;
