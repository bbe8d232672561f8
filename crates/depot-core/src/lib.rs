//! # depot-core: Pure Domain Logic for Depot
//!
//! This crate holds the vocabulary of the stock ledger: what a stock record
//! is, what a ledger entry looks like, how an invoice line is priced and how
//! a shift is reconciled. It performs no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Depot Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │      Callers (POS terminals, back office, AuthZ already done)   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    depot-db (processors)                        │   │
//! │  │   SaleProcessor  AdjustmentProcessor  TransferProcessor  Shifts │   │
//! │  │                 └──────────┬──────────┘                         │   │
//! │  │                   StockLedgerEngine                             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses types from                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ depot-core (THIS CRATE) ★                       │   │
//! │  │   types  invoice  shift  money  pricing  validation  error      │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stock records, ledger entries, entry types, reason codes
//! - [`invoice`] - Sale requests, invoices and their line items
//! - [`shift`] - POS cash sessions
//! - [`money`] - Integer money arithmetic (no floating point!)
//! - [`pricing`] - Invoice line and header totals
//! - [`validation`] - Input rules checked before any mutation
//! - [`error`] - The stock error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use depot_core::money::Money;
//! use depot_core::types::Rate;
//!
//! let price = Money::from_cents(1000);
//! let tax = price.apply_rate(Rate::from_bps(825));
//! assert_eq!(tax.cents(), 83);
//! ```

pub mod error;
pub mod invoice;
pub mod money;
pub mod pricing;
pub mod shift;
pub mod types;
pub mod validation;

pub use error::{LineFailure, LineFailureReason, StockError, StockResult, TransferLeg, ValidationError};
pub use invoice::*;
pub use money::Money;
pub use shift::*;
pub use types::*;

/// Maximum number of lines accepted on a single invoice.
pub const MAX_INVOICE_LINES: usize = 200;
