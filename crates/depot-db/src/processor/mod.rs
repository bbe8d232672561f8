//! # Processors
//!
//! Business operations built on the [`crate::engine`] primitives.
//!
//! ```text
//! ┌──────────────────┐  ┌──────────────────────┐  ┌───────────────────────┐
//! │  SaleProcessor   │  │ AdjustmentProcessor  │  │  TransferProcessor<L> │
//! │  all lines in    │  │ reason code on every │  │  debit → credit,      │
//! │  one transaction │  │ manual correction    │  │  compensate on fail   │
//! └────────┬─────────┘  └──────────┬───────────┘  └───────────┬───────────┘
//!          │ debit_in (same tx)    │ adjust / count           │ StockLedger
//!          ▼                       ▼                          ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StockLedgerEngine                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!          │ record sale (same tx)
//!          ▼
//! ┌──────────────────┐
//! │  ShiftRegister   │  never touches stock
//! └──────────────────┘
//! ```

pub mod adjustment;
pub mod sale;
pub mod shift;
pub mod transfer;

pub use adjustment::AdjustmentProcessor;
pub use sale::SaleProcessor;
pub use shift::ShiftRegister;
pub use transfer::TransferProcessor;
