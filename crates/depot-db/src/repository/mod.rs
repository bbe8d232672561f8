//! # Repository Module
//!
//! Storage access for Depot, one repository per table family.
//!
//! ## Two Access Levels
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pool-level (pub)                 Connection-level (pub(crate))         │
//! │  ─────────────────                ──────────────────────────────        │
//! │  StockRepository::get             stock::try_debit / upsert_credit      │
//! │  LedgerRepository::history        ledger::append                        │
//! │  InvoiceRepository::get_detail    invoice::insert / mark_canceled       │
//! │  ShiftRepository::find_open       shift::add_sale                       │
//! │  OutboxRepository::get_pending    outbox::enqueue                       │
//! │                                                                         │
//! │  Reads for reporting.             Writes composed into one transaction  │
//! │                                   by the engine and the processors.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`StockRepository`] - StockRecord store (reads, thresholds)
//! - [`LedgerRepository`] - Ledger history queries
//! - [`CatalogRepository`] - Products and warehouses
//! - [`InvoiceRepository`] - Invoices and lines
//! - [`ShiftRepository`] - POS shifts
//! - [`OutboxRepository`] - Events for external collaborators
//! - [`IncidentRepository`] - Reconciliation incidents

pub mod catalog;
pub mod incident;
pub mod invoice;
pub mod ledger;
pub mod outbox;
pub mod shift;
pub mod stock;

pub use catalog::{CatalogRepository, NewProduct};
pub use incident::{Incident, IncidentKind, IncidentRepository};
pub use invoice::InvoiceRepository;
pub use ledger::LedgerRepository;
pub use outbox::{OutboxEntry, OutboxRepository};
pub use shift::ShiftRepository;
pub use stock::StockRepository;
