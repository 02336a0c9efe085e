//! # GST Ledger Core
//!
//! GST document tax computation and party-ledger reconciliation for
//! vendor payables and customer receivables.
//!
//! ## Features
//!
//! - **GST calculations**: CGST/SGST for intrastate supply, IGST for interstate, cess on top
//! - **Documents**: purchase orders, bills, invoices, payments, returns and credit notes
//! - **Returns**: priced at the original bill terms, guarded against over-returning
//! - **Party ledgers**: append-only running balances with open items, aging and statements
//! - **Storage abstraction**: database-agnostic design with compare-and-swap appends
//!
//! ## Quick Start
//!
//! ```rust
//! use gst_ledger_core::{GstCategory, LineItemCalculator, SupplyType, TaxRateResolver};
//! use bigdecimal::BigDecimal;
//!
//! let tax = TaxRateResolver::split(&GstCategory::Higher.tax_rate(), SupplyType::Intrastate);
//! let line = LineItemCalculator::calculate(
//!     "ITEM-A",
//!     "Widget",
//!     BigDecimal::from(10),
//!     BigDecimal::from(100),
//!     BigDecimal::from(10),
//!     &tax,
//! )
//! .unwrap();
//! assert_eq!(line.line_total, BigDecimal::from(1062));
//! ```

pub mod config;
pub mod document;
pub mod ledger;
pub mod reconciliation;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use document::*;
pub use ledger::*;
pub use reconciliation::*;
pub use tax::*;
pub use traits::*;
pub use types::*;
pub use utils::memory_storage::MemoryStorage;
