//! CoreBank Ledger Engine
//!
//! Append-only double-entry ledger. Every completed transaction yields a
//! balanced set of debit/credit rows; corrections happen only through new
//! entries owned by a reversal transaction, never by update or delete.

pub mod engine;
pub mod entry;

pub use engine::LedgerEngine;
pub use entry::{EntrySet, LedgerEntry};
