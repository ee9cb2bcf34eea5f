//! Embedded key-value storage backend for expensedb.
//!
//! Records live in a single redb file split into three tables: primary
//! records keyed by a sequence number, an index from external id to
//! sequence number, and the sequence state itself.

mod driver;
pub mod slots;

pub use driver::{derive_expense_id, EmbeddedDriver, ReconcileReport};
pub use slots::{scan_window, Slot, SlotWindow};
