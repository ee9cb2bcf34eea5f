//! Core types and traits for expensedb storage backends.
//!
//! This crate provides the `ExpensesRepository` trait and all associated types,
//! enabling pluggable storage implementations in separate crates. The partial
//! update policy lives here so every backend applies it the same way.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{timestamp_now, Currency, Expense};
pub use models::write::{
    CreateExpenseRequest, ExpenseUpdate, NewExpense, UpdateExpenseRequest, ValidationError, MAX_PRICE_INTEGER_DIGITS,
    MAX_PRICE_SCALE, MAX_TITLE_CHARS,
};
pub use models::read::{PageRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
pub use storage::{BoxError, ErrorKind, ExpensesRepository, RepositoryError};
