//! expensedb: expense records over interchangeable storage backends.
//!
//! The backend is picked once from configuration (`open_repository`) and
//! used afterwards only through `ExpensesRepository`.

pub mod config;
pub mod logging;
pub mod repository;
pub mod service;

pub use repository::{open_repository, StoreSettings};
pub use service::{ExpensePage, ExpensesService, ServiceError};
