//! MariaDB/MySQL storage backend for expensedb.

mod driver;

pub use driver::{MariaDbDriver, MariaDbSettings};
