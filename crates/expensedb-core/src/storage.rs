use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    read::PageRequest,
    write::{ExpenseUpdate, NewExpense, ValidationError},
    Expense,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("could not find expense with id: {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    StorageFailure(#[source] BoxError),
}

impl RepositoryError {
    pub fn storage<E: Into<BoxError>>(err: E) -> Self {
        RepositoryError::StorageFailure(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::StorageFailure(_) => ErrorKind::Storage,
        }
    }
}

/// Backend-independent failure classes, as seen by transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Storage,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::Storage => 500,
        }
    }
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// The storage contract shared by every backend.
///
/// Callers validate payloads before calling in; implementations only check
/// that referenced ids exist. Listing order is ascending creation sequence.
#[async_trait]
pub trait ExpensesRepository: Send + Sync {
    async fn list_expenses(&self, page: PageRequest) -> Result<Vec<Expense>, RepositoryError>;

    /// Unknown ids are skipped, duplicates collapse to one record.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Expense>, RepositoryError>;

    async fn create(&self, expense: &NewExpense) -> Result<Expense, RepositoryError>;
    async fn update(&self, id: &str, changes: &ExpenseUpdate) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;

    /// Releases the file handle or pool. Call at most once.
    async fn close(&self) -> Result<(), RepositoryError>;
}
