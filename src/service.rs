use std::sync::Arc;

use expensedb_core::{
    CreateExpenseRequest, ErrorKind, Expense, ExpensesRepository, PageRequest, RepositoryError, UpdateExpenseRequest,
    ValidationError,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(e) => e.kind(),
            ServiceError::Repository(e) => e.kind(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

/// One page of expenses plus what a client needs to navigate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpensePage {
    pub items: Vec<Expense>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_page: Option<u32>,
}

/// Validates requests and forwards them to whichever backend is configured.
#[derive(Clone)]
pub struct ExpensesService {
    repo: Arc<dyn ExpensesRepository>,
}

impl ExpensesService {
    pub fn new(repo: Arc<dyn ExpensesRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, page: u32, page_size: u32) -> Result<ExpensePage, ServiceError> {
        let request = PageRequest::new(page, page_size)?;
        let items = self.repo.list_expenses(request).await.map_err(|e| {
            tracing::error!(error = %e, "could not fetch all expenses from db");
            e
        })?;
        let total = self.repo.count().await?;
        Ok(ExpensePage {
            items,
            total,
            next_page: request.has_next(total).then(|| request.page() + 1),
            prev_page: request.has_prev(total).then(|| request.page() - 1),
        })
    }

    pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Expense>, ServiceError> {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Err(ValidationError::EmptyIdList.into());
        }
        Ok(self.repo.get_by_ids(&ids).await.map_err(|e| {
            tracing::error!(error = %e, "could not fetch expenses by ids from db");
            e
        })?)
    }

    pub async fn create(&self, request: &CreateExpenseRequest) -> Result<Expense, ServiceError> {
        let expense = request.validate()?;
        Ok(self.repo.create(&expense).await.map_err(|e| {
            tracing::error!(error = %e, "could not create expense in db");
            e
        })?)
    }

    pub async fn update(&self, id: &str, request: &UpdateExpenseRequest) -> Result<(), ServiceError> {
        let changes = request.validate()?;
        Ok(self.repo.update(id, &changes).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        Ok(self.repo.delete(id).await?)
    }

    pub async fn count(&self) -> Result<u64, ServiceError> {
        Ok(self.repo.count().await?)
    }

    pub async fn close(&self) -> Result<(), ServiceError> {
        Ok(self.repo.close().await?)
    }
}
