use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use expensedb_core::{
    timestamp_now, Currency, Expense, ExpenseUpdate, ExpensesRepository, NewExpense, PageRequest, RepositoryError,
};
use rust_decimal::Decimal;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    FromRow, MySql, QueryBuilder,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// Connection pool settings for the relational backend. `None` leaves the
/// pool unbounded (lifetime) or at the sqlx default (open connections).
#[derive(Debug, Clone)]
pub struct MariaDbSettings {
    pub url: String,
    pub max_open_connections: Option<u32>,
    pub max_idle_connections: u32,
    pub conn_max_lifetime: Option<Duration>,
}

impl MariaDbSettings {
    fn pool_options(&self) -> MySqlPoolOptions {
        let mut options = MySqlPoolOptions::new().max_lifetime(self.conn_max_lifetime);
        if let Some(max) = self.max_open_connections {
            options = options.max_connections(max.max(1));
        }
        let idle = self.max_idle_connections.min(options.get_max_connections());
        options.min_connections(idle)
    }
}

pub struct MariaDbDriver {
    pool: MySqlPool,
}

#[derive(Debug, FromRow)]
struct ExpenseRow {
    id: String,
    title: String,
    price: Decimal,
    currency: String,
    created_at: OffsetDateTime,
    modified_at: OffsetDateTime,
}

impl ExpenseRow {
    fn into_expense(self) -> Result<Expense, RepositoryError> {
        let currency = self.currency.parse::<Currency>().map_err(|e| {
            tracing::error!(id = %self.id, currency = %self.currency, "stored expense has an invalid currency");
            RepositoryError::storage(e)
        })?;
        Ok(Expense {
            id: self.id,
            title: self.title,
            // DECIMAL columns pad to the declared scale.
            price: self.price.normalize(),
            currency,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}

fn into_expenses(rows: Vec<ExpenseRow>) -> Result<Vec<Expense>, RepositoryError> {
    rows.into_iter().map(ExpenseRow::into_expense).collect()
}

impl MariaDbDriver {
    pub async fn connect(settings: &MariaDbSettings) -> Result<Self, RepositoryError> {
        let options = settings.pool_options();
        let max_connections = options.get_max_connections();
        let pool = options
            .connect(&settings.url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "could not open mariadb database");
                RepositoryError::storage(e)
            })?;

        let driver = Self { pool };
        driver.init_schema().await?;
        tracing::info!(max_connections, "mariadb pool opened");
        Ok(driver)
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS expenses (
                seq BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                id CHAR(36) NOT NULL,
                title VARCHAR(255) NOT NULL,
                price DECIMAL(28, 10) NOT NULL,
                currency CHAR(3) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                modified_at DATETIME(6) NOT NULL,
                UNIQUE KEY uq_expenses_id (id)
            ) DEFAULT CHARSET = utf8mb4",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "could not create expenses table");
            RepositoryError::storage(e)
        })?;
        Ok(())
    }

    async fn find_expense(&self, id: &str) -> Result<Expense, RepositoryError> {
        let row = sqlx::query_as::<_, ExpenseRow>(
            "SELECT id, title, price, currency, created_at, modified_at FROM expenses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::storage)?;

        match row {
            Some(row) => row.into_expense(),
            None => {
                tracing::debug!(id, "could not find expense in mariadb");
                Err(RepositoryError::NotFound(id.to_string()))
            }
        }
    }
}

#[async_trait]
impl ExpensesRepository for MariaDbDriver {
    async fn list_expenses(&self, page: PageRequest) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query_as::<_, ExpenseRow>(
            "SELECT id, title, price, currency, created_at, modified_at FROM expenses
             ORDER BY seq LIMIT ? OFFSET ?",
        )
        .bind(u64::from(page.page_size()))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "could not execute find all on mariadb expenses records");
            RepositoryError::storage(e)
        })?;
        into_expenses(rows)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Expense>, RepositoryError> {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = ids.iter().map(String::as_str).filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<MySql>::new(
            "SELECT id, title, price, currency, created_at, modified_at FROM expenses WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in &unique {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY seq");

        let rows = builder
            .build_query_as::<ExpenseRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "could not select expense records from mariadb");
                RepositoryError::storage(e)
            })?;
        if rows.len() < unique.len() {
            tracing::debug!(requested = unique.len(), found = rows.len(), "some expense ids were not found");
        }
        into_expenses(rows)
    }

    async fn create(&self, expense: &NewExpense) -> Result<Expense, RepositoryError> {
        let expense = Expense::new(Uuid::new_v4().to_string(), expense, timestamp_now());
        sqlx::query(
            "INSERT INTO expenses (id, title, price, currency, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(expense.id.as_str())
        .bind(expense.title.as_str())
        .bind(expense.price)
        .bind(expense.currency.as_str())
        .bind(expense.created_at)
        .bind(expense.modified_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "could not create expense record in mariadb");
            RepositoryError::storage(e)
        })?;
        tracing::info!(id = %expense.id, "successfully saved expense in db");
        Ok(expense)
    }

    async fn update(&self, id: &str, changes: &ExpenseUpdate) -> Result<(), RepositoryError> {
        let mut expense = self.find_expense(id).await?;
        if !changes.apply_to(&mut expense, timestamp_now()) {
            tracing::debug!(id, changed = false, "expense update applied");
            return Ok(());
        }

        sqlx::query("UPDATE expenses SET title = ?, price = ?, currency = ?, modified_at = ? WHERE id = ?")
            .bind(expense.title.as_str())
            .bind(expense.price)
            .bind(expense.currency.as_str())
            .bind(expense.modified_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "could not update expense in mariadb");
                RepositoryError::storage(e)
            })?;
        tracing::debug!(id, changed = true, "expense update applied");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.find_expense(id).await?;
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "could not delete expense from mariadb");
                RepositoryError::storage(e)
            })?;
        // Lost a race with another delete.
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        tracing::info!(id, "expense deleted");
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expenses")
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::storage)?;
        u64::try_from(count).map_err(RepositoryError::storage)
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        tracing::info!("stopping mariadb server");
        self.pool.close().await;
        tracing::info!("mariadb server successfully stopped");
        Ok(())
    }
}
