use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use expensedb_core::{
    timestamp_now, Expense, ExpenseUpdate, ExpensesRepository, NewExpense, PageRequest, RepositoryError,
};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use thiserror::Error;
use uuid::Uuid;

use crate::slots::{scan_window, SlotWindow};

/// Primary records: sequence key -> JSON encoded `Expense`.
const EXPENSES: TableDefinition<u64, &[u8]> = TableDefinition::new("expenses");
/// Identifier index: external id -> sequence key.
const EXPENSE_IDS: TableDefinition<&str, u64> = TableDefinition::new("expense_ids");
/// Sequence state: namespace name -> last issued value.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const EXPENSES_SEQUENCE: &str = "expenses";

#[derive(Debug, Error)]
enum DriverError {
    #[error(transparent)]
    Database(#[from] redb::DatabaseError),
    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),
    #[error(transparent)]
    Table(#[from] redb::TableError),
    #[error(transparent)]
    Storage(#[from] redb::StorageError),
    #[error(transparent)]
    Commit(#[from] redb::CommitError),
    #[error("could not encode expense: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("embedded store is closed")]
    Closed,
    #[error("could not find expense with id: {0}")]
    NotFound(String),
}

impl From<DriverError> for RepositoryError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound(id) => RepositoryError::NotFound(id),
            other => RepositoryError::storage(other),
        }
    }
}

/// What a reconcile pass had to repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Index entries pointing at a missing primary record, removed.
    pub dangling_index_entries: usize,
    /// Primary records without an index entry, re-indexed.
    pub unindexed_records: usize,
    /// Whether the sequence lagged behind the highest primary key.
    pub sequence_advanced: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        *self == ReconcileReport::default()
    }
}

/// Derives the external id for a sequence value: a name-based (MD5) UUID of
/// its decimal form, so the same sequence value always yields the same id.
pub fn derive_expense_id(sequence: u64) -> String {
    Uuid::new_v3(&Uuid::NAMESPACE_URL, sequence.to_string().as_bytes()).to_string()
}

/// Expenses repository backed by a single redb file.
///
/// Each operation runs in exactly one redb transaction, so create and delete
/// update the primary table and the identifier index atomically. The async
/// methods run their transaction on tokio's blocking pool.
pub struct EmbeddedDriver {
    db: Arc<RwLock<Option<Database>>>,
    path: PathBuf,
}

impl EmbeddedDriver {
    /// Opens (or creates) the store at `path` and repairs any inconsistency
    /// between the primary table and the identifier index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "could not create/open embedded store");
            RepositoryError::from(DriverError::from(e))
        })?;

        let driver = Self {
            db: Arc::new(RwLock::new(Some(db))),
            path,
        };
        let report = driver.reconcile()?;
        if !report.is_clean() {
            tracing::warn!(
                dangling_index_entries = report.dangling_index_entries,
                unindexed_records = report.unindexed_records,
                sequence_advanced = report.sequence_advanced,
                "repaired embedded store"
            );
        }
        tracing::info!(path = %driver.path.display(), "embedded store opened");
        Ok(driver)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Brings the identifier index and sequence state back in line with the
    /// primary table. Also creates missing tables.
    pub fn reconcile(&self) -> Result<ReconcileReport, RepositoryError> {
        self.with_db(|db| in_write_txn(db, reconcile_in))
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T, DriverError>) -> Result<T, RepositoryError> {
        with_open_db(&self.db, f)
    }

    /// Runs `f` against the open database on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Database) -> Result<T, DriverError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || with_open_db(&db, f))
            .await
            .map_err(RepositoryError::storage)?
    }

    async fn write<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, DriverError> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |db| in_write_txn(db, f)).await
    }
}

fn with_open_db<T>(
    lock: &RwLock<Option<Database>>,
    f: impl FnOnce(&Database) -> Result<T, DriverError>,
) -> Result<T, RepositoryError> {
    // Held for the whole operation so close() waits for in-flight work.
    let guard = lock.read().unwrap_or_else(PoisonError::into_inner);
    let db = guard.as_ref().ok_or(DriverError::Closed)?;
    f(db).map_err(RepositoryError::from)
}

/// Runs `f` in one write transaction, committing on `Ok` and aborting on `Err`.
fn in_write_txn<T>(
    db: &Database,
    f: impl FnOnce(&WriteTransaction) -> Result<T, DriverError>,
) -> Result<T, DriverError> {
    let txn = db.begin_write()?;
    match f(&txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            txn.abort()?;
            Err(err)
        }
    }
}

fn decode(bytes: &[u8]) -> Result<Expense, DriverError> {
    serde_json::from_slice(bytes).map_err(|e| {
        tracing::error!(error = %e, "could not decode expense");
        DriverError::Codec(e)
    })
}

fn next_sequence(txn: &WriteTransaction) -> Result<u64, DriverError> {
    let mut sequences = txn.open_table(SEQUENCES)?;
    let next = sequences.get(EXPENSES_SEQUENCE)?.map(|g| g.value()).unwrap_or(0) + 1;
    sequences.insert(EXPENSES_SEQUENCE, next)?;
    Ok(next)
}

fn resolve(txn: &WriteTransaction, id: &str) -> Result<u64, DriverError> {
    let index = txn.open_table(EXPENSE_IDS)?;
    let key = index.get(id)?.map(|g| g.value());
    key.ok_or_else(|| {
        tracing::debug!(id, "could not resolve expense id");
        DriverError::NotFound(id.to_string())
    })
}

fn create_in(txn: &WriteTransaction, new: &NewExpense) -> Result<Expense, DriverError> {
    let sequence = next_sequence(txn)?;
    let expense = Expense::new(derive_expense_id(sequence), new, timestamp_now());
    let bytes = serde_json::to_vec(&expense)?;

    let mut expenses = txn.open_table(EXPENSES)?;
    expenses.insert(sequence, bytes.as_slice())?;
    let mut index = txn.open_table(EXPENSE_IDS)?;
    index.insert(expense.id.as_str(), sequence)?;
    Ok(expense)
}

fn update_in(txn: &WriteTransaction, id: &str, changes: &ExpenseUpdate) -> Result<bool, DriverError> {
    let key = resolve(txn, id)?;
    let mut expenses = txn.open_table(EXPENSES)?;
    let stored = match expenses.get(key)? {
        Some(bytes) => decode(bytes.value())?,
        None => {
            tracing::warn!(id, key, "identifier index points at a missing record");
            return Err(DriverError::NotFound(id.to_string()));
        }
    };

    let mut expense = stored;
    if !changes.apply_to(&mut expense, timestamp_now()) {
        return Ok(false);
    }
    let bytes = serde_json::to_vec(&expense)?;
    expenses.insert(key, bytes.as_slice())?;
    Ok(true)
}

fn delete_in(txn: &WriteTransaction, id: &str) -> Result<(), DriverError> {
    let key = resolve(txn, id)?;
    let mut expenses = txn.open_table(EXPENSES)?;
    if expenses.remove(key)?.is_none() {
        tracing::warn!(id, key, "deleting index entry without a primary record");
    }
    let mut index = txn.open_table(EXPENSE_IDS)?;
    index.remove(id)?;
    Ok(())
}

fn reconcile_in(txn: &WriteTransaction) -> Result<ReconcileReport, DriverError> {
    let mut report = ReconcileReport::default();
    let expenses = txn.open_table(EXPENSES)?;
    let mut index = txn.open_table(EXPENSE_IDS)?;
    let mut sequences = txn.open_table(SEQUENCES)?;

    let mut dangling = Vec::new();
    for entry in index.iter()? {
        let (id, key) = entry?;
        if expenses.get(key.value())?.is_none() {
            dangling.push(id.value().to_string());
        }
    }
    for id in &dangling {
        index.remove(id.as_str())?;
    }
    report.dangling_index_entries = dangling.len();

    let mut unindexed = Vec::new();
    let mut highest = 0;
    for entry in expenses.iter()? {
        let (key, bytes) = entry?;
        let key = key.value();
        highest = highest.max(key);
        let expense = decode(bytes.value())?;
        let indexed = index.get(expense.id.as_str())?.map(|g| g.value());
        if indexed != Some(key) {
            unindexed.push((expense.id, key));
        }
    }
    for (id, key) in &unindexed {
        index.insert(id.as_str(), *key)?;
    }
    report.unindexed_records = unindexed.len();

    let sequence = sequences.get(EXPENSES_SEQUENCE)?.map(|g| g.value()).unwrap_or(0);
    if sequence < highest {
        sequences.insert(EXPENSES_SEQUENCE, highest)?;
        report.sequence_advanced = true;
    }
    Ok(report)
}

fn list_in(db: &Database, page: PageRequest) -> Result<Vec<Expense>, DriverError> {
    let txn = db.begin_read()?;
    let expenses = txn.open_table(EXPENSES)?;
    let raw = scan_window(SlotWindow::for_page(&page), |slot| -> Result<_, DriverError> {
        match expenses.range(slot..)?.next() {
            Some(entry) => {
                let (key, bytes) = entry?;
                Ok(Some((key.value(), bytes.value().to_vec())))
            }
            None => Ok(None),
        }
    })?;
    raw.iter().map(|bytes| decode(bytes)).collect()
}

fn fetch_in(db: &Database, ids: &[String]) -> Result<Vec<Expense>, DriverError> {
    let txn = db.begin_read()?;
    let index = txn.open_table(EXPENSE_IDS)?;
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        match index.get(id.as_str())? {
            Some(key) => keys.push((id.as_str(), key.value())),
            None => tracing::debug!(id = %id, "record was not found in db"),
        }
    }

    let expenses = txn.open_table(EXPENSES)?;
    let mut found = Vec::with_capacity(keys.len());
    for (id, key) in keys {
        match expenses.get(key)? {
            Some(bytes) => found.push(decode(bytes.value())?),
            None => tracing::warn!(id, key, "identifier index points at a missing record"),
        }
    }
    Ok(found)
}

fn count_in(db: &Database) -> Result<u64, DriverError> {
    let txn = db.begin_read()?;
    let expenses = txn.open_table(EXPENSES)?;
    Ok(expenses.len()?)
}

#[async_trait]
impl ExpensesRepository for EmbeddedDriver {
    async fn list_expenses(&self, page: PageRequest) -> Result<Vec<Expense>, RepositoryError> {
        self.run(move |db| list_in(db, page)).await
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Expense>, RepositoryError> {
        let ids = ids.to_vec();
        self.run(move |db| fetch_in(db, &ids)).await
    }

    async fn create(&self, expense: &NewExpense) -> Result<Expense, RepositoryError> {
        let new = expense.clone();
        let created = self.write(move |txn| create_in(txn, &new)).await?;
        tracing::info!(id = %created.id, "successfully saved expense in db");
        Ok(created)
    }

    async fn update(&self, id: &str, changes: &ExpenseUpdate) -> Result<(), RepositoryError> {
        let (key, changes) = (id.to_string(), changes.clone());
        let changed = self.write(move |txn| update_in(txn, &key, &changes)).await?;
        tracing::debug!(id, changed, "expense update applied");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let key = id.to_string();
        self.write(move |txn| delete_in(txn, &key)).await?;
        tracing::info!(id, "expense deleted");
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.run(count_in).await
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        tracing::info!("stopping embedded store");
        let db = Arc::clone(&self.db);
        let closed = tokio::task::spawn_blocking(move || {
            let mut guard = db.write().unwrap_or_else(PoisonError::into_inner);
            guard.take().is_some()
        })
        .await
        .map_err(RepositoryError::storage)?;

        if !closed {
            return Err(DriverError::Closed.into());
        }
        tracing::info!(path = %self.path.display(), "embedded store successfully stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expensedb_core::Currency;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn new_expense(title: &str) -> NewExpense {
        NewExpense {
            title: title.to_string(),
            price: dec!(9.99),
            currency: Currency::Usd,
        }
    }

    fn open_temp() -> (TempDir, EmbeddedDriver) {
        let dir = TempDir::new().unwrap();
        let driver = EmbeddedDriver::open(dir.path().join("expenses.db")).unwrap();
        (dir, driver)
    }

    #[test]
    fn test_derived_ids_are_stable_and_distinct() {
        assert_eq!(derive_expense_id(1), derive_expense_id(1));
        assert_ne!(derive_expense_id(1), derive_expense_id(2));
        let id = Uuid::parse_str(&derive_expense_id(42)).unwrap();
        assert_eq!(id.get_version_num(), 3);
    }

    #[tokio::test]
    async fn test_create_uses_sequence_derived_ids() {
        let (_dir, driver) = open_temp();
        let first = driver.create(&new_expense("one")).await.unwrap();
        let second = driver.create(&new_expense("two")).await.unwrap();
        assert_eq!(first.id, derive_expense_id(1));
        assert_eq!(second.id, derive_expense_id(2));
    }

    #[tokio::test]
    async fn test_sequence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("expenses.db");

        let driver = EmbeddedDriver::open(&path).unwrap();
        driver.create(&new_expense("one")).await.unwrap();
        let second = driver.create(&new_expense("two")).await.unwrap();
        driver.delete(&second.id).await.unwrap();
        driver.close().await.unwrap();

        let driver = EmbeddedDriver::open(&path).unwrap();
        let third = driver.create(&new_expense("three")).await.unwrap();
        assert_eq!(third.id, derive_expense_id(3));
        assert_eq!(driver.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_index_entry() {
        let (_dir, driver) = open_temp();
        let expense = driver.create(&new_expense("one")).await.unwrap();
        driver.delete(&expense.id).await.unwrap();

        let in_index = driver
            .with_db(|db| {
                let txn = db.begin_read()?;
                let index = txn.open_table(EXPENSE_IDS)?;
                let present = index.get(expense.id.as_str())?.is_some();
                Ok(present)
            })
            .unwrap();
        assert!(!in_index);
        assert!(driver.reconcile().unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_open_repairs_orphans() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("expenses.db");

        let driver = EmbeddedDriver::open(&path).unwrap();
        let kept = driver.create(&new_expense("kept")).await.unwrap();
        driver.close().await.unwrap();

        // Simulate a writer that crashed between the two halves of a create
        // and of a delete.
        let orphan = Expense::new(derive_expense_id(7), &new_expense("orphan"), timestamp_now());
        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut expenses = txn.open_table(EXPENSES).unwrap();
                let bytes = serde_json::to_vec(&orphan).unwrap();
                expenses.insert(7u64, bytes.as_slice()).unwrap();
                let mut index = txn.open_table(EXPENSE_IDS).unwrap();
                index.insert("dangling-id", 99u64).unwrap();
            }
            txn.commit().unwrap();
        }

        let driver = EmbeddedDriver::open(&path).unwrap();
        let found = driver.get_by_ids(&[orphan.id.clone(), kept.id.clone()]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(matches!(
            driver.delete("dangling-id").await,
            Err(RepositoryError::NotFound(_))
        ));

        // The sequence moved past the orphan's key.
        let next = driver.create(&new_expense("next")).await.unwrap();
        assert_eq!(next.id, derive_expense_id(8));
        assert!(driver.reconcile().unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let (_dir, driver) = open_temp();
        driver.close().await.unwrap();
        assert!(matches!(driver.count().await, Err(RepositoryError::StorageFailure(_))));
        assert!(matches!(driver.close().await, Err(RepositoryError::StorageFailure(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_waiting_writer_leaves_runtime_free() {
        let (_dir, driver) = open_temp();
        let driver = Arc::new(driver);
        // Hold the only write slot so the next create has to wait for it.
        let held = driver.with_db(|db| Ok(db.begin_write()?)).unwrap();

        let pending = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.create(&new_expense("queued")).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // Readers and this task still run on the single runtime thread.
        assert_eq!(driver.count().await.unwrap(), 0);
        assert!(!pending.is_finished());

        held.abort().unwrap();
        let created = pending.await.unwrap().unwrap();
        assert_eq!(created.id, derive_expense_id(1));
        assert_eq!(driver.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_noop_update_skips_write() {
        let (_dir, driver) = open_temp();
        let expense = driver.create(&new_expense("one")).await.unwrap();
        driver.update(&expense.id, &ExpenseUpdate::default()).await.unwrap();
        let stored = driver.get_by_ids(&[expense.id.clone()]).await.unwrap();
        assert_eq!(stored, vec![expense]);
    }
}
