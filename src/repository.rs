use std::{path::PathBuf, sync::Arc};

use expensedb_core::{ExpensesRepository, RepositoryError};
use expensedb_embedded::EmbeddedDriver;
use expensedb_mariadb::{MariaDbDriver, MariaDbSettings};

/// Parameters for exactly one backend, chosen by `app.db_type`.
#[derive(Debug, Clone)]
pub enum StoreSettings {
    Embedded { path: PathBuf },
    MariaDb(MariaDbSettings),
}

/// Opens the configured backend behind the repository contract.
pub async fn open_repository(settings: &StoreSettings) -> Result<Arc<dyn ExpensesRepository>, RepositoryError> {
    match settings {
        StoreSettings::Embedded { path } => {
            tracing::info!(path = %path.display(), "using embedded store");
            Ok(Arc::new(EmbeddedDriver::open(path)?))
        }
        StoreSettings::MariaDb(settings) => {
            tracing::info!("using mariadb store");
            Ok(Arc::new(MariaDbDriver::connect(settings).await?))
        }
    }
}
