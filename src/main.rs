use std::process::ExitCode;

use clap::Parser;
use expensedb::config::{CliArgs, Command, Config};
use expensedb::{logging, open_repository, ExpensesService, ServiceError};
use expensedb_core::{CreateExpenseRequest, Expense, UpdateExpenseRequest};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("could not encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Items {
    items: Vec<Expense>,
}

#[derive(Serialize)]
struct Total {
    total: u64,
}

#[derive(Serialize)]
struct Done<'a> {
    id: &'a str,
    status: &'static str,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("could not initialize app config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("could not initialize logger: {}", e);
        return ExitCode::FAILURE;
    }

    let repo = match config.store_settings() {
        Ok(settings) => open_repository(&settings).await,
        Err(e) => {
            tracing::error!(error = %e, "invalid storage configuration");
            return ExitCode::FAILURE;
        }
    };
    let service = match repo {
        Ok(repo) => ExpensesService::new(repo),
        Err(e) => {
            tracing::error!(error = %e, "could not open storage");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&service, cli.command).await;
    if let Err(e) = service.close().await {
        tracing::error!(error = %e, "could not close storage");
    }

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(CliError::Service(e)) => {
            tracing::error!(status = e.status_code(), error = %e, "command failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(service: &ExpensesService, command: Command) -> Result<String, CliError> {
    let output = match command {
        Command::List { page, page_size } => serde_json::to_string_pretty(&service.list(page, page_size).await?)?,
        Command::Get { ids } => serde_json::to_string_pretty(&Items {
            items: service.get_by_ids(&ids).await?,
        })?,
        Command::Create { title, price, currency } => {
            let request = CreateExpenseRequest { title, price, currency };
            serde_json::to_string_pretty(&service.create(&request).await?)?
        }
        Command::Update { id, title, price, currency } => {
            let request = UpdateExpenseRequest { title, price, currency };
            service.update(&id, &request).await?;
            serde_json::to_string_pretty(&Done { id: &id, status: "updated" })?
        }
        Command::Delete { id } => {
            service.delete(&id).await?;
            serde_json::to_string_pretty(&Done { id: &id, status: "deleted" })?
        }
        Command::Count => serde_json::to_string_pretty(&Total {
            total: service.count().await?,
        })?,
    };
    Ok(output)
}
