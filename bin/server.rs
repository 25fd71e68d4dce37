// Expense Tracker - MCP Server
// Serves add_expense / list_expenses / summarize and the categories resource over HTTP

use anyhow::{Context, Result};
use tracing::info;

use expense_tracker::{logging, server, AppPaths, CategoryProvider, Dispatcher, ExpenseStore, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = ServerConfig::from_env()?;
    let paths = AppPaths::beside_executable()?;
    info!(database = %paths.database.display(), "starting ExpenseTracker");

    // An unusable store is fatal: never start serving without it
    let store = ExpenseStore::open(&paths.database).context("Database initialization failed")?;
    let categories = CategoryProvider::new(&paths.categories);

    server::serve(Dispatcher::new(store, categories), &config).await
}
