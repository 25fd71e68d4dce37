// Expense Tracker - Core Library
// Exposes all modules for use in the CLI, the MCP server, and tests

pub mod categories;
pub mod config;
pub mod db;
pub mod logging;
pub mod mcp;
pub mod models;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use categories::{CategoryProvider, CATEGORIES_URI, DEFAULT_CATEGORIES};
pub use config::{AppPaths, ServerConfig};
pub use db::{ExpenseStore, StoreError, StoreErrorKind};
pub use mcp::{Dispatcher, JsonRpcResponse, McpError};
pub use models::{AddedExpense, Amount, BindValue, CategorySummary, ErrorPayload, Expense, NewExpense};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
