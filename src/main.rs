use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::env;
use std::process;

use expense_tracker::{logging, AppPaths, CategoryProvider, Dispatcher, ExpenseStore};

const USAGE: &str = "Usage:
  expense-tracker add <date> <amount> <category> [subcategory] [note]
  expense-tracker list <start_date> <end_date>
  expense-tracker summarize <start_date> <end_date> [category]
  expense-tracker categories";

#[derive(Debug, PartialEq)]
enum Command {
    Tool { name: &'static str, arguments: Value },
    Categories,
}

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = parse_command(&args) else {
        eprintln!("{}", USAGE);
        process::exit(2);
    };

    let paths = AppPaths::beside_executable()?;
    let categories = CategoryProvider::new(&paths.categories);

    let output = match command {
        Command::Categories => categories.read(),
        Command::Tool { name, arguments } => {
            let store = ExpenseStore::open(&paths.database)
                .context("Database initialization failed")?;
            let payload = Dispatcher::new(store, categories).call_tool(name, arguments)?;
            serde_json::to_string_pretty(&payload)?
        }
    };

    println!("{}", output);
    Ok(())
}

/// Map CLI arguments onto the same tool calls the MCP server accepts
fn parse_command(args: &[String]) -> Option<Command> {
    let (command, rest) = args.split_first()?;

    match (command.as_str(), rest) {
        ("add", [date, amount, category, extra @ ..]) if extra.len() <= 2 => {
            // Non-numeric amounts go through as text; SQLite decides what to keep
            let amount = amount
                .parse::<f64>()
                .map(|a| json!(a))
                .unwrap_or_else(|_| json!(amount));
            Some(Command::Tool {
                name: "add_expense",
                arguments: json!({
                    "date": date,
                    "amount": amount,
                    "category": category,
                    "subcategory": extra.first().cloned().unwrap_or_default(),
                    "note": extra.get(1).cloned().unwrap_or_default(),
                }),
            })
        }
        ("list", [start_date, end_date]) => Some(Command::Tool {
            name: "list_expenses",
            arguments: json!({ "start_date": start_date, "end_date": end_date }),
        }),
        ("summarize", [start_date, end_date, category @ ..]) if category.len() <= 1 => {
            Some(Command::Tool {
                name: "summarize",
                arguments: json!({
                    "start_date": start_date,
                    "end_date": end_date,
                    "category": category.first(),
                }),
            })
        }
        ("categories", []) => Some(Command::Categories),
        _ => None,
    }
}
