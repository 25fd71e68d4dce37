// 🗄️ Expense Store - SQLite + WAL
//
// One table, three queries. Each operation opens its own connection, runs one
// statement and drops the connection before returning; SQLite's own locking is
// the only coordination between concurrent callers.

use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{AddedExpense, CategorySummary, Expense, NewExpense};

/// Category of the throwaway row written by the startup self-check
pub const SELF_CHECK_CATEGORY: &str = "__self_check__";

/// How long a writer waits on SQLite's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_EXPENSES_TABLE: &str = "CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    amount REAL NOT NULL,
    category TEXT NOT NULL,
    subcategory TEXT DEFAULT '',
    note TEXT DEFAULT ''
)";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database self-check failed: {0}")]
    SelfCheck(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Coarse error category, derived from the SQLite result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// NOT NULL / CHECK / UNIQUE violations
    Constraint,
    /// Lock contention outlasted the busy timeout
    Busy,
    /// The database file cannot be opened, read or written
    Unavailable,
    /// The statement itself failed (missing table, bad SQL)
    Query,
    Other,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Constraint => "constraint",
            StoreErrorKind::Busy => "busy",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Query => "query",
            StoreErrorKind::Other => "other",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Open { .. } | StoreError::SelfCheck(_) => StoreErrorKind::Unavailable,
            StoreError::Sqlite(err) => classify(err),
        }
    }
}

fn classify(err: &rusqlite::Error) -> StoreErrorKind {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => StoreErrorKind::Constraint,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreErrorKind::Busy,
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::SystemIoFailure
            | ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::DiskFull => StoreErrorKind::Unavailable,
            _ => StoreErrorKind::Query,
        },
        _ => StoreErrorKind::Other,
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Handle to the expenses database.
///
/// Holds only the path; cloning is cheap and every clone talks to the same file.
#[derive(Debug, Clone)]
pub struct ExpenseStore {
    path: PathBuf,
}

impl ExpenseStore {
    /// Open (creating if needed) the database at `path`, ensure the schema,
    /// and prove the store is writable.
    ///
    /// Safe to call on every startup. Any error here means the store is unusable
    /// and the caller must not start serving.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        setup_database(&conn)?;
        self_check(&mut conn)?;

        info!(path = %path.display(), "expense database initialized");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-operation connection. Does not create the file: a database that
    /// vanished after startup is reported as unavailable.
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: self.path.clone(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Insert one expense and return the id SQLite assigned to it
    pub fn add(&self, expense: &NewExpense) -> Result<AddedExpense, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO expenses (date, amount, category, subcategory, note)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                expense.date,
                expense.amount,
                expense.category,
                expense.subcategory,
                expense.note,
            ],
        )?;
        let id = conn.last_insert_rowid();

        debug!(id, category = %expense.category.0, "expense added");
        Ok(AddedExpense::new(id))
    }

    /// Expenses with `start_date <= date <= end_date` (text comparison),
    /// newest date first, then newest id first
    pub fn list(&self, start_date: &str, end_date: &str) -> Result<Vec<Expense>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, date, amount, category, subcategory, note
             FROM expenses
             WHERE date BETWEEN ?1 AND ?2
             ORDER BY date DESC, id DESC",
        )?;

        let expenses = stmt
            .query_map(params![start_date, end_date], |row| {
                Ok(Expense {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    amount: row.get(2)?,
                    category: row.get(3)?,
                    subcategory: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    note: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(expenses)
    }

    /// Per-category totals over the date range, largest total first.
    ///
    /// An empty `category` is treated the same as `None`. Order among equal
    /// totals is whatever SQLite yields.
    pub fn summarize(
        &self,
        start_date: &str,
        end_date: &str,
        category: Option<&str>,
    ) -> Result<Vec<CategorySummary>, StoreError> {
        let conn = self.connect()?;
        let category = category.filter(|c| !c.is_empty());

        let mut query = String::from(
            "SELECT category, SUM(amount) AS total_amount, COUNT(*) AS count
             FROM expenses
             WHERE date BETWEEN ?1 AND ?2",
        );
        if category.is_some() {
            query.push_str(" AND category = ?3");
        }
        query.push_str(" GROUP BY category ORDER BY total_amount DESC");

        let mut stmt = conn.prepare(&query)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<CategorySummary> {
            Ok(CategorySummary {
                category: row.get(0)?,
                total_amount: row.get(1)?,
                count: row.get(2)?,
            })
        };

        let rows = match category {
            Some(category) => stmt
                .query_map(params![start_date, end_date, category], map_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![start_date, end_date], map_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(rows)
    }

    /// Total number of stored expenses
    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// WAL mode plus the idempotent schema
pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Readers keep going while a write is in flight
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(CREATE_EXPENSES_TABLE, [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    Ok(())
}

/// Write and delete a sentinel row inside a transaction that is rolled back,
/// so a healthy store keeps its AUTOINCREMENT sequence untouched.
fn self_check(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO expenses (date, amount, category) VALUES ('2000-01-01', 0, ?1)",
        params![SELF_CHECK_CATEGORY],
    )?;
    let sentinel_id = tx.last_insert_rowid();

    let deleted = tx.execute("DELETE FROM expenses WHERE id = ?1", params![sentinel_id])?;
    if deleted != 1 {
        return Err(StoreError::SelfCheck(format!(
            "sentinel row {} was not removed ({} rows deleted)",
            sentinel_id, deleted
        )));
    }

    tx.rollback()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amount, BindValue};
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, ExpenseStore) {
        let dir = TempDir::new().unwrap();
        let store = ExpenseStore::open(dir.path().join("expenses.db")).unwrap();
        (dir, store)
    }

    fn sample_expenses() -> Vec<NewExpense> {
        vec![
            NewExpense::new("2024-01-10", 5.25, "Food & Dining").with_note("coffee"),
            NewExpense::new("2024-01-15", 42.99, "Shopping").with_subcategory("Online"),
            NewExpense::new("2024-01-15", 12.00, "Food & Dining"),
            NewExpense::new("2024-01-20", 60.00, "Transportation").with_subcategory("Fuel"),
            NewExpense::new("2024-02-01", 1200.00, "Bills & Utilities").with_note("rent"),
        ]
    }

    #[test]
    fn test_example_scenario() {
        let (_dir, store) = temp_store();

        let added = store
            .add(&NewExpense::new("2024-03-01", 42.50, "Food & Dining"))
            .unwrap();
        assert_eq!(added, AddedExpense::new(1));

        let listed = store.list("2024-03-01", "2024-03-01").unwrap();
        assert_eq!(
            listed,
            vec![Expense {
                id: 1,
                date: "2024-03-01".into(),
                amount: Amount::Real(42.5),
                category: "Food & Dining".into(),
                subcategory: "".into(),
                note: "".into(),
            }]
        );

        let summary = store.summarize("2024-03-01", "2024-03-01", None).unwrap();
        assert_eq!(
            summary,
            vec![CategorySummary {
                category: "Food & Dining".into(),
                total_amount: 42.5,
                count: 1,
            }]
        );
    }

    #[test]
    fn test_round_trip_keeps_every_field() {
        let (_dir, store) = temp_store();
        let input = NewExpense::new("2024-05-05", 19.99, "Entertainment")
            .with_subcategory("Movies")
            .with_note("opening night");

        let id = store.add(&input).unwrap().id;
        let listed = store.list("2024-01-01", "2024-12-31").unwrap();

        assert_eq!(listed.len(), 1);
        let expense = &listed[0];
        assert_eq!(
            *expense,
            Expense {
                id,
                date: "2024-05-05".into(),
                amount: Amount::Real(19.99),
                category: "Entertainment".into(),
                subcategory: "Movies".into(),
                note: "opening night".into(),
            }
        );
    }

    #[test]
    fn test_ids_strictly_increase() {
        let (_dir, store) = temp_store();

        let ids: Vec<i64> = sample_expenses()
            .iter()
            .map(|e| store.add(e).unwrap().id)
            .collect();

        assert_eq!(ids[0], 1, "self-check must not consume an id");
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids: {:?}", ids);
    }

    #[test]
    fn test_reopen_is_idempotent_and_keeps_ids_moving_forward() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("expenses.db");

        let store = ExpenseStore::open(&path).unwrap();
        let first = store.add(&NewExpense::new("2024-01-01", 1.0, "Other")).unwrap().id;
        drop(store);

        let store = ExpenseStore::open(&path).unwrap();
        let store = ExpenseStore::open(store.path()).unwrap();
        let second = store.add(&NewExpense::new("2024-01-02", 2.0, "Other")).unwrap().id;

        assert_eq!(store.count().unwrap(), 2);
        assert!(second > first);
    }

    #[test]
    fn test_list_range_is_inclusive_text_comparison() {
        let (_dir, store) = temp_store();
        for expense in sample_expenses() {
            store.add(&expense).unwrap();
        }

        let listed = store.list("2024-01-15", "2024-01-20").unwrap();
        let dates: Vec<&str> = listed.iter().map(|e| e.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-20", "2024-01-15", "2024-01-15"]);

        for expense in store.list("0000", "9999").unwrap() {
            let inside = "2024-01-15" <= expense.date.as_str() && expense.date.as_str() <= "2024-01-20";
            assert_eq!(inside, listed.iter().any(|e| e.id == expense.id));
        }

        assert!(store.list("2025-01-01", "2025-12-31").unwrap().is_empty());
        assert!(store.list("2024-02-01", "2024-01-01").unwrap().is_empty());
    }

    #[test]
    fn test_list_orders_by_date_then_id_descending() {
        let (_dir, store) = temp_store();
        for expense in sample_expenses() {
            store.add(&expense).unwrap();
        }

        let listed = store.list("2024-01-01", "2024-12-31").unwrap();
        let keys: Vec<(&str, i64)> = listed.iter().map(|e| (e.date.as_str(), e.id)).collect();
        assert_eq!(
            keys,
            vec![
                ("2024-02-01", 5),
                ("2024-01-20", 4),
                ("2024-01-15", 3),
                ("2024-01-15", 2),
                ("2024-01-10", 1),
            ]
        );
    }

    #[test]
    fn test_summarize_totals_and_counts() {
        let (_dir, store) = temp_store();
        for expense in sample_expenses() {
            store.add(&expense).unwrap();
        }

        let summary = store.summarize("2024-01-01", "2024-01-31", None).unwrap();
        let rows: Vec<(&str, i64)> = summary.iter().map(|s| (s.category.as_str(), s.count)).collect();
        assert_eq!(
            rows,
            vec![("Transportation", 1), ("Shopping", 1), ("Food & Dining", 2)]
        );

        let food = summary.iter().find(|s| s.category == "Food & Dining").unwrap();
        assert!((food.total_amount - 17.25).abs() < 1e-9);

        let grand_total: f64 = summary.iter().map(|s| s.total_amount).sum();
        let listed_total: f64 = store
            .list("2024-01-01", "2024-01-31")
            .unwrap()
            .iter()
            .filter_map(|e| e.amount.as_f64())
            .sum();
        assert!((grand_total - listed_total).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_category_filter() {
        let (_dir, store) = temp_store();
        for expense in sample_expenses() {
            store.add(&expense).unwrap();
        }

        let food = store
            .summarize("2024-01-01", "2024-12-31", Some("Food & Dining"))
            .unwrap();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].category, "Food & Dining");
        assert_eq!(food[0].count, 2);

        let missing = store
            .summarize("2024-01-01", "2024-12-31", Some("Travel"))
            .unwrap();
        assert!(missing.is_empty());

        // Empty filter means no filter
        let all = store.summarize("2024-01-01", "2024-12-31", Some("")).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_amount_follows_real_affinity() {
        let (_dir, store) = temp_store();
        store
            .add(&NewExpense::new("2024-04-01", "12.5", "Other"))
            .unwrap();
        store
            .add(&NewExpense::new("2024-04-02", "n/a", "Other"))
            .unwrap();
        store
            .add(&NewExpense::new("2024-04-03", BindValue(json!(true)), "Other"))
            .unwrap();

        let listed = store.list("2024-04-01", "2024-04-30").unwrap();
        assert_eq!(listed[0].amount, Amount::Real(1.0));
        assert_eq!(listed[1].amount, Amount::Text("n/a".into()));
        assert_eq!(listed[2].amount, Amount::Real(12.5));
    }

    #[test]
    fn test_loose_text_columns_are_stored_as_text() {
        let (_dir, store) = temp_store();
        store
            .add(&NewExpense::new(BindValue(json!(20240101)), 3.0, BindValue(json!(7))))
            .unwrap();

        let listed = store.list("20240101", "20240101").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].date, "20240101");
        assert_eq!(listed[0].category, "7");
    }

    #[test]
    fn test_missing_table_is_reported_not_raised() {
        let (_dir, store) = temp_store();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute("DROP TABLE expenses", []).unwrap();
        drop(conn);

        let add = store.add(&NewExpense::new("2024-01-01", 1.0, "Other")).unwrap_err();
        assert_eq!(add.kind(), StoreErrorKind::Query);
        assert!(add.to_string().contains("no such table"));

        let list = store.list("2024-01-01", "2024-12-31").unwrap_err();
        assert_eq!(list.kind(), StoreErrorKind::Query);

        let summary = store.summarize("2024-01-01", "2024-12-31", None).unwrap_err();
        assert_eq!(summary.kind(), StoreErrorKind::Query);
    }

    #[test]
    fn test_vanished_database_is_unavailable() {
        let (dir, store) = temp_store();
        std::fs::remove_file(store.path()).unwrap();

        let err = store.list("2024-01-01", "2024-12-31").unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unavailable);
        assert!(!dir.path().join("expenses.db").exists());
    }

    #[test]
    fn test_constraint_violation_kind() {
        let (_dir, store) = temp_store();

        let err = store
            .add(&NewExpense::new("2024-01-01", BindValue(json!(null)), "Other"))
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Constraint);

        let err = store
            .add(&NewExpense::new(BindValue(json!(null)), 1.0, "Other"))
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Constraint);

        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_structured_values_are_not_bound() {
        let (_dir, store) = temp_store();
        let err = store
            .add(&NewExpense::new("2024-01-01", BindValue(json!([1, 2])), "Other"))
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Other);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_open_fails_for_unusable_path() {
        let dir = TempDir::new().unwrap();
        let err = ExpenseStore::open(dir.path().join("missing").join("expenses.db")).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unavailable);
    }
}
