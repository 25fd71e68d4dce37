// 🧾 Expense Models - records, inputs, and response payloads
//
// Everything here is plain data. The store produces it, the dispatcher serializes it.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::StoreError;

// ============================================================================
// AMOUNT
// ============================================================================

/// Amount as read back from SQLite.
///
/// The `amount` column has REAL affinity: numeric input is stored as a real,
/// anything else SQLite could not convert stays text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Real(f64),
    Text(String),
}

impl Amount {
    /// Numeric value, if the stored amount is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Amount::Real(value) => Some(*value),
            Amount::Text(_) => None,
        }
    }
}

impl FromSql for Amount {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Real(f) => Ok(Amount::Real(f)),
            ValueRef::Integer(i) => Ok(Amount::Real(i as f64)),
            ValueRef::Text(bytes) => Ok(Amount::Text(String::from_utf8_lossy(bytes).into_owned())),
            ValueRef::Null | ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

// ============================================================================
// BIND VALUES
// ============================================================================

/// A caller-supplied JSON scalar bound to SQLite as-is.
///
/// No type checking happens here: column affinity coerces what it can, and
/// anything the table refuses (a NULL `amount`) fails in the store as a
/// constraint violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindValue(pub Value);

impl Default for BindValue {
    fn default() -> Self {
        BindValue(Value::String(String::new()))
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue(Value::from(value))
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue(Value::from(value))
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue(Value::from(value))
    }
}

impl From<Value> for BindValue {
    fn from(value: Value) -> Self {
        BindValue(value)
    }
}

impl ToSql for BindValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match &self.0 {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n.as_f64().map(SqlValue::Real).ok_or_else(|| {
                    rusqlite::Error::ToSqlConversionFailure(format!("unsupported number {}", n).into())
                })?,
            },
            Value::String(text) => return Ok(ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes()))),
            Value::Array(_) | Value::Object(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    format!("cannot bind {} as a column value", self.0).into(),
                ))
            }
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

// ============================================================================
// EXPENSE RECORDS
// ============================================================================

/// A persisted expense. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub date: String,
    pub amount: Amount,
    pub category: String,
    pub subcategory: String,
    pub note: String,
}

/// Input for a new expense (the id is assigned by the store).
///
/// `date`, `amount` and `category` must be present; their types are left to SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub date: BindValue,
    pub amount: BindValue,
    pub category: BindValue,
    #[serde(default)]
    pub subcategory: BindValue,
    #[serde(default)]
    pub note: BindValue,
}

impl NewExpense {
    /// Expense with empty subcategory and note
    pub fn new(
        date: impl Into<BindValue>,
        amount: impl Into<BindValue>,
        category: impl Into<BindValue>,
    ) -> Self {
        Self {
            date: date.into(),
            amount: amount.into(),
            category: category.into(),
            subcategory: BindValue::default(),
            note: BindValue::default(),
        }
    }

    pub fn with_subcategory(mut self, subcategory: impl Into<BindValue>) -> Self {
        self.subcategory = subcategory.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<BindValue>) -> Self {
        self.note = note.into();
        self
    }
}

/// One aggregate row of `summarize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub total_amount: f64,
    pub count: i64,
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Success payload of `add`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedExpense {
    pub status: String,
    pub id: i64,
    pub message: String,
}

impl AddedExpense {
    pub fn new(id: i64) -> Self {
        Self {
            status: "success".to_string(),
            id,
            message: "Expense added successfully".to_string(),
        }
    }
}

/// Structured error payload: failures travel as data, not faults.
///
/// `kind` carries the storage error category so callers can tell a constraint
/// violation from an unreachable database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status: String,
    pub message: String,
    pub kind: String,
}

impl From<&StoreError> for ErrorPayload {
    fn from(err: &StoreError) -> Self {
        Self {
            status: "error".to_string(),
            message: err.to_string(),
            kind: err.kind().as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_serializes_as_plain_number() {
        let json = serde_json::to_value(Amount::Real(42.5)).unwrap();
        assert_eq!(json, serde_json::json!(42.5));

        let text = serde_json::to_value(Amount::Text("abc".into())).unwrap();
        assert_eq!(text, serde_json::json!("abc"));
    }

    #[test]
    fn test_amount_accepts_integer_and_string_json() {
        let from_int: Amount = serde_json::from_value(serde_json::json!(12)).unwrap();
        assert_eq!(from_int, Amount::Real(12.0));

        let from_str: Amount = serde_json::from_value(serde_json::json!("12.5")).unwrap();
        assert_eq!(from_str, Amount::Text("12.5".into()));
    }

    #[test]
    fn test_new_expense_defaults_optional_fields() {
        let input: NewExpense = serde_json::from_value(serde_json::json!({
            "date": "2024-03-01",
            "amount": 42.5,
            "category": "Food & Dining"
        }))
        .unwrap();

        assert_eq!(input.subcategory, BindValue::from(""));
        assert_eq!(input.note, BindValue::from(""));
        assert_eq!(input, NewExpense::new("2024-03-01", 42.5, "Food & Dining"));
    }

    #[test]
    fn test_new_expense_keeps_loose_types() {
        let input: NewExpense = serde_json::from_value(serde_json::json!({
            "date": 20240101,
            "amount": null,
            "category": true
        }))
        .unwrap();

        assert_eq!(input.date, BindValue(serde_json::json!(20240101)));
        assert_eq!(input.amount, BindValue(Value::Null));
        assert_eq!(input.category, BindValue(serde_json::json!(true)));

        let missing = serde_json::from_value::<NewExpense>(serde_json::json!({ "date": "2024-01-01" }));
        assert!(missing.is_err());
    }

    #[test]
    fn test_bind_value_sql_mapping() {
        let bind = |v: Value| match BindValue(v).to_sql() {
            Ok(ToSqlOutput::Owned(value)) => Ok(value),
            Ok(ToSqlOutput::Borrowed(value)) => Ok(SqlValue::from(value)),
            Ok(_) => panic!("unexpected output"),
            Err(e) => Err(e),
        };

        assert_eq!(bind(Value::Null).unwrap(), SqlValue::Null);
        assert_eq!(bind(serde_json::json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(bind(serde_json::json!(7)).unwrap(), SqlValue::Integer(7));
        assert_eq!(bind(serde_json::json!(7.5)).unwrap(), SqlValue::Real(7.5));
        assert_eq!(bind(serde_json::json!("x")).unwrap(), SqlValue::Text("x".into()));
        assert!(bind(serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn test_added_expense_shape() {
        let json = serde_json::to_value(AddedExpense::new(7)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "id": 7,
                "message": "Expense added successfully"
            })
        );
    }
}
