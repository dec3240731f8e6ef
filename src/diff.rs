// 📊 Diff Calculator - typed per-entity change detection
// Compares proposed attributes against persisted values so no-op UPDATEs
// are never issued and repeated runs over unchanged input stay idempotent

use chrono::NaiveDate;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;

// ============================================================================
// SQL VALUE
// ============================================================================

/// Owned column value usable both as a rusqlite parameter and as a literal
/// in the replayable audit script.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Render as a SQL literal for the audit script
    pub fn literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Real(r) => format!("{}", r),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

// ============================================================================
// ROW
// ============================================================================

/// Ordered column/value list for an INSERT, shared by store execution and
/// the audit script.
#[derive(Debug, Default)]
pub struct Row {
    columns: Vec<(&'static str, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.columns.push((column, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Parameterized `INSERT INTO table (...) VALUES (?1, ...)` for execution
    pub fn insert_sql(&self, table: &str) -> String {
        let cols: Vec<&str> = self.columns.iter().map(|(c, _)| *c).collect();
        let marks: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            marks.join(", ")
        )
    }

    /// Literal `INSERT` statement for the replayable audit script
    pub fn insert_literal(&self, table: &str) -> String {
        let cols: Vec<&str> = self.columns.iter().map(|(c, _)| *c).collect();
        let vals: Vec<String> = self.columns.iter().map(|(_, v)| v.literal()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            table,
            cols.join(", "),
            vals.join(", ")
        )
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.columns.iter().map(|(_, v)| v)
    }
}

// ============================================================================
// CHANGE SET
// ============================================================================

/// The changed subset of a proposed attribute set versus the persisted row.
///
/// Identity and bookkeeping columns (id, created_at, updated_at) are never
/// fed into a change set. An empty set means the update is suppressed.
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: Vec<(&'static str, SqlValue)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    /// Include `column` only when the proposed value differs from the
    /// persisted one, by value equality.
    pub fn compare<T>(&mut self, column: &'static str, persisted: T, proposed: T)
    where
        T: PartialEq + Into<SqlValue>,
    {
        if persisted != proposed {
            self.changes.push((column, proposed.into()));
        }
    }

    /// Force a column in (used when the persisted side has no value yet)
    pub fn set(&mut self, column: &'static str, value: impl Into<SqlValue>) {
        self.changes.push((column, value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Parameterized `UPDATE table SET ... WHERE id = ?N` for execution
    pub fn update_sql(&self, table: &str) -> String {
        let sets: Vec<String> = self
            .changes
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} = ?{}", c, i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            sets.join(", "),
            self.changes.len() + 1
        )
    }

    /// Literal `UPDATE` statement for the replayable audit script
    pub fn update_literal(&self, table: &str, id: i64) -> String {
        let sets: Vec<String> = self
            .changes
            .iter()
            .map(|(c, v)| format!("{} = {}", c, v.literal()))
            .collect();
        format!("UPDATE {} SET {} WHERE id = {};", table, sets.join(", "), id)
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.changes.iter().map(|(_, v)| v)
    }
}
