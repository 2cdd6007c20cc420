//! Query execution models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type of SQL statement, classified from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// SELECT query returning rows
    Select,
    /// INSERT operation
    Insert,
    /// UPDATE operation
    Update,
    /// DELETE operation
    Delete,
    /// DDL, COPY, or other operations
    Other,
}

impl QueryType {
    /// Detect the type of SQL statement.
    pub fn detect(sql: &str) -> Self {
        match statement_verb(sql).as_str() {
            "SELECT" | "WITH" | "VALUES" | "TABLE" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }
}

/// Extract the leading keyword of a statement, uppercased (e.g. `SELECT`, `CREATE`).
///
/// Leading whitespace, `--` line comments and `/* */` block comments (which may
/// nest) are skipped. This is the first keyword as written, not the server's
/// command tag: `WITH moved AS (DELETE ...) INSERT ...` reports `WITH`.
pub fn statement_verb(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if rest.starts_with("/*") {
            rest = skip_block_comment(rest);
        } else {
            break;
        }
        rest = rest.trim_start();
    }
    rest.split(|c: char| c.is_whitespace() || c == '(' || c == ';' || c == '/')
        .next()
        .unwrap_or("")
        .to_uppercase()
}

/// Return what follows the block comment `sql` starts with, or `""` if it never closes.
fn skip_block_comment(sql: &str) -> &str {
    let mut depth = 0usize;
    let mut rest = sql;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("/*") {
            depth += 1;
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("*/") {
            depth -= 1;
            rest = tail;
            if depth == 0 {
                return rest;
            }
        } else {
            let mut chars = rest.chars();
            chars.next();
            rest = chars.as_str();
        }
    }
    ""
}

/// Column metadata from query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// PostgreSQL type OID
    pub type_oid: u32,
    /// Human-readable type name
    pub type_name: String,
}

/// Results of a single executed statement.
///
/// Built fresh for every call and handed to the caller by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Statement verb (e.g. `SELECT`, `INSERT`, `CREATE`)
    pub command: String,
    /// Rows returned, or rows affected for statements without a result set
    pub row_count: u64,
    /// Column metadata, in result order
    pub fields: Vec<ColumnInfo>,
    /// Result rows keyed by column name
    pub rows: Vec<Map<String, Value>>,
    /// Time to execute in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty result for the given statement verb.
    pub fn empty(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            row_count: 0,
            fields: Vec::new(),
            rows: Vec::new(),
            execution_time_ms: 0,
        }
    }

    /// Classify the statement that produced this result.
    pub fn query_type(&self) -> QueryType {
        QueryType::detect(&self.command)
    }

    /// Check if the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get a value by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}
