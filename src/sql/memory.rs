//! # In-Memory Backend
//!
//! A small table store that understands just enough SQL to drive the
//! gateway without a database server. Each transaction works on a private
//! copy of the tables which replaces the shared state on commit.
//!
//! Supported statements:
//!
//! - `CREATE TABLE t (a, b, ...)`
//! - `INSERT INTO t VALUES (v, ...)`
//! - `SELECT * FROM t`
//! - `SELECT v [AS name], ...` without a table
//! - `DELETE FROM t`
//! - `SIGNAL ...`, which always fails

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Number, Value};

use super::backend::{BoxFuture, RowSet, SqlConnector, SqlTransaction};
use super::errors::{SqlError, SqlResult};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    begun: usize,
    commits: usize,
    rollbacks: usize,
}

/// Shared in-memory database; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a table with committed rows
    pub fn seed(&self, table: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.lock().tables.insert(
            table.to_ascii_lowercase(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
    }

    /// Committed rows of a table; empty when it does not exist
    pub fn table(&self, table: &str) -> Vec<Vec<Value>> {
        self.lock()
            .tables
            .get(&table.to_ascii_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn transactions_begun(&self) -> usize {
        self.lock().begun
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }
}

impl SqlConnector for MemoryConnector {
    fn begin(&self) -> BoxFuture<'_, SqlResult<Box<dyn SqlTransaction>>> {
        let tables = {
            let mut state = self.lock();
            state.begun += 1;
            state.tables.clone()
        };
        let tx: Box<dyn SqlTransaction> = Box::new(MemoryTransaction {
            owner: self.clone(),
            tables,
        });
        Box::pin(async move { Ok(tx) })
    }
}

struct MemoryTransaction {
    owner: MemoryConnector,
    tables: BTreeMap<String, Table>,
}

impl MemoryTransaction {
    fn run(&mut self, sql: &str, params: &[Value]) -> SqlResult<Outcome> {
        let mut binder = Binder { params, next: 0 };
        let upper: Vec<String> = sql
            .split_whitespace()
            .map(|w| w.to_ascii_uppercase())
            .collect();
        let keyword = |i: usize| upper.get(i).map(String::as_str).unwrap_or_default();

        match keyword(0) {
            "SIGNAL" => Err(SqlError::Database(
                "Unhandled user-defined exception condition".into(),
            )),
            "CREATE" if keyword(1) == "TABLE" => {
                let (name, rest) = split_name(sql_after(sql, 2))?;
                let columns = split_list(strip_parens(rest)?)
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .collect();
                self.tables.insert(name, Table { columns, rows: Vec::new() });
                Ok(Outcome::Affected(0))
            }
            "INSERT" if keyword(1) == "INTO" => {
                let (name, rest) = split_name(sql_after(sql, 2))?;
                let rest = rest.trim_start();
                let values = rest
                    .get(..6)
                    .filter(|v| v.eq_ignore_ascii_case("VALUES"))
                    .map(|_| &rest[6..])
                    .ok_or_else(|| syntax(sql))?;
                let row = split_list(strip_parens(values)?)
                    .into_iter()
                    .map(|v| binder.literal(v))
                    .collect::<SqlResult<Vec<_>>>()?;
                let table = self.tables.entry(name).or_insert_with(|| Table {
                    columns: (0..row.len()).map(|i| format!("c{}", i)).collect(),
                    rows: Vec::new(),
                });
                table.rows.push(row);
                Ok(Outcome::Affected(1))
            }
            "DELETE" if keyword(1) == "FROM" => {
                let (name, _) = split_name(sql_after(sql, 2))?;
                let removed = self
                    .tables
                    .get_mut(&name)
                    .map(|t| std::mem::take(&mut t.rows).len())
                    .unwrap_or_default();
                Ok(Outcome::Affected(removed as u64))
            }
            "SELECT" if keyword(1) == "*" && keyword(2) == "FROM" => {
                let (name, _) = split_name(sql_after(sql, 3))?;
                let table = self
                    .tables
                    .get(&name)
                    .ok_or_else(|| SqlError::Database(format!("Table '{}' doesn't exist", name)))?;
                Ok(Outcome::Rows(RowSet {
                    headers: table.columns.clone(),
                    rows: table.rows.clone(),
                }))
            }
            "SELECT" => {
                let mut set = RowSet::default();
                let mut row = Vec::new();
                for (i, item) in split_list(sql_after(sql, 1)).into_iter().enumerate() {
                    let (expr, alias) = split_alias(item);
                    row.push(binder.literal(expr)?);
                    set.headers.push(alias.unwrap_or_else(|| format!("c{}", i)));
                }
                set.rows.push(row);
                Ok(Outcome::Rows(set))
            }
            _ => Err(syntax(sql)),
        }
    }
}

enum Outcome {
    Affected(u64),
    Rows(RowSet),
}

impl SqlTransaction for MemoryTransaction {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, SqlResult<u64>> {
        Box::pin(async move {
            match self.run(sql, params)? {
                Outcome::Affected(n) => Ok(n),
                Outcome::Rows(set) => Ok(set.rows.len() as u64),
            }
        })
    }

    fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, SqlResult<RowSet>> {
        Box::pin(async move {
            match self.run(sql, params)? {
                Outcome::Rows(set) => Ok(set),
                Outcome::Affected(_) => Ok(RowSet::default()),
            }
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, SqlResult<()>> {
        let MemoryTransaction { owner, tables } = *self;
        {
            let mut state = owner.lock();
            state.tables = tables;
            state.commits += 1;
        }
        Box::pin(async { Ok(()) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, SqlResult<()>> {
        self.owner.lock().rollbacks += 1;
        Box::pin(async { Ok(()) })
    }
}

struct Binder<'p> {
    params: &'p [Value],
    next: usize,
}

impl Binder<'_> {
    fn literal(&mut self, raw: &str) -> SqlResult<Value> {
        let raw = raw.trim();
        if raw == "?" {
            let value = self.params.get(self.next).cloned().ok_or_else(|| {
                SqlError::Database("Incorrect arguments to mysqld_stmt_execute".into())
            })?;
            self.next += 1;
            return Ok(value);
        }
        if let Some(inner) = raw
            .strip_prefix('\'')
            .and_then(|r| r.strip_suffix('\''))
        {
            return Ok(Value::String(inner.replace("\\'", "'").replace("''", "'")));
        }
        match raw.to_ascii_uppercase().as_str() {
            "NULL" => return Ok(Value::Null),
            "TRUE" => return Ok(Value::Bool(true)),
            "FALSE" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::from(i));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| SqlError::Database(format!("Unknown column '{}'", raw)))
    }
}

fn syntax(sql: &str) -> SqlError {
    SqlError::Database(format!(
        "You have an error in your SQL syntax near '{}'",
        sql
    ))
}

/// Text after the first `n` whitespace-separated words
fn sql_after(sql: &str, n: usize) -> &str {
    let mut rest = sql.trim_start();
    for _ in 0..n {
        rest = rest
            .find(char::is_whitespace)
            .map(|i| rest[i..].trim_start())
            .unwrap_or_default();
    }
    rest
}

fn split_name(text: &str) -> SqlResult<(String, &str)> {
    let end = text
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(text.len());
    let name = text[..end].trim_matches('`').to_ascii_lowercase();
    if name.is_empty() {
        return Err(syntax(text));
    }
    Ok((name, &text[end..]))
}

fn strip_parens(text: &str) -> SqlResult<&str> {
    text.trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| syntax(text))
}

/// Split on commas outside single quotes
fn split_list(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut prev = '\0';
    for (i, c) in text.char_indices() {
        match c {
            '\'' if prev != '\\' => quoted = !quoted,
            ',' if !quoted => {
                items.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        prev = c;
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

fn split_alias(item: &str) -> (&str, Option<String>) {
    let upper = item.to_ascii_uppercase();
    match upper.rfind(" AS ") {
        Some(i) if !item[i..].contains('\'') => (
            item[..i].trim(),
            Some(item[i + 4..].trim().trim_matches('`').to_string()),
        ),
        _ => (item, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_commit_publishes_rows() {
        let db = MemoryConnector::new();
        let mut tx = db.begin().await.unwrap();
        tx.execute("CREATE TABLE users (id, name)", &[]).await.unwrap();
        tx.execute("INSERT INTO users VALUES (?, 'ann')", &[json!(1)])
            .await
            .unwrap();
        assert!(db.table("users").is_empty());
        tx.commit().await.unwrap();
        assert_eq!(db.table("users"), vec![vec![json!(1), json!("ann")]]);
    }

    #[tokio::test]
    async fn test_rollback_discards_rows() {
        let db = MemoryConnector::new();
        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(db.table("t").is_empty());
        assert_eq!(db.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_literal_select_with_aliases() {
        let db = MemoryConnector::new();
        let mut tx = db.begin().await.unwrap();
        let set = tx
            .query("SELECT ? AS id, 'a, b' AS code, NULL", &[json!(7)])
            .await
            .unwrap();
        assert_eq!(set.headers, vec!["id", "code", "c2"]);
        assert_eq!(set.rows[0], vec![json!(7), json!("a, b"), Value::Null]);
    }

    #[tokio::test]
    async fn test_unknown_statement_fails() {
        let db = MemoryConnector::new();
        let mut tx = db.begin().await.unwrap();
        assert!(tx.execute("DROP DATABASE x", &[]).await.is_err());
        assert!(tx.execute("SIGNAL SQLSTATE '45000'", &[]).await.is_err());
    }
}
