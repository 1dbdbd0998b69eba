//! Relational sandbox: an in-memory SQLite database seeded from an
//! exercise's schema and datasets.
//!
//! The database is built lazily on first query: schema DDL runs first,
//! then each dataset materializes as a table of TEXT columns named after
//! the CSV headers. Query faults are non-throwing results so learners
//! see the engine's error text; only connection-level faults are errors.

use std::time::Instant;

use sqlx::sqlite::SqliteConnection;
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::SandboxError;

use super::csv::parse_csv;
use super::{SandboxState, SqlExecutionResult};

/// Sandbox for relational-query submissions.
pub struct SqlSandbox {
    schema: Option<String>,
    /// (table name, raw tabular text) pairs to materialize.
    datasets: Vec<(String, String)>,
    state: SandboxState,
    conn: Option<SqliteConnection>,
}

impl SqlSandbox {
    pub fn new(schema: Option<String>, datasets: Vec<(String, String)>) -> Self {
        Self {
            schema,
            datasets,
            state: SandboxState::Uninitialized,
            conn: None,
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Executes a statement or batch against the seeded database.
    ///
    /// The first result set becomes `columns`/`rows`; a batch without a
    /// result set reports its modified-row count instead. Statement
    /// errors come back as a failed result carrying the engine's text.
    pub async fn run_query(&mut self, sql: &str) -> Result<SqlExecutionResult, SandboxError> {
        let started = Instant::now();
        let conn = self.ensure_ready().await?;

        match sqlx::raw_sql(sql).fetch_all(&mut *conn).await {
            Ok(rows) if rows.is_empty() => {
                let changes: i64 = sqlx::query_scalar("SELECT changes()")
                    .fetch_one(&mut *conn)
                    .await?;
                Ok(SqlExecutionResult {
                    success: true,
                    columns: Vec::new(),
                    rows: Vec::new(),
                    error: None,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    rows_affected: Some(changes.max(0) as u64),
                })
            }
            Ok(rows) => {
                let columns: Vec<String> = rows[0]
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();

                // A batch can produce several result sets; only the first
                // one is reported. Rows are concatenated in statement
                // order, so a column-set change marks the boundary.
                let mut mapped = Vec::with_capacity(rows.len());
                for row in &rows {
                    if !same_columns(row, &columns) {
                        break;
                    }
                    let mut object = serde_json::Map::new();
                    for column in row.columns() {
                        object.insert(column.name().to_string(), decode_value(row, column)?);
                    }
                    mapped.push(serde_json::Value::Object(object));
                }

                Ok(SqlExecutionResult {
                    success: true,
                    columns,
                    rows: mapped,
                    error: None,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    rows_affected: None,
                })
            }
            Err(e) => Ok(SqlExecutionResult {
                success: false,
                columns: Vec::new(),
                rows: Vec::new(),
                error: Some(e.to_string()),
                execution_time_ms: started.elapsed().as_millis() as u64,
                rows_affected: None,
            }),
        }
    }

    /// Discards the database and rebuilds it from the original schema and
    /// datasets.
    pub async fn reset(&mut self) -> Result<(), SandboxError> {
        self.conn = None;
        self.state = SandboxState::Uninitialized;
        self.ensure_ready().await?;
        Ok(())
    }

    /// Names of the user tables currently in the database.
    pub async fn tables(&mut self) -> Result<Vec<String>, SandboxError> {
        let conn = self.ensure_ready().await?;
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(conn)
        .await?;
        Ok(names)
    }

    async fn ensure_ready(&mut self) -> Result<&mut SqliteConnection, SandboxError> {
        if self.conn.is_none() {
            self.state = SandboxState::Bootstrapping;
            match self.build().await {
                Ok(conn) => {
                    self.conn = Some(conn);
                    self.state = SandboxState::Ready;
                }
                Err(e) => {
                    self.state = SandboxState::Error;
                    return Err(e);
                }
            }
        }

        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(SandboxError::Unavailable(
                "database session is not ready".to_string(),
            )),
        }
    }

    async fn build(&self) -> Result<SqliteConnection, SandboxError> {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await?;

        if let Some(schema) = &self.schema {
            sqlx::raw_sql(schema)
                .execute(&mut conn)
                .await
                .map_err(|e| SandboxError::Bootstrap(format!("schema failed: {e}")))?;
        }

        for (name, text) in &self.datasets {
            let table = parse_csv(text);
            if table.is_empty() {
                continue;
            }

            let columns = table
                .headers
                .iter()
                .map(|h| format!("{} TEXT", quote_ident(h)))
                .collect::<Vec<_>>()
                .join(", ");
            let ddl = format!("CREATE TABLE {} ({})", quote_ident(name), columns);
            sqlx::raw_sql(&ddl)
                .execute(&mut conn)
                .await
                .map_err(|e| SandboxError::Bootstrap(format!("table {name} failed: {e}")))?;

            for row in &table.rows {
                let values = row
                    .iter()
                    .map(|field| sql_literal(field))
                    .collect::<Vec<_>>()
                    .join(", ");
                let insert = format!("INSERT INTO {} VALUES ({})", quote_ident(name), values);
                sqlx::raw_sql(&insert)
                    .execute(&mut conn)
                    .await
                    .map_err(|e| SandboxError::Bootstrap(format!("seeding {name} failed: {e}")))?;
            }

            debug!(table = %name, rows = table.rows.len(), "dataset materialized");
        }

        info!(
            datasets = self.datasets.len(),
            has_schema = self.schema.is_some(),
            "database session ready"
        );
        Ok(conn)
    }
}

fn same_columns(row: &sqlx::sqlite::SqliteRow, columns: &[String]) -> bool {
    row.columns().len() == columns.len()
        && row
            .columns()
            .iter()
            .zip(columns)
            .all(|(column, name)| column.name() == name)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Empty fields become NULL; everything else is a quoted string literal.
fn sql_literal(field: &str) -> String {
    if field.is_empty() {
        "NULL".to_string()
    } else {
        format!("'{}'", field.replace('\'', "''"))
    }
}

fn decode_value(
    row: &sqlx::sqlite::SqliteRow,
    column: &sqlx::sqlite::SqliteColumn,
) -> Result<serde_json::Value, SandboxError> {
    let raw = row.try_get_raw(column.ordinal())?;
    if raw.is_null() {
        return Ok(serde_json::Value::Null);
    }

    let value = match raw.type_info().name() {
        "INTEGER" => serde_json::Value::from(row.try_get::<i64, _>(column.ordinal())?),
        "REAL" => serde_json::Value::from(row.try_get::<f64, _>(column.ordinal())?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(column.ordinal())?;
            serde_json::Value::from(format!("<blob {} bytes>", bytes.len()))
        }
        _ => serde_json::Value::from(row.try_get::<String, _>(column.ordinal())?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CITIES: &str = "name,population\nTokyo,37\nDelhi,32\nShanghai,29\n";

    fn sandbox() -> SqlSandbox {
        SqlSandbox::new(None, vec![("cities".to_string(), CITIES.to_string())])
    }

    #[tokio::test]
    async fn test_select_from_dataset() {
        let mut sandbox = sandbox();
        let result = sandbox
            .run_query("SELECT name FROM cities ORDER BY name")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.columns, vec!["name"]);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0]["name"], "Delhi");
        assert_eq!(sandbox.state(), SandboxState::Ready);
    }

    #[tokio::test]
    async fn test_quoted_fields_load_intact() {
        let data = "name,note\n\"Smith, John\",\"says \"\"hi\"\"\"\n";
        let mut sandbox = SqlSandbox::new(None, vec![("people".to_string(), data.to_string())]);
        let result = sandbox.run_query("SELECT * FROM people").await.unwrap();

        assert_eq!(result.rows[0]["name"], "Smith, John");
        assert_eq!(result.rows[0]["note"], "says \"hi\"");
    }

    #[tokio::test]
    async fn test_empty_fields_become_null() {
        let data = "a,b\n1,\n";
        let mut sandbox = SqlSandbox::new(None, vec![("t".to_string(), data.to_string())]);
        let result = sandbox
            .run_query("SELECT * FROM t WHERE b IS NULL")
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_dml_reports_rows_affected() {
        let mut sandbox = sandbox();
        let result = sandbox
            .run_query("DELETE FROM cities WHERE population < '35'")
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.rows.is_empty());
        assert_eq!(result.rows_affected, Some(2));
    }

    #[tokio::test]
    async fn test_batch_reports_only_first_result_set() {
        let mut sandbox = sandbox();
        let result = sandbox
            .run_query("SELECT 1 AS a; SELECT 2 AS b;")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.columns, vec!["a"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["a"], 1);
    }

    #[tokio::test]
    async fn test_statement_error_is_not_an_error() {
        let mut sandbox = sandbox();
        let result = sandbox.run_query("SELECT * FROM nowhere").await.unwrap();

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_reset_rebuilds_from_source() {
        let mut sandbox = sandbox();
        sandbox.run_query("DELETE FROM cities").await.unwrap();
        let empty = sandbox.run_query("SELECT * FROM cities").await.unwrap();
        assert!(empty.rows.is_empty());

        sandbox.reset().await.unwrap();
        let restored = sandbox.run_query("SELECT * FROM cities").await.unwrap();
        assert_eq!(restored.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_schema_runs_before_datasets() {
        let schema = "CREATE TABLE extra (id INTEGER PRIMARY KEY, label TEXT);\n\
                      INSERT INTO extra (label) VALUES ('seeded');";
        let mut sandbox = SqlSandbox::new(
            Some(schema.to_string()),
            vec![("cities".to_string(), CITIES.to_string())],
        );

        let tables = sandbox.tables().await.unwrap();
        assert_eq!(tables, vec!["cities", "extra"]);

        let result = sandbox.run_query("SELECT id, label FROM extra").await.unwrap();
        assert_eq!(result.rows[0]["id"], 1);
        assert_eq!(result.rows[0]["label"], "seeded");
    }

    #[tokio::test]
    async fn test_broken_schema_is_a_bootstrap_failure() {
        let mut sandbox = SqlSandbox::new(Some("CREATE GARBAGE".to_string()), vec![]);
        let err = sandbox.run_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, SandboxError::Bootstrap(_)));
        assert_eq!(sandbox.state(), SandboxState::Error);
    }

    #[tokio::test]
    async fn test_numeric_types_decode_as_numbers() {
        let schema = "CREATE TABLE m (n INTEGER, x REAL);\nINSERT INTO m VALUES (7, 2.5);";
        let mut sandbox = SqlSandbox::new(Some(schema.to_string()), vec![]);
        let result = sandbox.run_query("SELECT n, x FROM m").await.unwrap();

        assert_eq!(result.rows[0]["n"], 7);
        assert_eq!(result.rows[0]["x"], 2.5);
    }
}
