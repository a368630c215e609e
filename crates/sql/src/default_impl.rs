//! Default `SQLite` implementation of [`Connection`].
//!
//! This is a lightweight implementation for development and tests.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use std::sync::Arc;

use anyhow::{Context, Result};
use fromenv::FromEnv;
use rusqlite::types::ValueRef;
use rusqlite::{Connection as SqliteConnection, params_from_iter};
use tracing::instrument;

use crate::connection::{Backend, Connection};
use crate::types::{DataType, Field, Row};

/// Options used to connect to the SQL database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Path or URI of the `SQLite` database.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,
}

impl crate::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// Default `SQLite` backed [`Connection`].
#[derive(Debug, Clone)]
pub struct SqlDefault {
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Arc<parking_lot::Mutex<SqliteConnection>>,
}

impl Backend for SqlDefault {
    type ConnectOptions = ConnectOptions;

    #[instrument]
    fn connect_with(options: Self::ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn =
            SqliteConnection::open(&options.database).context("failed to open SQLite database")?;

        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }
}

impl SqlDefault {
    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn in_memory() -> Result<Self> {
        Self::connect_with(ConnectOptions {
            database: ":memory:".to_string(),
        })
    }

    /// Runs a batch of semicolon separated statements without parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!("executing batch");
        self.conn.lock().execute_batch(sql).context("failed to execute batch")
    }
}

impl Connection for SqlDefault {
    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>> {
        tracing::debug!("executing query: {sql}");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        let rusqlite_params: Vec<_> = params.iter().map(datatype_to_rusqlite_value).collect();

        let column_names: Vec<String> =
            stmt.column_names().iter().map(ToString::to_string).collect();

        let mut rows = stmt
            .query(params_from_iter(rusqlite_params.iter()))
            .context("failed to execute query")?;

        let mut result_rows = Vec::new();
        let mut index = 0;
        while let Some(row) = rows.next().context("failed to fetch row")? {
            let mut fields = Vec::with_capacity(column_names.len());

            for (i, name) in column_names.iter().enumerate() {
                let value = row.get_ref(i).context("failed to get column value")?;
                fields.push(Field {
                    name: name.clone(),
                    value: rusqlite_value_to_datatype(value)?,
                });
            }

            result_rows.push(Row {
                index: index.to_string(),
                fields,
            });
            index += 1;
        }

        Ok(result_rows)
    }

    fn exec(&self, sql: &str, params: &[DataType]) -> Result<u64> {
        tracing::debug!("executing statement: {sql}");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        let rusqlite_params: Vec<_> = params.iter().map(datatype_to_rusqlite_value).collect();

        let rows_affected = stmt
            .execute(params_from_iter(rusqlite_params.iter()))
            .context("failed to execute statement")?;

        Ok(rows_affected as u64)
    }

    fn last_insert_id(&self) -> Result<i64> {
        Ok(self.conn.lock().last_insert_rowid())
    }
}

fn datatype_to_rusqlite_value(dt: &DataType) -> rusqlite::types::Value {
    match dt {
        DataType::Boolean(Some(b)) => rusqlite::types::Value::Integer(i64::from(*b)),
        DataType::Int32(Some(i)) => rusqlite::types::Value::Integer(i64::from(*i)),
        DataType::Int64(Some(i)) => rusqlite::types::Value::Integer(*i),
        DataType::Uint32(Some(u)) => rusqlite::types::Value::Integer(i64::from(*u)),
        DataType::Uint64(Some(u)) => rusqlite::types::Value::Integer(*u as i64),
        DataType::Float(Some(f)) => rusqlite::types::Value::Real(f64::from(*f)),
        DataType::Double(Some(f)) => rusqlite::types::Value::Real(*f),
        DataType::Str(Some(s))
        | DataType::Date(Some(s))
        | DataType::Time(Some(s))
        | DataType::Timestamp(Some(s)) => rusqlite::types::Value::Text(s.clone()),
        DataType::Binary(Some(b)) => rusqlite::types::Value::Blob(b.clone()),
        // All None variants map to NULL
        _ => rusqlite::types::Value::Null,
    }
}

fn rusqlite_value_to_datatype(value: ValueRef) -> Result<DataType> {
    match value {
        ValueRef::Null => Ok(DataType::Str(None)),
        ValueRef::Integer(i) => Ok(DataType::Int64(Some(i))),
        ValueRef::Real(f) => Ok(DataType::Double(Some(f))),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(DataType::Str(Some(s.to_string())))
        }
        ValueRef::Blob(b) => Ok(DataType::Binary(Some(b.to_vec()))),
    }
}
