//! # Connection traits
//!
//! Traits implemented by SQL providers and the options used to open them.

use std::fmt::Debug;

use anyhow::Result;

use crate::types::{DataType, Row};

/// SQL providers implement the [`Connection`] trait to allow the query layer
/// to execute statements against a backend (`SQLite`, `MySQL`, etc).
///
/// Statements use positional `?` placeholders; `params` are bound in order.
pub trait Connection: Debug + Send + Sync + 'static {
    /// Execute a query and return the resulting rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared or executed.
    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>>;

    /// Execute a statement that does not return rows (e.g., an `INSERT`,
    /// `UPDATE`, or `DELETE`), returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared or executed.
    fn exec(&self, sql: &str, params: &[DataType]) -> Result<u64>;

    /// Execute a parameterless statement, reporting whether it touched any row.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared or executed.
    fn execute(&self, sql: &str) -> Result<bool> {
        Ok(self.exec(sql, &[])? > 0)
    }

    /// Identifier generated by the most recent successful `INSERT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report the identifier.
    fn last_insert_id(&self) -> Result<i64>;
}

/// Implemented by backend resources to allow them to be opened from
/// environment-provided options.
pub trait Backend: Sized + Sync + Send {
    /// The options used to connect to the backend.
    type ConnectOptions: FromEnv;

    /// Connect to the resource using options read from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be loaded or the connection fails.
    fn connect() -> Result<Self> {
        Self::connect_with(Self::ConnectOptions::from_env()?)
    }

    /// Connect to the resource with the specified options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    fn connect_with(options: Self::ConnectOptions) -> Result<Self>;
}

/// Trait for creating options from environment variables.
pub trait FromEnv: Sized {
    /// Create options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}
