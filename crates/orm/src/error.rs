//! Errors

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Errors raised while compiling schemas, building statements or running them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // --- Schema-definition errors ---
    /// The entity description is inconsistent.
    #[error("schema error: {0}")]
    Schema(String),

    /// A bare column in a condition matches no field, join field, count or
    /// expression of the entity.
    #[error("column `{column}` is not defined on `{table}`")]
    UnknownColumn {
        /// Main table of the entity.
        table: String,
        /// The unmatched column.
        column: String,
    },

    /// A join or count is attached to a join that has not been compiled.
    #[error("no join `{key}` to attach to on `{table}`")]
    UnknownAlias {
        /// Main table of the entity.
        table: String,
        /// Key of the missing join.
        key: String,
    },

    // --- Execution errors ---
    /// The database connection reported a failure.
    #[error("execution failed: {0}")]
    Execution(String),

    // --- Caller errors ---
    /// An input document or value could not be interpreted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The entity does not allow the requested write.
    #[error("{operation} is not permitted on `{entity}`")]
    NotPermitted {
        /// Entity name.
        entity: String,
        /// `create`, `edit` or `delete`.
        operation: String,
    },

    /// No row exists for the identifier.
    #[error("`{entity}` {id} not found")]
    NotFound {
        /// Entity name.
        entity: String,
        /// The missing identifier.
        id: i64,
    },
}

impl Error {
    /// Whether the error originates from the schema definition rather than
    /// from data or the database.
    #[must_use]
    pub const fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_) | Self::UnknownColumn { .. } | Self::UnknownAlias { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        // keep our own variants when they were wrapped with context
        if let Some(inner) = err.downcast_ref::<Self>() {
            return inner.clone();
        }

        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ");
        Self::Execution(chain)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
