use thiserror::Error;

use crate::config::redact_connection_string;
use crate::schema::DbServerType;

/// pocogen errors
#[derive(Error, Debug)]
pub enum PocoGenError {
    #[error("Failed to connect to {server} database at '{target}': {message}")]
    Connection {
        server: DbServerType,
        /// Connection string with credentials redacted
        target: String,
        message: String,
    },

    #[error("{server} catalog query failed while {step}: {message}")]
    CatalogQuery {
        server: DbServerType,
        step: String,
        message: String,
    },

    #[error("Expected exactly one table named '{name}', found {matches}")]
    TableLookup { name: String, matches: usize },

    #[error("{0} support not enabled. Rebuild with the matching cargo feature")]
    Unsupported(DbServerType),

    #[error("Code generation failed for table '{table}': {message}")]
    CodeGen { table: String, message: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PocoGenError {
    pub(crate) fn connection(
        server: DbServerType,
        connection_string: &str,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Connection {
            server,
            target: redact_connection_string(connection_string),
            message: err.to_string(),
        }
    }

    pub(crate) fn catalog(
        server: DbServerType,
        step: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::CatalogQuery {
            server,
            step: step.into(),
            message: err.to_string(),
        }
    }
}
