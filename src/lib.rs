//! # pocogen
//!
//! Generate model classes from database schemas
//!
//! This crate provides a CLI tool and library for reading the catalog of a
//! SQL Server, SQLite, MySQL or PostgreSQL database, normalizing it into a
//! vendor-neutral model of tables, columns and foreign keys, and generating
//! one model class per table.

pub mod codegen;
pub mod config;
pub mod error;
pub mod introspect;
pub mod naming;
pub mod schema;

pub mod prelude {
    pub use crate::codegen::{CSharpGenerator, CodeGenConfig, CodeGenerator};
    pub use crate::config::DbConfig;
    pub use crate::error::PocoGenError;
    pub use crate::introspect::{get_reader, read_schema, SchemaReader, TableFilter};
    pub use crate::schema::{Column, DbServerType, Key, ScalarType, Table, Tables};
}

#[cfg(feature = "mssql")]
pub use introspect::MsSqlSchemaReader;
#[cfg(feature = "mysql")]
pub use introspect::MySqlSchemaReader;
#[cfg(feature = "postgres")]
pub use introspect::PostgresSchemaReader;
#[cfg(feature = "sqlite")]
pub use introspect::SqliteSchemaReader;
