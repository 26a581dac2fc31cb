//! Database introspection
//!
//! This module reads catalog metadata and normalizes it into [`Tables`].
//! Each supported database has its own feature-gated reader; the key graph
//! assembly and primary key policy are shared free functions.

use tracing::{debug, info, trace};

use crate::naming;
use crate::prelude::{Column, DbServerType, PocoGenError, Table, Tables};

pub mod keys;

#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "mssql")]
pub use mssql::MsSqlSchemaReader;
#[cfg(feature = "mysql")]
pub use mysql::MySqlSchemaReader;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSchemaReader;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSchemaReader;

/// A vendor specific schema reader.
///
/// The reader owns its connection from the start of `read_schema` until
/// `close` is called or the reader is dropped.
pub trait SchemaReader {
    /// Database server this reader understands
    fn server_type(&self) -> DbServerType;

    /// Open a connection and read every table and view of the database
    fn read_schema(&mut self, connection_string: &str) -> Result<Tables, PocoGenError>;

    /// Release the connection, if one is open
    fn close(&mut self);
}

/// Select the schema reader for a database server
#[allow(unreachable_patterns)]
pub fn get_reader(server_type: DbServerType) -> Result<Box<dyn SchemaReader>, PocoGenError> {
    debug!(server_type = ?server_type, "Selecting schema reader");

    match server_type {
        #[cfg(feature = "mssql")]
        DbServerType::MsSql => Ok(Box::new(MsSqlSchemaReader::new())),
        #[cfg(feature = "sqlite")]
        DbServerType::Sqlite => Ok(Box::new(SqliteSchemaReader::new())),
        #[cfg(feature = "mysql")]
        DbServerType::MySql => Ok(Box::new(MySqlSchemaReader::new())),
        #[cfg(feature = "postgres")]
        DbServerType::Postgres => Ok(Box::new(PostgresSchemaReader::new())),
        other => Err(PocoGenError::Unsupported(other)),
    }
}

/// Read a schema with a fresh reader, closing it on every exit path
pub fn read_schema(
    server_type: DbServerType,
    connection_string: &str,
) -> Result<Tables, PocoGenError> {
    let mut reader = get_reader(server_type)?;
    let result = reader.read_schema(connection_string);
    reader.close();

    if let Ok(tables) = &result {
        info!(
            server_type = ?server_type,
            tables = ?tables.len(),
            "Schema read complete"
        );
    }
    result
}

/// Mark the primary key column from the names returned by a key query.
///
/// Exactly one name marks the matching column. Zero names mean the table
/// has no key; several names mean a composite key, which is not modeled, so
/// every column is left unmarked.
pub fn resolve_primary_key(table_name: &str, columns: &mut [Column], pk_names: &[String]) {
    for column in columns.iter_mut() {
        column.is_pk = false;
    }

    match pk_names {
        [] => trace!(table = ?table_name, "No primary key"),
        [pk_name] => {
            let wanted = pk_name.trim().to_lowercase();
            match columns
                .iter_mut()
                .find(|col| col.name.trim().to_lowercase() == wanted)
            {
                Some(column) => {
                    trace!(table = ?table_name, column = ?column.name, "Primary key");
                    column.is_pk = true;
                }
                None => debug!(
                    table = ?table_name,
                    primary_key = ?pk_name,
                    "Primary key column not found among columns"
                ),
            }
        }
        _ => debug!(
            table = ?table_name,
            primary_key = ?pk_names,
            "Composite primary key, treating table as keyless"
        ),
    }
}

/// Clear every primary key flag when more than one column carries one
pub fn suppress_composite_key(table_name: &str, columns: &mut [Column]) {
    let pk_count = columns.iter().filter(|col| col.is_pk).count();
    if pk_count > 1 {
        debug!(
            table = ?table_name,
            columns = ?pk_count,
            "Composite primary key, treating table as keyless"
        );
        for column in columns.iter_mut() {
            column.is_pk = false;
        }
    }
}

/// Filters applied to a read schema before generation
#[derive(Debug, Default, Clone)]
pub struct TableFilter {
    /// Only include these tables (if Some)
    pub include: Option<Vec<String>>,
    /// Exclude these tables
    pub exclude: Option<Vec<String>>,
    /// Exclude tables whose name starts with one of these prefixes
    pub exclude_prefixes: Vec<String>,
}

impl TableFilter {
    /// Check if a table should be included
    pub fn should_include(&self, table_name: &str) -> bool {
        // Check include list
        if let Some(include) = &self.include {
            if !include.iter().any(|t| t == table_name) {
                return false;
            }
        }

        // Check exclude list
        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|t| t == table_name) {
                return false;
            }
        }

        !naming::is_excluded(table_name, &self.exclude_prefixes)
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none() && self.exclude_prefixes.is_empty()
    }

    /// Drop the tables this filter does not include
    pub fn apply(&self, tables: &mut Tables) {
        let before = tables.len();
        tables.retain(|table: &Table| self.should_include(&table.name));
        debug!(before = ?before, after = ?tables.len(), "Tables after filtering");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;

    fn columns(names: &[&str]) -> Vec<Column> {
        names
            .iter()
            .map(|name| Column::new(*name, ScalarType::I32, false, false))
            .collect()
    }

    fn pk_count(columns: &[Column]) -> usize {
        columns.iter().filter(|col| col.is_pk).count()
    }

    #[test]
    fn test_resolve_single_primary_key() {
        let mut cols = columns(&["OrderID", "CustomerID"]);
        resolve_primary_key("Orders", &mut cols, &["orderid ".to_string()]);

        assert_eq!(pk_count(&cols), 1);
        assert!(cols[0].is_pk);
    }

    #[test]
    fn test_resolve_composite_primary_key() {
        let mut cols = columns(&["OrderID", "ProductID", "Quantity"]);
        resolve_primary_key(
            "OrderDetails",
            &mut cols,
            &["OrderID".to_string(), "ProductID".to_string()],
        );

        assert_eq!(pk_count(&cols), 0);
    }

    #[test]
    fn test_resolve_missing_primary_key() {
        let mut cols = columns(&["Name"]);
        resolve_primary_key("Log", &mut cols, &[]);
        assert_eq!(pk_count(&cols), 0);

        resolve_primary_key("Log", &mut cols, &["Id".to_string()]);
        assert_eq!(pk_count(&cols), 0);
    }

    #[test]
    fn test_suppress_composite_key() {
        let mut cols = columns(&["A", "B", "C"]);
        cols[0].is_pk = true;
        cols[1].is_pk = true;

        suppress_composite_key("Pairs", &mut cols);

        assert!(cols.iter().all(|col| !col.is_pk));
    }

    #[test]
    fn test_suppress_keeps_single_key() {
        let mut cols = columns(&["A", "B"]);
        cols[1].is_pk = true;

        suppress_composite_key("Single", &mut cols);

        assert!(!cols[0].is_pk);
        assert!(cols[1].is_pk);
    }

    #[test]
    fn test_table_filter() {
        let filter = TableFilter {
            include: None,
            exclude: Some(vec!["Logs".to_string()]),
            exclude_prefixes: vec!["sys".to_string()],
        };

        assert!(filter.should_include("Orders"));
        assert!(!filter.should_include("Logs"));
        assert!(!filter.should_include("sysdiagrams"));

        let mut tables: Tables = ["Orders", "Logs", "sysdiagrams"]
            .iter()
            .map(|name| Table::new(*name, "", false))
            .collect();
        filter.apply(&mut tables);

        assert_eq!(tables.len(), 1);
        assert_eq!(tables.as_slice()[0].name, "Orders");
    }

    #[test]
    fn test_table_filter_include() {
        let filter = TableFilter {
            include: Some(vec!["Orders".to_string()]),
            ..Default::default()
        };

        assert!(filter.should_include("Orders"));
        assert!(!filter.should_include("Customers"));
        assert!(!filter.is_empty());
        assert!(TableFilter::default().is_empty());
    }

    #[cfg(not(feature = "mssql"))]
    #[test]
    fn test_get_reader_without_feature() {
        let err = get_reader(DbServerType::MsSql).err().unwrap();
        assert!(matches!(err, PocoGenError::Unsupported(DbServerType::MsSql)));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_get_reader_dispatch() {
        let reader = get_reader(DbServerType::Sqlite).unwrap();
        assert_eq!(reader.server_type(), DbServerType::Sqlite);
    }
}
