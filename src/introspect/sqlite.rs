use rusqlite::{Connection, OpenFlags};
use tracing::{debug, error, info, trace, warn};

use super::keys::{attach_key_rows, ForeignKeyRow};
use super::{suppress_composite_key, SchemaReader};
use crate::prelude::{Column, DbServerType, PocoGenError, ScalarType, Table, Tables};

const SERVER: DbServerType = DbServerType::Sqlite;

/// Every table and view, in creation order
const TABLES_SQL: &str = r#"
    SELECT 'main' AS table_schema, name AS table_name, type AS table_type
    FROM sqlite_master
    WHERE type IN ('table', 'view')
        AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
    ORDER BY rowid
"#;

/// Every column of every table and view. Flags are string encoded.
///
/// Only an INTEGER rowid alias key is implicitly NOT NULL; any other key
/// column is nullable unless declared otherwise.
const COLUMNS_SQL: &str = r#"
    SELECT
        m.name AS table_name,
        p.name AS column_name,
        p.type AS data_type,
        CASE
            WHEN p."notnull" = 1 THEN 'False'
            WHEN p.pk = 1
                AND upper(p.type) = 'INTEGER'
                AND (SELECT count(*) FROM pragma_table_info(m.name) k WHERE k.pk > 0) = 1
            THEN 'False' ELSE 'True'
        END AS is_nullable,
        CASE WHEN p.pk > 0 THEN 'True' ELSE 'False' END AS primary_key,
        CASE
            WHEN p.pk = 1
                AND upper(p.type) = 'INTEGER'
                AND upper(coalesce(m.sql, '')) LIKE '%AUTOINCREMENT%'
            THEN 'True' ELSE 'False'
        END AS is_autoincrement
    FROM sqlite_master m
    JOIN pragma_table_info(m.name) p
    WHERE m.type IN ('table', 'view')
        AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
    ORDER BY m.name, p.cid
"#;

/// Every foreign key column pair of the database
const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        m.name AS table_name,
        f.id AS id,
        f.seq AS seq,
        f."table" AS fkey_to_table,
        f."from" AS fkey_from_column,
        f."to" AS fkey_to_column
    FROM sqlite_master m
    JOIN pragma_foreign_key_list(m.name) f
    WHERE m.type = 'table'
        AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
    ORDER BY m.name, f.id, f.seq
"#;

/// SQLite schema reader
///
/// Reads three whole-database catalog dumps (tables, columns, foreign keys)
/// and splits them per table in memory.
pub struct SqliteSchemaReader {
    connection: Option<Connection>,
}

impl SqliteSchemaReader {
    pub fn new() -> Self {
        Self { connection: None }
    }
}

impl Default for SqliteSchemaReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaReader for SqliteSchemaReader {
    fn server_type(&self) -> DbServerType {
        SERVER
    }

    fn read_schema(&mut self, connection_string: &str) -> Result<Tables, PocoGenError> {
        self.close();

        let path = data_source(connection_string);
        info!(path = ?path, "Opening SQLite database");

        // read-only: a missing file is an error, not a new empty database
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(path, flags).map_err(|e| {
            error!(path = ?path, error = ?e, "Failed to open SQLite database");
            PocoGenError::connection(SERVER, connection_string, e)
        })?;
        let connection = self.connection.insert(connection);

        let table_rows = query_tables(connection)?;
        debug!(count = ?table_rows.len(), "Found tables and views");

        let column_rows = query_columns(connection)?;
        trace!(count = ?column_rows.len(), "Found columns");

        let mut tables = build_tables(table_rows, &column_rows);

        let fk_rows = query_foreign_keys(connection).map(|rows| resolve_foreign_keys(rows, &tables));
        attach_key_rows(&mut tables, fk_rows);

        info!(tables = ?tables.len(), "SQLite schema read");
        Ok(tables)
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            match connection.close() {
                Ok(()) => debug!("Closed SQLite connection"),
                Err((_, e)) => warn!(error = ?e, "Failed to close SQLite connection"),
            }
        }
    }
}

impl Drop for SqliteSchemaReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Clone)]
struct TableRow {
    schema: String,
    name: String,
    table_type: String,
}

#[derive(Debug, Clone)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    data_type: String,
    is_nullable: String,
    primary_key: String,
    autoincrement: String,
}

#[derive(Debug, Clone)]
struct RawForeignKeyRow {
    table_name: String,
    id: i64,
    seq: i64,
    to_table: String,
    from_column: String,
    /// NULL when the key implicitly references the primary key
    to_column: Option<String>,
}

fn query_tables(connection: &Connection) -> Result<Vec<TableRow>, PocoGenError> {
    trace!("Querying tables");
    let mut statement = connection
        .prepare(TABLES_SQL)
        .map_err(|e| catalog_error("enumerating tables", e))?;

    let rows = statement
        .query_map([], |row| {
            Ok(TableRow {
                schema: row.get("table_schema")?,
                name: row.get("table_name")?,
                table_type: row.get("table_type")?,
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| catalog_error("enumerating tables", e))?;

    Ok(rows)
}

fn query_columns(connection: &Connection) -> Result<Vec<ColumnRow>, PocoGenError> {
    trace!("Querying columns");
    let mut statement = connection
        .prepare(COLUMNS_SQL)
        .map_err(|e| catalog_error("enumerating columns", e))?;

    let rows = statement
        .query_map([], |row| {
            Ok(ColumnRow {
                table_name: row.get("table_name")?,
                column_name: row.get("column_name")?,
                data_type: row.get("data_type")?,
                is_nullable: row.get("is_nullable")?,
                primary_key: row.get("primary_key")?,
                autoincrement: row.get("is_autoincrement")?,
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| catalog_error("enumerating columns", e))?;

    Ok(rows)
}

fn query_foreign_keys(connection: &Connection) -> Result<Vec<RawForeignKeyRow>, PocoGenError> {
    trace!("Querying foreign keys");
    let mut statement = connection
        .prepare(FOREIGN_KEYS_SQL)
        .map_err(|e| catalog_error("enumerating foreign keys", e))?;

    let rows = statement
        .query_map([], |row| {
            Ok(RawForeignKeyRow {
                table_name: row.get("table_name")?,
                id: row.get("id")?,
                seq: row.get("seq")?,
                to_table: row.get("fkey_to_table")?,
                from_column: row.get("fkey_from_column")?,
                to_column: row.get("fkey_to_column")?,
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| catalog_error("enumerating foreign keys", e))?;

    Ok(rows)
}

fn catalog_error(step: &str, err: rusqlite::Error) -> PocoGenError {
    error!(step = ?step, error = ?err, "SQLite catalog query failed");
    PocoGenError::catalog(SERVER, step, err)
}

/// Build tables from the table dump, pulling each table's columns out of
/// the column dump by name
fn build_tables(table_rows: Vec<TableRow>, column_rows: &[ColumnRow]) -> Tables {
    let mut tables = Tables::new();

    for row in table_rows {
        let is_table = row.table_type.eq_ignore_ascii_case("table");
        let is_view = row.table_type.eq_ignore_ascii_case("view");
        if !is_table && !is_view {
            continue;
        }

        let mut table = Table::new(row.name, row.schema, is_view);
        table.columns = column_rows
            .iter()
            .filter(|col| col.table_name == table.name)
            .map(column_from_row)
            .collect();
        suppress_composite_key(&table.name, &mut table.columns);

        debug!(
            table = ?table.name,
            columns = ?table.columns.len(),
            is_view = ?table.is_view,
            "Table"
        );
        tables.push(table);
    }

    tables
}

fn column_from_row(row: &ColumnRow) -> Column {
    let mut column = Column::new(
        row.column_name.clone(),
        map_type(&row.data_type),
        is_true(&row.is_nullable),
        is_true(&row.autoincrement),
    );
    column.is_pk = is_true(&row.primary_key);

    trace!(
        table = ?row.table_name,
        column = ?column.name,
        data_type = ?row.data_type,
        parsed_type = ?column.property_type,
        "Parsed column"
    );
    column
}

/// Turn raw foreign key rows into assembler rows.
///
/// SQLite compares identifiers without regard to case, so the referenced
/// table is resolved to its declared name. Implicit references take the
/// referenced table's primary key column.
fn resolve_foreign_keys(rows: Vec<RawForeignKeyRow>, tables: &Tables) -> Vec<ForeignKeyRow> {
    rows.into_iter()
        .map(|row| {
            let referenced = tables.get_table(&row.to_table).ok();
            let referenced_table_name = referenced
                .map(|table| table.name.clone())
                .unwrap_or_else(|| row.to_table.clone());
            let referenced_column_name = row.to_column.unwrap_or_else(|| {
                referenced
                    .and_then(|table| table.pk_column())
                    .map(|col| col.name.clone())
                    .unwrap_or_default()
            });

            ForeignKeyRow {
                constraint_name: format!("FK_{}_{}_{}", row.table_name, row.id, row.seq),
                schema_name: "main".to_string(),
                table_name: row.table_name,
                column_name: row.from_column,
                referenced_schema_name: "main".to_string(),
                referenced_table_name,
                referenced_column_name,
            }
        })
        .collect()
}

/// Flags arrive as "True"/"False" strings
fn is_true(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("true")
}

/// Extract the file from an ADO style `Data Source=...` string, or take the
/// whole string as a path
fn data_source(connection_string: &str) -> &str {
    connection_string
        .split(';')
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("data source")
                .then(|| value.trim())
        })
        .unwrap_or_else(|| connection_string.trim())
}

/// Map a declared SQLite column type to a scalar type
fn map_type(declared_type: &str) -> ScalarType {
    let lower = declared_type.to_lowercase();
    // "varchar(50)" -> "varchar"
    let token = lower.split('(').next().unwrap_or_default().trim();

    match token {
        "bigint" => ScalarType::I64,
        "smallint" => ScalarType::I16,
        "int" | "integer" => ScalarType::I32,
        "uniqueidentifier" => ScalarType::Guid,
        "smalldatetime" | "datetime" | "datetime2" | "date" | "time" => ScalarType::Timestamp,
        "float" => ScalarType::F64,
        "real" => ScalarType::F32,
        "numeric" | "smallmoney" | "decimal" | "money" => ScalarType::Decimal,
        "tinyint" => ScalarType::U8,
        "bit" | "boolean" => ScalarType::Bool,
        "image" | "binary" | "varbinary" | "timestamp" | "blob" => ScalarType::Binary,
        "geography" => ScalarType::Geography,
        "geometry" => ScalarType::Geometry,
        _ => {
            trace!(data_type = ?declared_type, "Unmapped type, using text");
            ScalarType::Text
        }
    }
}
