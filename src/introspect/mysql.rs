use mysql_async::prelude::*;
use mysql_async::{Conn, Opts};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, trace, warn};

use super::keys::{attach_key_rows, ForeignKeyRow};
use super::{suppress_composite_key, SchemaReader};
use crate::prelude::{Column, DbServerType, PocoGenError, ScalarType, Table, Tables};

const SERVER: DbServerType = DbServerType::MySql;

/// Tables and views of the connection's current database
const TABLES_SQL: &str = r#"
    SELECT TABLE_NAME, TABLE_SCHEMA, TABLE_TYPE
    FROM information_schema.tables
    WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
    ORDER BY TABLE_NAME
"#;

/// Every column of the current database in one pass
const COLUMNS_SQL: &str = r#"
    SELECT
        TABLE_NAME,
        COLUMN_NAME,
        DATA_TYPE,
        COLUMN_TYPE,
        IS_NULLABLE,
        COLUMN_KEY,
        EXTRA
    FROM information_schema.columns
    WHERE TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        CONSTRAINT_NAME,
        TABLE_SCHEMA,
        TABLE_NAME,
        COLUMN_NAME,
        REFERENCED_TABLE_SCHEMA,
        REFERENCED_TABLE_NAME,
        REFERENCED_COLUMN_NAME
    FROM information_schema.key_column_usage
    WHERE TABLE_SCHEMA = DATABASE()
        AND REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
"#;

type TableRow = (String, String, String);
type ColumnTuple = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);
type ForeignKeyTuple = (String, String, String, String, String, String, String);

#[derive(Debug, Clone)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    data_type: String,
    column_type: String,
    is_nullable: String,
    column_key: String,
    extra: String,
}

impl From<ColumnTuple> for ColumnRow {
    fn from(
        (table_name, column_name, data_type, column_type, is_nullable, column_key, extra): ColumnTuple,
    ) -> Self {
        Self {
            table_name,
            column_name,
            data_type,
            column_type,
            is_nullable,
            column_key: column_key.unwrap_or_default(),
            extra: extra.unwrap_or_default(),
        }
    }
}

/// MySQL schema reader
///
/// The connection string must be a `mysql://` URL naming the database.
pub struct MySqlSchemaReader {
    connection: Option<(Runtime, Conn)>,
}

impl MySqlSchemaReader {
    pub fn new() -> Self {
        Self { connection: None }
    }
}

impl Default for MySqlSchemaReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaReader for MySqlSchemaReader {
    fn server_type(&self) -> DbServerType {
        SERVER
    }

    fn read_schema(&mut self, connection_string: &str) -> Result<Tables, PocoGenError> {
        self.close();

        let (runtime, conn) = self.connection.insert(open(connection_string)?);
        info!("Connected to MySQL");

        let table_rows: Vec<TableRow> = runtime
            .block_on(conn.query(TABLES_SQL))
            .map_err(|e| catalog_error("enumerating tables", e))?;
        debug!(count = ?table_rows.len(), "Found tables and views");

        let column_rows: Vec<ColumnRow> = runtime
            .block_on(conn.query::<ColumnTuple, _>(COLUMNS_SQL))
            .map_err(|e| catalog_error("reading columns", e))?
            .into_iter()
            .map(ColumnRow::from)
            .collect();
        trace!(count = ?column_rows.len(), "Found columns");

        let fk_rows = runtime
            .block_on(conn.query::<ForeignKeyTuple, _>(FOREIGN_KEYS_SQL))
            .map(|rows| rows.into_iter().map(foreign_key_from_tuple).collect::<Vec<_>>())
            .map_err(|e| PocoGenError::catalog(SERVER, "reading foreign keys", e));

        let mut tables = build_tables(&table_rows, &column_rows);
        attach_key_rows(&mut tables, fk_rows);

        info!(tables = ?tables.len(), "MySQL schema read");
        Ok(tables)
    }

    fn close(&mut self) {
        if let Some((runtime, conn)) = self.connection.take() {
            match runtime.block_on(conn.disconnect()) {
                Ok(()) => debug!("Closed MySQL connection"),
                Err(e) => warn!(error = ?e, "Failed to close MySQL connection"),
            }
        }
    }
}

impl Drop for MySqlSchemaReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn open(connection_string: &str) -> Result<(Runtime, Conn), PocoGenError> {
    let fail = |e: &dyn std::fmt::Display| {
        error!(error = %e, "Failed to connect to MySQL");
        PocoGenError::connection(SERVER, connection_string, e)
    };

    let opts = Opts::from_url(connection_string).map_err(|e| fail(&e))?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| fail(&e))?;
    let conn = runtime.block_on(Conn::new(opts)).map_err(|e| fail(&e))?;

    Ok((runtime, conn))
}

fn foreign_key_from_tuple(
    (
        constraint_name,
        schema_name,
        table_name,
        column_name,
        referenced_schema_name,
        referenced_table_name,
        referenced_column_name,
    ): ForeignKeyTuple,
) -> ForeignKeyRow {
    ForeignKeyRow {
        constraint_name,
        schema_name,
        table_name,
        column_name,
        referenced_schema_name,
        referenced_table_name,
        referenced_column_name,
    }
}

fn catalog_error(step: &str, e: mysql_async::Error) -> PocoGenError {
    error!(step = ?step, error = ?e, "Catalog query failed");
    PocoGenError::catalog(SERVER, step, e)
}

/// Group the column dump under each table
fn build_tables(table_rows: &[TableRow], column_rows: &[ColumnRow]) -> Tables {
    table_rows
        .iter()
        .map(|(name, schema, table_type)| {
            let mut table = Table::new(name.as_str(), schema.as_str(), table_type == "VIEW");
            table.columns = column_rows
                .iter()
                .filter(|row| &row.table_name == name)
                .map(column_from_row)
                .collect();
            suppress_composite_key(&table.name, &mut table.columns);
            table
        })
        .collect()
}

fn column_from_row(row: &ColumnRow) -> Column {
    let mut column = Column::new(
        row.column_name.as_str(),
        map_type(&row.data_type, &row.column_type),
        row.is_nullable == "YES",
        row.extra.to_lowercase().contains("auto_increment"),
    );
    column.is_pk = row.column_key == "PRI";
    column
}

/// Map a MySQL `DATA_TYPE` to a scalar type, using `COLUMN_TYPE` for
/// signedness
fn map_type(data_type: &str, column_type: &str) -> ScalarType {
    let unsigned = column_type.to_lowercase().contains("unsigned");

    match data_type.trim().to_lowercase().as_str() {
        "bigint" if unsigned => ScalarType::U64,
        "bigint" => ScalarType::I64,
        "int" | "integer" | "mediumint" if unsigned => ScalarType::U32,
        "int" | "integer" | "mediumint" => ScalarType::I32,
        "smallint" if unsigned => ScalarType::U16,
        "smallint" => ScalarType::I16,
        "tinyint" if unsigned => ScalarType::U8,
        "tinyint" => ScalarType::I8,
        "guid" => ScalarType::Guid,
        "smalldatetime" | "date" | "datetime" | "timestamp" => ScalarType::Timestamp,
        "float" => ScalarType::F32,
        "double" => ScalarType::F64,
        "numeric" | "smallmoney" | "decimal" | "money" => ScalarType::Decimal,
        "bit" | "bool" | "boolean" => ScalarType::Bool,
        "image" | "binary" | "blob" | "mediumblob" | "longblob" | "varbinary" => {
            ScalarType::Binary
        }
        other => {
            trace!(data_type = ?other, "Unmapped type, using text");
            ScalarType::Text
        }
    }
}
