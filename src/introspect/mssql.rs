use tiberius::{Client, Config, Row, ToSql};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, error, info, trace, warn};

use super::keys::ForeignKeyRow;
use super::{resolve_primary_key, SchemaReader};
use crate::prelude::{Column, DbServerType, Key, PocoGenError, ScalarType, Table, Tables};

const SERVER: DbServerType = DbServerType::MsSql;

const TABLES_SQL: &str = r#"
    SELECT
        CAST(TABLE_NAME AS nvarchar(256)) AS table_name,
        CAST(TABLE_SCHEMA AS nvarchar(256)) AS table_schema,
        CAST(TABLE_TYPE AS nvarchar(32)) AS table_type
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE' OR TABLE_TYPE = 'VIEW'
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS nvarchar(256)) AS column_name,
        CAST(DATA_TYPE AS nvarchar(128)) AS data_type,
        CASE WHEN IS_NULLABLE = 'YES' THEN N'True' ELSE N'False' END AS is_nullable,
        CASE
            WHEN COLUMNPROPERTY(
                OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME)),
                COLUMN_NAME,
                'IsIdentity'
            ) = 1
            THEN N'True' ELSE N'False'
        END AS is_identity
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

/// Key columns of the clustered index
const PRIMARY_KEY_SQL: &str = r#"
    SELECT CAST(c.name AS nvarchar(256)) AS column_name
    FROM sys.indexes i
    JOIN sys.index_columns ic
        ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns c
        ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    JOIN sys.objects o ON o.object_id = i.object_id
    JOIN sys.schemas s ON s.schema_id = o.schema_id
    WHERE i.type = 1
        AND ic.is_included_column = 0
        AND s.name = @P1
        AND o.name = @P2
    ORDER BY ic.key_ordinal
"#;

/// Foreign keys declared by the table
const OUTER_KEYS_SQL: &str = r#"
    SELECT
        CAST(OBJECT_NAME(pt.constraint_object_id) AS nvarchar(256)) AS fk,
        CAST(OBJECT_NAME(pt.parent_object_id) AS nvarchar(256)) AS referencing_tbl,
        CAST(pc.name AS nvarchar(256)) AS referencing_col,
        CAST(OBJECT_NAME(pt.referenced_object_id) AS nvarchar(256)) AS referenced_tbl,
        CAST(rc.name AS nvarchar(256)) AS referenced_col,
        CAST(OBJECT_SCHEMA_NAME(pt.parent_object_id) AS nvarchar(256)) AS referencing_schema,
        CAST(OBJECT_SCHEMA_NAME(pt.referenced_object_id) AS nvarchar(256)) AS referenced_schema
    FROM sys.foreign_key_columns pt
    JOIN sys.columns pc
        ON pc.object_id = pt.parent_object_id AND pc.column_id = pt.parent_column_id
    JOIN sys.columns rc
        ON rc.object_id = pt.referenced_object_id AND rc.column_id = pt.referenced_column_id
    WHERE pt.parent_object_id = OBJECT_ID(QUOTENAME(@P1) + '.' + QUOTENAME(@P2))
    ORDER BY pt.constraint_object_id, pt.constraint_column_id
"#;

/// Foreign keys other tables declare against the table
const INNER_KEYS_SQL: &str = r#"
    SELECT
        CAST(OBJECT_NAME(pt.constraint_object_id) AS nvarchar(256)) AS fk,
        CAST(OBJECT_NAME(pt.parent_object_id) AS nvarchar(256)) AS referencing_tbl,
        CAST(pc.name AS nvarchar(256)) AS referencing_col,
        CAST(OBJECT_NAME(pt.referenced_object_id) AS nvarchar(256)) AS referenced_tbl,
        CAST(rc.name AS nvarchar(256)) AS referenced_col,
        CAST(OBJECT_SCHEMA_NAME(pt.parent_object_id) AS nvarchar(256)) AS referencing_schema,
        CAST(OBJECT_SCHEMA_NAME(pt.referenced_object_id) AS nvarchar(256)) AS referenced_schema
    FROM sys.foreign_key_columns pt
    JOIN sys.columns pc
        ON pc.object_id = pt.parent_object_id AND pc.column_id = pt.parent_column_id
    JOIN sys.columns rc
        ON rc.object_id = pt.referenced_object_id AND rc.column_id = pt.referenced_column_id
    WHERE pt.referenced_object_id = OBJECT_ID(QUOTENAME(@P1) + '.' + QUOTENAME(@P2))
    ORDER BY pt.constraint_object_id, pt.constraint_column_id
"#;

/// A tiberius client driven by its own single threaded runtime
struct MsSqlConnection {
    runtime: Runtime,
    client: Client<Compat<TcpStream>>,
}

impl MsSqlConnection {
    /// Connect using an ADO.NET style connection string
    fn open(connection_string: &str) -> Result<Self, PocoGenError> {
        let fail = |e: &dyn std::fmt::Display| {
            error!(error = %e, "Failed to connect to SQL Server");
            PocoGenError::connection(SERVER, connection_string, e)
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| fail(&e))?;
        let config = Config::from_ado_string(connection_string).map_err(|e| fail(&e))?;

        let client = runtime
            .block_on(async {
                let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
                    tiberius::error::Error::Io {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                })?;
                tcp.set_nodelay(true).ok();

                Client::connect(config, tcp.compat_write()).await
            })
            .map_err(|e| fail(&e))?;

        Ok(Self { runtime, client })
    }

    /// Run a parameterized query and collect its first result set
    fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, tiberius::error::Error> {
        let client = &mut self.client;
        self.runtime.block_on(async move {
            let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
            client.query(sql, &params).await?.into_first_result().await
        })
    }

    fn close(self) -> Result<(), tiberius::error::Error> {
        let Self { runtime, client } = self;
        runtime.block_on(client.close())
    }
}

/// SQL Server schema reader
pub struct MsSqlSchemaReader {
    connection: Option<MsSqlConnection>,
}

impl MsSqlSchemaReader {
    pub fn new() -> Self {
        Self { connection: None }
    }
}

impl Default for MsSqlSchemaReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaReader for MsSqlSchemaReader {
    fn server_type(&self) -> DbServerType {
        SERVER
    }

    fn read_schema(&mut self, connection_string: &str) -> Result<Tables, PocoGenError> {
        self.close();

        let connection = self.connection.insert(MsSqlConnection::open(connection_string)?);
        info!("Connected to SQL Server");

        let mut tables = query_tables(connection)?;
        debug!(count = ?tables.len(), "Found tables and views");

        for table in tables.iter_mut() {
            debug!(schema = ?table.schema, table = ?table.name, "Introspecting table");

            table.columns = query_columns(connection, &table.schema, &table.name)?;
            let primary_key = query_primary_key(connection, &table.schema, &table.name)?;
            resolve_primary_key(&table.name, &mut table.columns, &primary_key);

            match query_keys(connection, &table.schema, &table.name) {
                Ok((outer_keys, inner_keys)) => {
                    trace!(
                        table = ?table.name,
                        outer = ?outer_keys.len(),
                        inner = ?inner_keys.len(),
                        "Found keys"
                    );
                    table.outer_keys = outer_keys;
                    table.inner_keys = inner_keys;
                }
                Err(e) => {
                    warn!(
                        table = ?table.name,
                        error = %e,
                        "Failed to load keys, continuing without them"
                    );
                    table.outer_keys.clear();
                    table.inner_keys.clear();
                }
            }
        }

        info!(tables = ?tables.len(), "SQL Server schema read");
        Ok(tables)
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            match connection.close() {
                Ok(()) => debug!("Closed SQL Server connection"),
                Err(e) => warn!(error = ?e, "Failed to close SQL Server connection"),
            }
        }
    }
}

impl Drop for MsSqlSchemaReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn query_tables(connection: &mut MsSqlConnection) -> Result<Tables, PocoGenError> {
    trace!("Querying tables");

    let rows = connection.query(TABLES_SQL, &[]).map_err(|e| {
        error!(error = ?e, "Failed to query tables");
        PocoGenError::catalog(SERVER, "enumerating tables", e)
    })?;

    Ok(rows
        .iter()
        .map(|row| table_from_parts(text(row, 0), text(row, 1), text(row, 2)))
        .collect())
}

fn table_from_parts(name: &str, schema: &str, table_type: &str) -> Table {
    Table::new(name, schema, table_type.eq_ignore_ascii_case("VIEW"))
}

fn query_columns(
    connection: &mut MsSqlConnection,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<Column>, PocoGenError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying columns");

    let rows = connection
        .query(COLUMNS_SQL, &[schema_name, table_name])
        .map_err(|e| {
            error!(table = ?table_name, error = ?e, "Failed to query columns");
            PocoGenError::catalog(SERVER, format!("reading columns of '{}'", table_name), e)
        })?;

    Ok(rows
        .iter()
        .map(|row| {
            let column = Column::new(
                text(row, 0),
                map_type(text(row, 1)),
                text(row, 2) == "True",
                text(row, 3) == "True",
            );
            trace!(
                column = ?column.name,
                parsed_type = ?column.property_type,
                "Parsed column"
            );
            column
        })
        .collect())
}

fn query_primary_key(
    connection: &mut MsSqlConnection,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<String>, PocoGenError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying primary key");

    let rows = connection
        .query(PRIMARY_KEY_SQL, &[schema_name, table_name])
        .map_err(|e| {
            error!(table = ?table_name, error = ?e, "Failed to query primary key");
            PocoGenError::catalog(SERVER, format!("reading primary key of '{}'", table_name), e)
        })?;

    Ok(rows.iter().map(|row| text(row, 0).to_string()).collect())
}

/// Outbound and inbound keys of one table, from two directional queries
fn query_keys(
    connection: &mut MsSqlConnection,
    schema_name: &str,
    table_name: &str,
) -> Result<(Vec<Key>, Vec<Key>), PocoGenError> {
    let mut load = |sql: &str, direction: &str| {
        connection
            .query(sql, &[schema_name, table_name])
            .map(|rows| rows.iter().map(|row| key_from_row(row).to_key()).collect::<Vec<_>>())
            .map_err(|e| {
                PocoGenError::catalog(
                    SERVER,
                    format!("reading {} keys of '{}'", direction, table_name),
                    e,
                )
            })
    };

    let outer_keys = load(OUTER_KEYS_SQL, "outer")?;
    let inner_keys = load(INNER_KEYS_SQL, "inner")?;
    Ok((outer_keys, inner_keys))
}

fn key_from_row(row: &Row) -> ForeignKeyRow {
    ForeignKeyRow {
        constraint_name: text(row, 0).to_string(),
        schema_name: text(row, 5).to_string(),
        table_name: text(row, 1).to_string(),
        column_name: text(row, 2).to_string(),
        referenced_schema_name: text(row, 6).to_string(),
        referenced_table_name: text(row, 3).to_string(),
        referenced_column_name: text(row, 4).to_string(),
    }
}

/// Every column is selected as nvarchar, NULL reads as empty
fn text(row: &Row, idx: usize) -> &str {
    row.try_get::<&str, _>(idx).ok().flatten().unwrap_or_default()
}

/// Map a SQL Server `DATA_TYPE` to a scalar type
fn map_type(data_type: &str) -> ScalarType {
    match data_type.trim().to_lowercase().as_str() {
        "bigint" => ScalarType::I64,
        "smallint" => ScalarType::I16,
        "int" => ScalarType::I32,
        "uniqueidentifier" => ScalarType::Guid,
        "smalldatetime" | "datetime" | "datetime2" | "date" | "time" | "datetimeoffset" => {
            ScalarType::Timestamp
        }
        "float" => ScalarType::F64,
        "real" => ScalarType::F32,
        "numeric" | "smallmoney" | "decimal" | "money" => ScalarType::Decimal,
        "tinyint" => ScalarType::U8,
        "bit" => ScalarType::Bool,
        "image" | "binary" | "varbinary" | "timestamp" | "rowversion" => ScalarType::Binary,
        "geography" => ScalarType::Geography,
        "geometry" => ScalarType::Geometry,
        other => {
            trace!(data_type = ?other, "Unmapped type, using text");
            ScalarType::Text
        }
    }
}
