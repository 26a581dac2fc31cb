use postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, trace, warn};

use super::keys::{assemble_key_graph, attach_keys, ForeignKeyRow};
use super::{resolve_primary_key, SchemaReader};
use crate::prelude::{Column, DbServerType, PocoGenError, ScalarType, Table, Tables};

const SERVER: DbServerType = DbServerType::Postgres;

/// PostgreSQL schema reader
pub struct PostgresSchemaReader {
    client: Option<Client>,
}

impl PostgresSchemaReader {
    pub fn new() -> Self {
        Self { client: None }
    }
}

impl Default for PostgresSchemaReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaReader for PostgresSchemaReader {
    fn server_type(&self) -> DbServerType {
        SERVER
    }

    fn read_schema(&mut self, connection_string: &str) -> Result<Tables, PocoGenError> {
        self.close();

        let client = Client::connect(connection_string, NoTls).map_err(|e| {
            error!(error = ?e, "Failed to connect to PostgreSQL");
            PocoGenError::connection(SERVER, connection_string, e)
        })?;
        let client = self.client.insert(client);
        info!("Connected to PostgreSQL");

        let mut tables = query_tables(client)?;
        debug!(count = ?tables.len(), "Found tables and views");

        for table in tables.iter_mut() {
            debug!(schema = ?table.schema, table = ?table.name, "Introspecting table");

            table.columns = query_columns(client, &table.schema, &table.name)?;
            trace!(table = ?table.name, columns = ?table.columns.len(), "Found columns");

            let primary_key = query_primary_key(client, &table.schema, &table.name)?;
            resolve_primary_key(&table.name, &mut table.columns, &primary_key);
        }

        let mut fk_rows = Vec::new();
        for table in tables.iter() {
            match query_foreign_keys(client, &table.schema, &table.name) {
                Ok(rows) => fk_rows.extend(rows),
                Err(e) => warn!(
                    table = ?table.name,
                    error = %e,
                    "Failed to load foreign keys, continuing without them"
                ),
            }
        }
        attach_keys(&mut tables, assemble_key_graph(&fk_rows));

        info!(tables = ?tables.len(), "PostgreSQL schema read");
        Ok(tables)
    }

    fn close(&mut self) {
        if let Some(client) = self.client.take() {
            match client.close() {
                Ok(()) => debug!("Closed PostgreSQL connection"),
                Err(e) => warn!(error = ?e, "Failed to close PostgreSQL connection"),
            }
        }
    }
}

impl Drop for PostgresSchemaReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Query every table and view outside the system schemas
fn query_tables(client: &mut Client) -> Result<Tables, PocoGenError> {
    trace!("Querying tables");

    let sql = r#"
        SELECT
            table_name::text AS table_name,
            table_schema::text AS table_schema,
            table_type::text AS table_type
        FROM information_schema.tables
        WHERE (table_type = 'BASE TABLE' OR table_type = 'VIEW')
            AND table_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY table_schema, table_name
    "#;

    let rows = client.query(sql, &[]).map_err(|e| {
        error!(error = ?e, "Failed to query tables");
        PocoGenError::catalog(SERVER, "enumerating tables", e)
    })?;

    Ok(rows.iter().map(table_from_row).collect())
}

fn table_from_row(row: &Row) -> Table {
    let table_type: String = row.get("table_type");
    Table::new(
        row.get::<_, String>("table_name"),
        row.get::<_, String>("table_schema"),
        table_type.eq_ignore_ascii_case("view"),
    )
}

/// Query all columns for a table in ordinal order
fn query_columns(
    client: &mut Client,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<Column>, PocoGenError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying columns");

    let sql = r#"
        SELECT
            column_name::text AS column_name,
            is_nullable::text AS is_nullable,
            udt_name::text AS udt_name,
            column_default::text AS column_default
        FROM information_schema.columns
        WHERE table_schema = $1::text
            AND table_name = $2::text
        ORDER BY ordinal_position
    "#;

    let rows = client
        .query(sql, &[&schema_name, &table_name])
        .map_err(|e| {
            error!(
                schema = ?schema_name,
                table = ?table_name,
                error = ?e,
                "Failed to query columns"
            );
            PocoGenError::catalog(SERVER, format!("reading columns of '{}'", table_name), e)
        })?;

    let columns = rows
        .iter()
        .map(|row| {
            column_from_parts(
                row.get("column_name"),
                row.get::<_, String>("is_nullable").as_str(),
                row.get::<_, String>("udt_name").as_str(),
                row.get::<_, Option<String>>("column_default").as_deref(),
            )
        })
        .collect();

    Ok(columns)
}

fn column_from_parts(
    name: String,
    is_nullable: &str,
    udt_name: &str,
    column_default: Option<&str>,
) -> Column {
    let column = Column::new(
        name,
        map_type(udt_name),
        is_nullable == "YES",
        is_auto_increment(column_default),
    );

    trace!(
        column = ?column.name,
        data_type = ?udt_name,
        parsed_type = ?column.property_type,
        is_nullable = ?column.is_nullable,
        is_auto_increment = ?column.is_auto_increment,
        "Parsed column"
    );
    column
}

/// Query the primary key column names of a table
fn query_primary_key(
    client: &mut Client,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<String>, PocoGenError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying primary key");

    let sql = r#"
        SELECT kcu.column_name::text AS column_name
        FROM information_schema.key_column_usage kcu
        JOIN information_schema.table_constraints tc
            ON kcu.constraint_name = tc.constraint_name
            AND kcu.constraint_schema = tc.constraint_schema
        WHERE lower(tc.constraint_type) = 'primary key'
            AND kcu.table_schema = $1::text
            AND kcu.table_name = $2::text
        ORDER BY kcu.ordinal_position
    "#;

    let rows = client
        .query(sql, &[&schema_name, &table_name])
        .map_err(|e| {
            error!(
                schema = ?schema_name,
                table = ?table_name,
                error = ?e,
                "Failed to query primary key"
            );
            PocoGenError::catalog(SERVER, format!("reading primary key of '{}'", table_name), e)
        })?;

    let pk_columns = rows.iter().map(|row| row.get("column_name")).collect();
    trace!(table = ?table_name, primary_key = ?pk_columns, "Primary key found");
    Ok(pk_columns)
}

/// Foreign key column pairs of one table. Each referencing column is
/// paired with the referenced column at the same position of the unique
/// constraint, so a multi-column key yields one row per pair.
const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        tc.constraint_name::text AS constraint_name,
        tc.table_schema::text AS table_schema,
        tc.table_name::text AS table_name,
        kcu.column_name::text AS fkey_from_column,
        rkcu.table_schema::text AS fkey_to_schema,
        rkcu.table_name::text AS fkey_to_table,
        rkcu.column_name::text AS fkey_to_column
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.constraint_schema = kcu.constraint_schema
    JOIN information_schema.referential_constraints AS rc
        ON rc.constraint_name = tc.constraint_name
        AND rc.constraint_schema = tc.constraint_schema
    JOIN information_schema.key_column_usage AS rkcu
        ON rkcu.constraint_name = rc.unique_constraint_name
        AND rkcu.constraint_schema = rc.unique_constraint_schema
        AND rkcu.ordinal_position = kcu.position_in_unique_constraint
    WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1::text
        AND tc.table_name = $2::text
    ORDER BY tc.constraint_name, kcu.ordinal_position
"#;

/// Query the foreign keys a table declares
fn query_foreign_keys(
    client: &mut Client,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<ForeignKeyRow>, PocoGenError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying foreign keys");

    let rows = client
        .query(FOREIGN_KEYS_SQL, &[&schema_name, &table_name])
        .map_err(|e| {
            PocoGenError::catalog(SERVER, format!("reading foreign keys of '{}'", table_name), e)
        })?;

    Ok(rows
        .iter()
        .map(|row| ForeignKeyRow {
            constraint_name: row.get("constraint_name"),
            schema_name: row.get("table_schema"),
            table_name: row.get("table_name"),
            column_name: row.get("fkey_from_column"),
            referenced_schema_name: row.get("fkey_to_schema"),
            referenced_table_name: row.get("fkey_to_table"),
            referenced_column_name: row.get("fkey_to_column"),
        })
        .collect())
}

/// SERIAL/BIGSERIAL columns have nextval('sequence_name') as default
fn is_auto_increment(column_default: Option<&str>) -> bool {
    column_default.is_some_and(|default| default.starts_with("nextval("))
}

/// Map a PostgreSQL `udt_name` to a scalar type
fn map_type(udt_name: &str) -> ScalarType {
    match udt_name.trim() {
        "int8" | "serial8" => ScalarType::I64,
        "bool" => ScalarType::Bool,
        "bytea" => ScalarType::Binary,
        "float8" => ScalarType::F64,
        "int4" | "serial4" => ScalarType::I32,
        "money" | "numeric" => ScalarType::Decimal,
        "float4" => ScalarType::F32,
        "int2" => ScalarType::I16,
        "time" | "timetz" | "timestamp" | "timestamptz" | "date" => ScalarType::Timestamp,
        "uuid" => ScalarType::Guid,
        other => {
            trace!(data_type = ?other, "Unmapped type, using text");
            ScalarType::Text
        }
    }
}
