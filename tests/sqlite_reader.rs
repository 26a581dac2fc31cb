//! SQLite reader integration tests against a real database file.

#![cfg(feature = "sqlite")]

mod common;

use pocogen::prelude::*;
use pocogen::SqliteSchemaReader;

fn read_shop() -> Tables {
    let (_dir, path) = common::shop_database();
    read_schema(DbServerType::Sqlite, path.to_str().unwrap()).unwrap()
}

#[test]
fn test_reads_tables_and_views() {
    let tables = read_shop();

    let mut names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["BigOrders", "Employees", "OrderLines", "Orders", "tbl_Customers"]
    );

    let view = tables.get_table("bigorders").unwrap();
    assert!(view.is_view);
    assert_eq!(view.columns.len(), 2);
    assert!(view.pk_column().is_none());
    assert!(!tables.get_table("Orders").unwrap().is_view);
}

#[test]
fn test_derived_names() {
    let tables = read_shop();

    let customers = tables.get_table("tbl_Customers").unwrap();
    assert_eq!(customers.clean_name, "Customers");
    assert_eq!(customers.class_name, "Customer");
    assert_eq!(customers.schema, "main");

    assert_eq!(tables.get_table("OrderLines").unwrap().class_name, "OrderLine");
}

#[test]
fn test_columns_in_declaration_order() {
    let tables = read_shop();
    let orders = tables.get_table("Orders").unwrap();

    let names: Vec<_> = orders.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["OrderID", "CustomerID", "Total", "PlacedOn"]);

    let types: Vec<_> = orders.columns.iter().map(|c| c.property_type).collect();
    assert_eq!(
        types,
        vec![
            ScalarType::I32,
            ScalarType::I32,
            ScalarType::Decimal,
            ScalarType::Timestamp
        ]
    );
}

#[test]
fn test_nullability_and_keys() {
    let tables = read_shop();
    let customers = tables.get_table("tbl_Customers").unwrap();

    let id = customers.column("CustomerID").unwrap();
    assert!(id.is_pk);
    assert!(id.is_auto_increment);
    assert!(!id.is_nullable);

    let name = customers.column("Name").unwrap();
    assert!(!name.is_nullable);
    assert!(!name.is_pk);
    assert_eq!(name.property_type, ScalarType::Text);

    assert!(customers.column("Email").unwrap().is_nullable);

    let order_id = tables.get_table("Orders").unwrap().column("OrderID").unwrap();
    assert!(order_id.is_pk);
    assert!(!order_id.is_auto_increment);
}

#[test]
fn test_composite_key_is_not_modeled() {
    let tables = read_shop();
    let lines = tables.get_table("OrderLines").unwrap();

    assert!(lines.columns.iter().all(|c| !c.is_pk));
    assert!(lines.pk_column().is_none());
}

#[test]
fn test_foreign_keys_on_both_sides() {
    let tables = read_shop();

    let orders = tables.get_table("Orders").unwrap();
    assert_eq!(orders.outer_keys.len(), 1);
    let to_customers = &orders.outer_keys[0];
    assert_eq!(to_customers.referencing_table_name, "Orders");
    assert_eq!(to_customers.referencing_table_column_name, "CustomerID");
    assert_eq!(to_customers.referenced_table_name, "tbl_Customers");
    assert_eq!(to_customers.referenced_table_column_name, "CustomerID");

    let customers = tables.get_table("tbl_Customers").unwrap();
    assert_eq!(customers.inner_keys.len(), 1);
    assert_eq!(customers.inner_keys[0].name, to_customers.name);
    assert!(customers.outer_keys.is_empty());

    assert_eq!(orders.inner_keys.len(), 1);
    assert_eq!(orders.inner_keys[0].referencing_table_name, "OrderLines");
}

#[test]
fn test_implicit_reference_uses_primary_key() {
    let tables = read_shop();
    let lines = tables.get_table("OrderLines").unwrap();

    assert_eq!(lines.outer_keys.len(), 1);
    assert_eq!(lines.outer_keys[0].referenced_table_name, "Orders");
    assert_eq!(lines.outer_keys[0].referenced_table_column_name, "OrderID");
}

#[test]
fn test_self_referencing_key() {
    let tables = read_shop();
    let employees = tables.get_table("Employees").unwrap();

    assert_eq!(employees.outer_keys.len(), 1);
    assert_eq!(employees.inner_keys.len(), 1);
    assert_eq!(employees.outer_keys[0].name, employees.inner_keys[0].name);
    assert_eq!(
        employees.column("Photo").unwrap().property_type,
        ScalarType::Binary
    );
}

#[test]
fn test_data_source_connection_string() {
    let (_dir, path) = common::shop_database();
    let connection_string = format!("Data Source={};Version=3;", path.display());

    let tables = read_schema(DbServerType::Sqlite, &connection_string).unwrap();
    assert_eq!(tables.len(), 5);
}

#[test]
fn test_missing_file_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("shop.db");

    let err = read_schema(DbServerType::Sqlite, path.to_str().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        PocoGenError::Connection {
            server: DbServerType::Sqlite,
            ..
        }
    ));
    assert!(!path.exists());
}

#[test]
fn test_reader_can_be_reused() {
    let (_dir, path) = common::shop_database();
    let mut reader = SqliteSchemaReader::new();
    assert_eq!(reader.server_type(), DbServerType::Sqlite);

    let first = reader.read_schema(path.to_str().unwrap()).unwrap();
    let second = reader.read_schema(path.to_str().unwrap()).unwrap();
    reader.close();
    reader.close();

    assert_eq!(first, second);
}

#[test]
fn test_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    common::create_database(&path, "PRAGMA user_version = 1;");

    let tables = read_schema(DbServerType::Sqlite, path.to_str().unwrap()).unwrap();
    assert!(tables.is_empty());
}

fn read_database(sql: &str) -> Tables {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.db");
    common::create_database(&path, sql);
    read_schema(DbServerType::Sqlite, path.to_str().unwrap()).unwrap()
}

#[test]
fn test_reference_in_different_case() {
    let tables = read_database(
        r#"
        CREATE TABLE Customers (CustomerID INTEGER PRIMARY KEY);
        CREATE TABLE Orders (
            OrderID INTEGER PRIMARY KEY,
            CustomerID INTEGER REFERENCES customers(CustomerID)
        );
        "#,
    );

    let orders = tables.get_table("Orders").unwrap();
    assert_eq!(orders.outer_keys.len(), 1);
    assert_eq!(orders.outer_keys[0].referenced_table_name, "Customers");

    let customers = tables.get_table("Customers").unwrap();
    assert_eq!(customers.inner_keys.len(), 1);
    assert_eq!(customers.inner_keys[0].name, orders.outer_keys[0].name);
}

#[test]
fn test_table_names_resembling_internal_tables() {
    let tables = read_database(
        r#"
        CREATE TABLE sqlite3data (ID INTEGER PRIMARY KEY, Payload BLOB);
        CREATE TABLE Logs (ID INTEGER PRIMARY KEY AUTOINCREMENT, Line TEXT);
        "#,
    );

    let mut names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    names.sort();
    // AUTOINCREMENT creates sqlite_sequence, which stays hidden
    assert_eq!(names, vec!["Logs", "sqlite3data"]);
    assert_eq!(tables.get_table("sqlite3data").unwrap().columns.len(), 2);
}

#[test]
fn test_only_rowid_keys_are_implicitly_not_null() {
    let tables = read_database(
        r#"
        CREATE TABLE Tags (Code TEXT PRIMARY KEY, Label TEXT NOT NULL);
        CREATE TABLE Counters (ID INTEGER PRIMARY KEY, Value INT);
        CREATE TABLE TagLinks (
            TagCode TEXT,
            Target INTEGER,
            PRIMARY KEY (TagCode, Target)
        );
        "#,
    );

    let tags = tables.get_table("Tags").unwrap();
    let code = tags.column("Code").unwrap();
    assert!(code.is_pk);
    assert!(code.is_nullable);
    assert!(!tags.column("Label").unwrap().is_nullable);

    let id = tables.get_table("Counters").unwrap().column("ID").unwrap();
    assert!(id.is_pk);
    assert!(!id.is_nullable);

    let links = tables.get_table("TagLinks").unwrap();
    assert!(links.columns.iter().all(|c| c.is_nullable && !c.is_pk));
}
