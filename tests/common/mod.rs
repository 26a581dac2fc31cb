//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A small shop database: a prefixed table, an autoincrement key, a
/// composite key, an implicit reference, a self reference and a view
pub const SHOP_SCHEMA: &str = r#"
    CREATE TABLE tbl_Customers (
        CustomerID INTEGER PRIMARY KEY AUTOINCREMENT,
        Name VARCHAR(100) NOT NULL,
        Email TEXT
    );

    CREATE TABLE Orders (
        OrderID INTEGER PRIMARY KEY,
        CustomerID INTEGER NOT NULL REFERENCES tbl_Customers(CustomerID),
        Total DECIMAL(10, 2),
        PlacedOn DATETIME
    );

    CREATE TABLE OrderLines (
        OrderID INTEGER NOT NULL REFERENCES Orders,
        ProductCode TEXT NOT NULL,
        Quantity INT,
        PRIMARY KEY (OrderID, ProductCode)
    );

    CREATE TABLE Employees (
        EmployeeID INTEGER PRIMARY KEY,
        ManagerID INTEGER REFERENCES Employees(EmployeeID),
        Photo BLOB
    );

    CREATE VIEW BigOrders AS
        SELECT OrderID, Total FROM Orders WHERE Total > 100;
"#;

/// Create the shop database inside a fresh temp directory
pub fn shop_database() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path, SHOP_SCHEMA);
    (dir, path)
}

pub fn create_database(path: &Path, sql: &str) {
    let connection = rusqlite::Connection::open(path).unwrap();
    connection.execute_batch(sql).unwrap();
    connection.close().unwrap();
}
