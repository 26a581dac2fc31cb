//! Foreign key graph assembly
//!
//! Turns the flat foreign key rows discovered in a catalog into outbound
//! (outer) and inbound (inner) key lists per table. Every row yields exactly
//! one outer key on the referencing table and one inner key on the
//! referenced table, in discovery order.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::error::PocoGenError;
use crate::schema::{Key, Tables};

/// One foreign key column pair as discovered in a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRow {
    pub constraint_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    pub referenced_schema_name: String,
    pub referenced_table_name: String,
    pub referenced_column_name: String,
}

impl ForeignKeyRow {
    pub fn to_key(&self) -> Key {
        Key {
            name: self.constraint_name.clone(),
            referencing_table_name: self.table_name.clone(),
            referencing_table_column_name: self.column_name.clone(),
            referenced_table_name: self.referenced_table_name.clone(),
            referenced_table_column_name: self.referenced_column_name.clone(),
        }
    }
}

/// Outer and inner keys of one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableKeys {
    pub outer_keys: Vec<Key>,
    pub inner_keys: Vec<Key>,
}

/// A table as (schema, name)
pub type TableId = (String, String);

/// Keys of every table that takes part in at least one relationship
pub type KeyGraph = HashMap<TableId, TableKeys>;

/// Build the key graph from foreign key rows
pub fn assemble_key_graph(rows: &[ForeignKeyRow]) -> KeyGraph {
    let mut graph = KeyGraph::new();

    for row in rows {
        trace!(
            constraint = ?row.constraint_name,
            from = ?row.table_name,
            to = ?row.referenced_table_name,
            "Foreign key"
        );
        let key = row.to_key();

        graph
            .entry((row.schema_name.clone(), row.table_name.clone()))
            .or_default()
            .outer_keys
            .push(key.clone());
        graph
            .entry((
                row.referenced_schema_name.clone(),
                row.referenced_table_name.clone(),
            ))
            .or_default()
            .inner_keys
            .push(key);
    }

    graph
}

/// Replace every table's keys with its entry in the graph.
///
/// Tables absent from the graph end up with empty key lists.
pub fn attach_keys(tables: &mut Tables, mut graph: KeyGraph) {
    for table in tables.iter_mut() {
        let id = (table.schema.clone(), table.name.clone());
        let keys = graph.remove(&id).unwrap_or_default();
        table.outer_keys = keys.outer_keys;
        table.inner_keys = keys.inner_keys;
    }
}

/// Attach the keys of a whole-database foreign key dump.
///
/// Keys are best effort: when the dump failed every table is left with
/// empty key lists and the error is only logged.
pub fn attach_key_rows(tables: &mut Tables, rows: Result<Vec<ForeignKeyRow>, PocoGenError>) {
    let graph = match rows {
        Ok(rows) => assemble_key_graph(&rows),
        Err(e) => {
            warn!(error = %e, "Failed to load foreign keys, continuing without keys");
            KeyGraph::new()
        }
    };
    attach_keys(tables, graph);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DbServerType, Table};

    fn row(name: &str, from: &str, from_col: &str, to: &str, to_col: &str) -> ForeignKeyRow {
        ForeignKeyRow {
            constraint_name: name.to_string(),
            schema_name: "dbo".to_string(),
            table_name: from.to_string(),
            column_name: from_col.to_string(),
            referenced_schema_name: "dbo".to_string(),
            referenced_table_name: to.to_string(),
            referenced_column_name: to_col.to_string(),
        }
    }

    fn id(schema: &str, name: &str) -> TableId {
        (schema.to_string(), name.to_string())
    }

    fn shop_tables() -> Tables {
        ["Customers", "Orders", "OrderLines", "Employees", "Settings"]
            .iter()
            .map(|name| Table::new(*name, "dbo", false))
            .collect()
    }

    #[test]
    fn test_each_constraint_appears_once_per_side() {
        let rows = vec![
            row("FK_Orders_Customers", "Orders", "CustomerID", "Customers", "CustomerID"),
            row("FK_OrderLines_Orders", "OrderLines", "OrderID", "Orders", "OrderID"),
        ];
        let mut tables = shop_tables();
        attach_keys(&mut tables, assemble_key_graph(&rows));

        for fk in &rows {
            let outer: Vec<_> = tables
                .iter()
                .flat_map(|t| t.outer_keys.iter())
                .filter(|k| k.name == fk.constraint_name)
                .collect();
            let inner: Vec<_> = tables
                .iter()
                .flat_map(|t| t.inner_keys.iter())
                .filter(|k| k.name == fk.constraint_name)
                .collect();
            assert_eq!(outer.len(), 1);
            assert_eq!(inner.len(), 1);
        }

        let orders = tables.get_table("Orders").unwrap();
        assert_eq!(orders.outer_keys.len(), 1);
        assert_eq!(orders.outer_keys[0].referenced_table_name, "Customers");
        assert_eq!(orders.inner_keys.len(), 1);
        assert_eq!(orders.inner_keys[0].referencing_table_name, "OrderLines");
        assert_eq!(orders.inner_keys[0].referencing_table_column_name, "OrderID");
    }

    #[test]
    fn test_self_referencing_key() {
        let rows = vec![row(
            "FK_Employees_Manager",
            "Employees",
            "ManagerID",
            "Employees",
            "EmployeeID",
        )];
        let mut tables = shop_tables();
        attach_keys(&mut tables, assemble_key_graph(&rows));

        let employees = tables.get_table("Employees").unwrap();
        assert_eq!(employees.outer_keys.len(), 1);
        assert_eq!(employees.inner_keys.len(), 1);
        assert_eq!(employees.outer_keys[0], employees.inner_keys[0]);
    }

    #[test]
    fn test_tables_without_keys_get_empty_lists() {
        let rows = vec![row("FK_Orders_Customers", "Orders", "CustomerID", "Customers", "CustomerID")];
        let mut tables = shop_tables();
        tables.iter_mut().for_each(|t| {
            t.outer_keys.push(row("stale", "x", "x", "x", "x").to_key());
        });
        attach_keys(&mut tables, assemble_key_graph(&rows));

        let settings = tables.get_table("Settings").unwrap();
        assert!(settings.outer_keys.is_empty());
        assert!(settings.inner_keys.is_empty());
    }

    #[test]
    fn test_inbound_keys_keep_discovery_order() {
        let rows = vec![
            row("FK_B", "Orders", "ShipTo", "Customers", "CustomerID"),
            row("FK_A", "Orders", "BillTo", "Customers", "CustomerID"),
        ];
        let graph = assemble_key_graph(&rows);

        let customers = &graph[&id("dbo", "Customers")];
        let names: Vec<_> = customers.inner_keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["FK_B", "FK_A"]);
        assert!(customers.outer_keys.is_empty());
    }

    #[test]
    fn test_key_to_unknown_table_only_lands_on_known_side() {
        let rows = vec![row("FK_Orders_Archive", "Orders", "ArchiveID", "Archive", "ID")];
        let mut tables = shop_tables();
        attach_keys(&mut tables, assemble_key_graph(&rows));

        let orders = tables.get_table("Orders").unwrap();
        assert_eq!(orders.outer_keys.len(), 1);
        assert!(tables.iter().all(|t| t.inner_keys.is_empty()));
    }

    #[test]
    fn test_same_table_name_in_two_schemas() {
        let mut from_public = row("orders_customer_fk", "orders", "customer_id", "customers", "id");
        from_public.schema_name = "public".to_string();
        from_public.referenced_schema_name = "public".to_string();
        let mut from_audit = row("orders_editor_fk", "orders", "editor_id", "users", "id");
        from_audit.schema_name = "audit".to_string();
        from_audit.referenced_schema_name = "audit".to_string();

        let mut tables = Tables::from(vec![
            Table::new("orders", "public", false),
            Table::new("customers", "public", false),
            Table::new("orders", "audit", false),
            Table::new("users", "audit", false),
        ]);
        attach_keys(&mut tables, assemble_key_graph(&[from_public, from_audit]));

        let outer: Vec<_> = tables
            .iter()
            .filter(|t| t.name == "orders")
            .map(|t| (t.schema.as_str(), t.outer_keys.len()))
            .collect();
        assert_eq!(outer, vec![("public", 1), ("audit", 1)]);

        let audit_orders = tables.iter().find(|t| t.schema == "audit" && t.name == "orders").unwrap();
        assert_eq!(audit_orders.outer_keys[0].name, "orders_editor_fk");
        assert!(tables.iter().all(|t| t.name == "orders" || t.inner_keys.len() == 1));
    }

    #[test]
    fn test_attach_key_rows_from_dump() {
        let rows = vec![row("FK_Orders_Customers", "Orders", "CustomerID", "Customers", "CustomerID")];
        let mut tables = shop_tables();
        attach_key_rows(&mut tables, Ok(rows));

        assert_eq!(tables.get_table("Orders").unwrap().outer_keys.len(), 1);
        assert_eq!(tables.get_table("Customers").unwrap().inner_keys.len(), 1);
    }

    #[test]
    fn test_failed_key_dump_leaves_tables_without_keys() {
        let mut tables = shop_tables();
        tables.iter_mut().for_each(|t| {
            t.inner_keys.push(row("stale", "x", "x", "x", "x").to_key());
        });
        let failed = Err(PocoGenError::catalog(
            DbServerType::Sqlite,
            "enumerating foreign keys",
            "no such table: main.Archive",
        ));
        attach_key_rows(&mut tables, failed);

        assert_eq!(tables.len(), 5);
        assert!(tables
            .iter()
            .all(|t| t.outer_keys.is_empty() && t.inner_keys.is_empty()));
    }
}
