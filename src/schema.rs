//! Schema data structures
//!
//! These types represent the vendor-neutral relational model and form the
//! contract between the schema readers (produce) and code generation
//! (consumes).

use std::fmt;
use std::str::FromStr;

use crate::error::PocoGenError;
use crate::naming;

/// Supported database servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbServerType {
    MsSql,
    Sqlite,
    MySql,
    Postgres,
}

impl DbServerType {
    pub const ALL: [DbServerType; 4] = [
        DbServerType::MsSql,
        DbServerType::Sqlite,
        DbServerType::MySql,
        DbServerType::Postgres,
    ];

    /// Default namespace and output directory for generated models
    pub fn default_models_namespace(&self) -> String {
        format!("{}.Models", self)
    }
}

impl fmt::Display for DbServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbServerType::MsSql => "MsSql",
            DbServerType::Sqlite => "Sqlite",
            DbServerType::MySql => "MySql",
            DbServerType::Postgres => "Postgres",
        };
        f.write_str(name)
    }
}

impl FromStr for DbServerType {
    type Err = PocoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(DbServerType::MsSql),
            "sqlite" => Ok(DbServerType::Sqlite),
            "mysql" => Ok(DbServerType::MySql),
            "postgres" | "postgresql" => Ok(DbServerType::Postgres),
            other => Err(PocoGenError::Config(format!(
                "Invalid database type '{}', expected one of mssql, sqlite, mysql, postgres",
                other
            ))),
        }
    }
}

/// Normalized scalar type of a column, independent of the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Bool,
    Text,
    Binary,
    Timestamp,
    Guid,
    /// SQL Server `geography`
    Geography,
    /// SQL Server `geometry`
    Geometry,
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Identifier-safe form of `name`
    pub property_name: String,
    pub property_type: ScalarType,
    pub is_nullable: bool,
    /// Set by primary key resolution, never by column enumeration
    pub is_pk: bool,
    pub is_auto_increment: bool,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        property_type: ScalarType,
        is_nullable: bool,
        is_auto_increment: bool,
    ) -> Self {
        let name = name.into();
        Self {
            property_name: naming::clean_up(&name),
            name,
            property_type,
            is_nullable,
            is_pk: false,
            is_auto_increment,
        }
    }
}

/// One direction of a foreign key relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Constraint name, shared by both directions of the edge
    pub name: String,
    pub referencing_table_name: String,
    pub referencing_table_column_name: String,
    pub referenced_table_name: String,
    pub referenced_table_column_name: String,
}

/// Database table or view
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub schema: String,
    pub is_view: bool,
    pub clean_name: String,
    pub class_name: String,
    pub columns: Vec<Column>,
    /// Keys this table declares
    pub outer_keys: Vec<Key>,
    /// Keys other tables declare against this table
    pub inner_keys: Vec<Key>,
}

impl Table {
    /// Creates a table with its derived names and no columns or keys yet
    pub fn new(name: impl Into<String>, schema: impl Into<String>, is_view: bool) -> Self {
        let name = name.into();
        let clean_name = naming::clean_name(&name);
        let class_name = naming::clean_name_to_class_name(&clean_name);
        Self {
            name,
            schema: schema.into(),
            is_view,
            clean_name,
            class_name,
            columns: Vec::new(),
            outer_keys: Vec::new(),
            inner_keys: Vec::new(),
        }
    }

    /// The primary key column, if the table has a single-column key
    pub fn pk_column(&self) -> Option<&Column> {
        self.columns.iter().find(|col| col.is_pk)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }
}

/// All tables read from one database, in catalog discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables(Vec<Table>);

impl Tables {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, table: Table) {
        self.0.push(table);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Table> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Table> {
        self.0.iter_mut()
    }

    pub fn as_slice(&self) -> &[Table] {
        &self.0
    }

    pub fn retain(&mut self, f: impl FnMut(&Table) -> bool) {
        self.0.retain(f);
    }

    /// Looks up a table by name, ignoring case.
    ///
    /// Zero matches and several matches are both errors: the lookup never
    /// silently picks the first candidate.
    pub fn get_table(&self, name: &str) -> Result<&Table, PocoGenError> {
        let mut matches = self
            .0
            .iter()
            .filter(|table| table.name.eq_ignore_ascii_case(name));

        match (matches.next(), matches.next()) {
            (Some(table), None) => Ok(table),
            (None, _) => Err(PocoGenError::TableLookup {
                name: name.to_string(),
                matches: 0,
            }),
            (Some(_), Some(_)) => Err(PocoGenError::TableLookup {
                name: name.to_string(),
                matches: 2 + matches.count(),
            }),
        }
    }

    /// Pairs of tables whose derived class names collide
    pub fn class_name_collisions(&self) -> Vec<(&Table, &Table)> {
        let mut collisions = Vec::new();
        for (i, first) in self.0.iter().enumerate() {
            for second in &self.0[i + 1..] {
                if first.class_name == second.class_name {
                    collisions.push((first, second));
                }
            }
        }
        collisions
    }
}

impl From<Vec<Table>> for Tables {
    fn from(tables: Vec<Table>) -> Self {
        Self(tables)
    }
}

impl FromIterator<Table> for Tables {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Tables {
    type Item = Table;
    type IntoIter = std::vec::IntoIter<Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tables {
    type Item = &'a Table;
    type IntoIter = std::slice::Iter<'a, Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
