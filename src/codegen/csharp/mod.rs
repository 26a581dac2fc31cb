//! C# model generator
//!
//! Generates one POCO class per table, annotated for lite ORMs such as
//! Dapper.SimpleCRUD.

use std::collections::HashSet;
use std::fs;

use minijinja::Environment;
use tracing::{debug, error, info};

use crate::codegen::{CodeGenConfig, CodeGenerator};
use crate::naming::pluralize;
use crate::prelude::{Column, PocoGenError, ScalarType, Table, Tables};

/// C# code generator
pub struct CSharpGenerator {
    env: Environment<'static>,
}

impl CSharpGenerator {
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_template("model", include_str!("templates/model.cs.jinja"))
            .expect("Failed to load C# model template");

        Self { env }
    }
}

impl Default for CSharpGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for CSharpGenerator {
    fn generate(&self, tables: &Tables, config: &CodeGenConfig) -> Result<(), PocoGenError> {
        info!(
            output = ?config.output_path,
            namespace = ?config.namespace,
            relationships = ?config.include_relationships,
            "Generating C# models"
        );

        check_class_names(tables)?;

        let output_dir = &config.output_path;
        fs::create_dir_all(output_dir)?;
        debug!(path = ?output_dir, "Created output directory");

        for table in tables {
            let code = self.render_table(table, tables, config)?;
            let file_path = output_dir.join(format!("{}.cs", table.class_name));
            fs::write(&file_path, code)?;
            info!(table = ?table.name, path = ?file_path, "Generated model file");
        }

        info!(tables = tables.len(), "C# code generation complete");
        Ok(())
    }
}

impl CSharpGenerator {
    /// Render the model class of a single table
    fn render_table(
        &self,
        table: &Table,
        tables: &Tables,
        config: &CodeGenConfig,
    ) -> Result<String, PocoGenError> {
        let template = self
            .env
            .get_template("model")
            .map_err(|e| PocoGenError::CodeGen {
                table: table.name.clone(),
                message: format!("Template error: {}", e),
            })?;

        let properties = build_properties(table, tables, config.include_relationships);

        let ctx = minijinja::context! {
            namespace => &config.namespace,
            table_name => &table.name,
            schema => &table.schema,
            class_name => &table.class_name,
            has_collections => properties.iter().any(|p| p.is_collection),
            properties => properties.iter().map(|p| {
                minijinja::context! {
                    name => &p.name,
                    type_name => &p.type_name,
                    attributes => &p.attributes,
                    is_navigation => p.is_navigation,
                }
            }).collect::<Vec<_>>(),
        };

        template.render(ctx).map_err(|e| PocoGenError::CodeGen {
            table: table.name.clone(),
            message: format!("Render error: {}", e),
        })
    }
}

/// One member of a generated class
#[derive(Debug, Clone)]
struct Property {
    name: String,
    type_name: String,
    attributes: Vec<String>,
    is_navigation: bool,
    is_collection: bool,
}

/// Member names already taken within one class
struct MemberNames<'a> {
    class_name: &'a str,
    used: HashSet<String>,
}

impl<'a> MemberNames<'a> {
    fn new(class_name: &'a str) -> Self {
        Self {
            class_name,
            used: HashSet::new(),
        }
    }

    /// Reserve a unique member name derived from `base`.
    ///
    /// C# forbids a member named like its enclosing class.
    fn claim(&mut self, base: &str) -> String {
        let base = if base == self.class_name {
            format!("{}_", base)
        } else {
            base.to_string()
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while !self.used.insert(name.clone()) {
            name = format!("{}{}", base, suffix);
            suffix += 1;
        }
        name
    }
}

fn build_properties(table: &Table, tables: &Tables, include_relationships: bool) -> Vec<Property> {
    let mut names = MemberNames::new(&table.class_name);

    let mut properties: Vec<Property> = table
        .columns
        .iter()
        .map(|col| column_property(col, &mut names))
        .collect();

    if !include_relationships {
        return properties;
    }

    for key in &table.outer_keys {
        match tables.get_table(&key.referenced_table_name) {
            Ok(referenced) => properties.push(Property {
                name: names.claim(&referenced.class_name),
                type_name: referenced.class_name.clone(),
                attributes: Vec::new(),
                is_navigation: true,
                is_collection: false,
            }),
            Err(e) => debug!(
                table = ?table.name,
                key = ?key.name,
                error = %e,
                "Skipping navigation property"
            ),
        }
    }

    for key in &table.inner_keys {
        match tables.get_table(&key.referencing_table_name) {
            Ok(referencing) => properties.push(Property {
                name: names.claim(&pluralize(&referencing.class_name)),
                type_name: format!("IEnumerable<{}>", referencing.class_name),
                attributes: Vec::new(),
                is_navigation: true,
                is_collection: true,
            }),
            Err(e) => debug!(
                table = ?table.name,
                key = ?key.name,
                error = %e,
                "Skipping collection property"
            ),
        }
    }

    properties
}

fn column_property(col: &Column, names: &mut MemberNames<'_>) -> Property {
    let mut attributes = Vec::new();
    if col.is_pk {
        attributes.push("[Key]".to_string());
    } else if col.is_auto_increment {
        attributes.push("[Editable(false)]".to_string());
    }

    let name = names.claim(&col.property_name);
    if name != col.name {
        attributes.push(format!("[Column(\"{}\")]", col.name.replace('"', "\\\"")));
    }

    Property {
        name,
        type_name: csharp_type(col.property_type, col.is_nullable),
        attributes,
        is_navigation: false,
        is_collection: false,
    }
}

/// Convert a scalar type to a C# type name
fn csharp_type(scalar: ScalarType, is_nullable: bool) -> String {
    let (base_type, is_value_type) = match scalar {
        ScalarType::I8 => ("sbyte", true),
        ScalarType::U8 => ("byte", true),
        ScalarType::I16 => ("short", true),
        ScalarType::U16 => ("ushort", true),
        ScalarType::I32 => ("int", true),
        ScalarType::U32 => ("uint", true),
        ScalarType::I64 => ("long", true),
        ScalarType::U64 => ("ulong", true),
        ScalarType::F32 => ("float", true),
        ScalarType::F64 => ("double", true),
        ScalarType::Decimal => ("decimal", true),
        ScalarType::Bool => ("bool", true),
        ScalarType::Timestamp => ("DateTime", true),
        ScalarType::Guid => ("Guid", true),
        ScalarType::Text => ("string", false),
        ScalarType::Binary => ("byte[]", false),
        ScalarType::Geography => ("Microsoft.SqlServer.Types.SqlGeography", false),
        ScalarType::Geometry => ("Microsoft.SqlServer.Types.SqlGeometry", false),
    };

    if is_nullable && is_value_type {
        format!("{}?", base_type)
    } else {
        base_type.to_string()
    }
}

/// Every table must map to its own class and file
fn check_class_names(tables: &Tables) -> Result<(), PocoGenError> {
    if let Some((first, second)) = tables.class_name_collisions().into_iter().next() {
        error!(
            class_name = ?first.class_name,
            first = ?first.name,
            second = ?second.name,
            "Duplicate class name"
        );
        return Err(PocoGenError::CodeGen {
            table: second.name.clone(),
            message: format!(
                "class name '{}' is already used by table '{}'",
                second.class_name, first.name
            ),
        });
    }
    Ok(())
}
