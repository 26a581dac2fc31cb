//! Code generation
//!
//! This module turns the normalized tables into model classes, one source
//! file per table.

use std::path::PathBuf;

use crate::prelude::{DbServerType, PocoGenError, Tables};

pub mod csharp;

pub use csharp::CSharpGenerator;

/// Configuration for code generation
#[derive(Debug, Clone)]
pub struct CodeGenConfig {
    /// Output directory
    pub output_path: PathBuf,
    /// Namespace of the generated classes
    pub namespace: String,
    /// Emit navigation properties for foreign keys
    pub include_relationships: bool,
}

impl CodeGenConfig {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            namespace: "Models".to_string(),
            include_relationships: true,
        }
    }

    /// Defaults for a server: `<Server>.Models` as both namespace and
    /// output directory
    pub fn for_server(server_type: DbServerType) -> Self {
        let namespace = server_type.default_models_namespace();
        Self::new(PathBuf::from(&namespace)).with_namespace(namespace)
    }

    pub fn with_output_path(mut self, output_path: PathBuf) -> Self {
        self.output_path = output_path;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_include_relationships(mut self, include: bool) -> Self {
        self.include_relationships = include;
        self
    }
}

/// Trait for language-specific code generators
pub trait CodeGenerator {
    /// Generate code for the given tables
    fn generate(&self, tables: &Tables, config: &CodeGenConfig) -> Result<(), PocoGenError>;
}
