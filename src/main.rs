use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pocogen::codegen::{CSharpGenerator, CodeGenConfig, CodeGenerator};
use pocogen::config::{self, DbConfig};
use pocogen::introspect::{self, TableFilter};
use pocogen::schema::DbServerType;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Database {
    /// Microsoft SQL Server
    Mssql,
    Sqlite,
    Mysql,
    Postgres,
}

impl From<Database> for DbServerType {
    fn from(database: Database) -> Self {
        match database {
            Database::Mssql => DbServerType::MsSql,
            Database::Sqlite => DbServerType::Sqlite,
            Database::Mysql => DbServerType::MySql,
            Database::Postgres => DbServerType::Postgres,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pocogen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source database type (default: DB_SERVER_TYPE)
    database: Option<Database>,

    /// Connection string (default: DB_CONNECTION_STRING)
    #[arg(long)]
    connection_string: Option<String>,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Output directory (default: <Database>.Models)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Namespace of the generated classes (default: <Database>.Models)
    #[arg(long)]
    namespace: Option<String>,

    /// Do not generate navigation properties for foreign keys
    #[arg(long)]
    no_relationships: bool,

    /// Comma-separated list of tables to include (default: all)
    #[arg(long, value_delimiter = ',')]
    tables: Option<Vec<String>>,

    /// Comma-separated list of tables to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Option<Vec<String>>,

    /// Comma-separated list of table name prefixes to exclude
    #[arg(long, value_delimiter = ',')]
    exclude_prefix: Vec<String>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("pocogen v{}", env!("CARGO_PKG_VERSION"));

    let db_config = load_config(&cli)?;
    let server_type = cli
        .database
        .map(DbServerType::from)
        .or(db_config.server_type)
        .context("No database type given. Pass one on the command line or set DB_SERVER_TYPE")?;

    info!(
        database = ?server_type,
        connection = ?db_config.redacted_connection_string(),
        "Starting schema read"
    );

    let filter = TableFilter {
        include: cli.tables,
        exclude: cli.exclude,
        exclude_prefixes: cli.exclude_prefix,
    };
    if !filter.is_empty() {
        debug!(filter = ?filter, "Table filter configured");
    }

    let mut tables = introspect::read_schema(server_type, &db_config.connection_string)
        .context("Failed to read database schema")?;
    filter.apply(&mut tables);

    if tables.is_empty() {
        warn!("No tables found after filtering");
        return Ok(());
    }

    for table in &tables {
        debug!(
            table = ?table.name,
            class_name = ?table.class_name,
            columns = ?table.columns.len(),
            outer_keys = ?table.outer_keys.len(),
            inner_keys = ?table.inner_keys.len(),
            "Table"
        );
    }

    let mut codegen_config = CodeGenConfig::for_server(server_type)
        .with_include_relationships(!cli.no_relationships);
    if let Some(output) = cli.output {
        codegen_config = codegen_config.with_output_path(output);
    }
    if let Some(namespace) = cli.namespace {
        codegen_config = codegen_config.with_namespace(namespace);
    }
    debug!(codegen_config = ?codegen_config, "Code generation config");

    CSharpGenerator::new()
        .generate(&tables, &codegen_config)
        .context("Failed to generate models")?;

    Ok(())
}

/// Connection settings from the command line, falling back to the
/// environment
fn load_config(cli: &Cli) -> Result<DbConfig> {
    match &cli.connection_string {
        Some(connection_string) => {
            config::load_env_file(&cli.env_file)?;
            Ok(DbConfig {
                server_type: None,
                connection_string: connection_string.clone(),
            })
        }
        None => DbConfig::load(&cli.env_file).context("Failed to load database configuration"),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
