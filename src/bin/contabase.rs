//! Thin CLI over the record store.
//!
//! Commands:
//! - contabase create <name> <schema.json> [-d DIR]
//! - contabase delete <name> [-d DIR]
//! - contabase purge <name> [-d DIR]
//!
//! Exit code 0 on success, 1 on a missing schema file, an invalid schema,
//! or a missing table for delete/purge.

use clap::{Parser, Subcommand};
use contabase::{Schema, Store, StoreConfig, StoreError};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

/// Contabase - a schema-validated record store keyed by content hashes
#[derive(Parser, Debug)]
#[command(name = "contabase")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a table from a JSON schema file
    Create {
        /// The name of the table
        name: String,

        /// Path to the schema definition (*.json)
        schema: PathBuf,

        /// The directory where all tables are stored
        #[arg(short = 'd', default_value = "./contabase")]
        dir: PathBuf,
    },

    /// Delete a table and everything in its directory
    Delete {
        /// The name of the table to delete
        name: String,

        /// The directory where all tables are stored
        #[arg(short = 'd', default_value = "./contabase")]
        dir: PathBuf,
    },

    /// Remove all records from a table, keeping its schema
    Purge {
        /// The name of the table to purge
        name: String,

        /// The directory where all tables are stored
        #[arg(short = 'd', default_value = "./contabase")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Create { name, schema, dir } => create(&name, &schema, dir),
        Command::Delete { name, dir } => delete(&name, dir),
        Command::Purge { name, dir } => purge(&name, dir),
    }
}

fn create(name: &str, schema_file: &PathBuf, dir: PathBuf) -> Result<(), String> {
    let raw = fs::read_to_string(schema_file)
        .map_err(|_| format!("The file {} does not exist", schema_file.display()))?;

    let schema = Schema::from_json_str(&raw).map_err(|e| format!("Invalid schema: {e}"))?;

    let store = Store::open(StoreConfig {
        name: name.to_string(),
        root: dir,
        schema: Some(schema),
        ..Default::default()
    })
    .map_err(|e| match e {
        StoreError::Schema(message) => format!("Invalid schema: {message}"),
        other => other.to_string(),
    })?;

    store.commit().map_err(|e| e.to_string())
}

fn delete(name: &str, dir: PathBuf) -> Result<(), String> {
    let path = dir.join(name);
    if !path.is_dir() {
        return Err(format!("The table '{name}' does not exist"));
    }
    fs::remove_dir_all(&path).map_err(|e| e.to_string())
}

fn purge(name: &str, dir: PathBuf) -> Result<(), String> {
    let table_file = dir.join(name).join(format!("{name}.db"));
    let schema_file = dir.join(name).join("db.schema");

    if !table_file.is_file() {
        return Err(format!("The table file does not exist ({name}.db)"));
    }
    if !schema_file.is_file() {
        return Err(format!("No schema exists for the table '{name}'"));
    }

    let mut store = Store::open(StoreConfig {
        name: name.to_string(),
        root: dir,
        ..Default::default()
    })
    .map_err(|e| e.to_string())?;

    store.purge();
    store.commit().map_err(|e| e.to_string())
}
