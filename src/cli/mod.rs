//! CLI argument surface. Parsing only; the interactive review loop lives in
//! `main.rs`.

use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, DatabaseConfig, ExportConfig};
use crate::error::ConfigError;
use crate::models::{ColumnMapping, ColumnTarget};

#[derive(Parser, Debug)]
#[command(
    name = "inventory_standardizer",
    version,
    about = "Medical-equipment inventory standardization against a canonical catalog",
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Standardize a delimited inventory export through interactive review
    Run(RunArgs),
    /// Catalog maintenance (gated by the admin secret)
    Admin(AdminArgs),
    /// Write a .env.template file with the recognized variables
    EnvTemplate {
        #[arg(value_name = "PATH", default_value = ".env.template")]
        path: String,
    },
}

#[derive(Args, Debug)]
pub struct DbArgs {
    /// DB host (env: DB_HOST)
    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,
    /// DB port (env: DB_PORT)
    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    pub db_port: u16,
    /// DB user (env: DB_USER)
    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,
    /// DB password (env: DB_PASSWORD)
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,
    /// Database name (env: DB_NAME)
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,
}

impl DbArgs {
    /// `None` when any required setting is missing (degraded local mode).
    pub fn to_database_config(&self) -> Option<DatabaseConfig> {
        match (&self.db_host, &self.db_user, &self.db_name) {
            (Some(host), Some(user), Some(name)) => Some(DatabaseConfig {
                username: user.clone(),
                password: self.db_password.clone().unwrap_or_default(),
                host: host.clone(),
                port: self.db_port,
                database: name.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input file with pasted delimited text, or "-" for stdin
    #[arg(value_name = "INPUT")]
    pub input: String,
    /// Output file; defaults to stdout
    #[arg(short, long, value_name = "PATH")]
    pub out: Option<String>,
    /// Active nomenclature system id for Device Type matching
    /// (defaults to the first system in the catalog)
    #[arg(long, value_name = "SYSTEM_ID")]
    pub system: Option<String>,
    /// Override a suggested column mapping, repeatable.
    /// Targets: "Device Type", "Manufacturer", "Model", "Reference Field",
    /// or empty to skip the column (e.g. --map "Notes=")
    #[arg(long = "map", value_name = "COLUMN=TARGET")]
    pub map: Vec<String>,
    /// Run without a database: in-memory seeded catalog, nothing persists
    #[arg(long)]
    pub offline: bool,
    /// Non-interactive: skip every review item instead of prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    #[command(flatten)]
    pub db: DbArgs,
}

impl RunArgs {
    /// Build the app configuration. Missing database settings are not an
    /// error; they select degraded local-memory mode.
    pub fn to_app_config(&self) -> Result<AppConfig, ConfigError> {
        let database = if self.offline {
            None
        } else {
            self.db.to_database_config()
        };
        let cfg = AppConfig {
            database,
            active_system: self.system.clone(),
            export: ExportConfig {
                out_path: self.out.clone(),
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `--map COLUMN=TARGET` overrides to a suggested mapping.
    pub fn apply_map_overrides(&self, mapping: &mut ColumnMapping) -> Result<(), ConfigError> {
        for entry in &self.map {
            let (column, target) = entry.split_once('=').ok_or(ConfigError::InvalidValue {
                field: "--map",
                reason: format!("'{entry}' is not COLUMN=TARGET"),
            })?;
            let target = ColumnTarget::parse(target).ok_or(ConfigError::InvalidValue {
                field: "--map",
                reason: format!("unknown target '{target}'"),
            })?;
            mapping.set(column, target);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct AdminArgs {
    /// Admin gate secret (checked against ADMIN_GATE_SECRET)
    #[arg(long, value_name = "SECRET")]
    pub secret: String,
    /// Operate on an in-memory seeded catalog instead of the database
    #[arg(long)]
    pub offline: bool,
    #[command(flatten)]
    pub db: DbArgs,
    #[command(subcommand)]
    pub action: AdminAction,
}

#[derive(Subcommand, Debug)]
pub enum AdminAction {
    /// Merge one term into another; the absorbed term's standard and
    /// variations become variations of the survivor, then it is deleted
    MergeTerms {
        /// "Device Type", "Manufacturer" or "Model"
        #[arg(long, value_name = "FIELD")]
        field: String,
        /// Nomenclature system id (Device Type merges only)
        #[arg(long, value_name = "SYSTEM_ID")]
        system: Option<String>,
        /// Standard name of the surviving term
        #[arg(value_name = "SURVIVOR")]
        survivor: String,
        /// Standard name of the term to absorb
        #[arg(value_name = "ABSORBED")]
        absorbed: String,
    },
    /// Create a nomenclature system
    CreateSystem {
        name: String,
        #[arg(default_value = "")]
        description: String,
    },
    /// Delete a nomenclature system and every term it owns
    DeleteSystem { id: String },
    /// List systems and term counts
    ListSystems,
}

/// Parse an admin `--field` value into a match field.
pub fn parse_field(label: &str) -> Result<crate::models::MatchField, ConfigError> {
    match ColumnTarget::parse(label) {
        Some(ColumnTarget::Match(f)) => Ok(f),
        _ => Err(ConfigError::InvalidValue {
            field: "--field",
            reason: format!("'{label}' is not one of \"Device Type\", \"Manufacturer\", \"Model\""),
        }),
    }
}
