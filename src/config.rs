use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fallback shared secret for the catalog-admin gate. A soft gate, not a
/// security boundary.
pub const DEFAULT_ADMIN_GATE: &str = "TINCTester";

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseConfig {
    pub fn to_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Read connection settings from `DB_*` environment variables. Returns
    /// `None` when any required variable is missing; the engine then runs in
    /// degraded local-memory mode instead of failing.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("DB_HOST").ok()?;
        let username = std::env::var("DB_USER").ok()?;
        let password = std::env::var("DB_PASSWORD").ok()?;
        let database = std::env::var("DB_NAME").ok()?;
        let port = std::env::var("DB_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3306);
        Some(Self {
            username,
            password,
            host,
            port,
            database,
        })
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ExportConfig {
    pub out_path: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { out_path: None }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct AppConfig {
    /// `None` means degraded local-memory mode (no persistence).
    pub database: Option<DatabaseConfig>,
    /// Active nomenclature system for Device Type matching; defaults to the
    /// first system in the catalog.
    pub active_system: Option<String>,
    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(db) = &self.database {
            if db.host.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "database.host",
                });
            }
            if db.username.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "database.username",
                });
            }
            if db.database.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "database.database",
                });
            }
            if db.port == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "database.port",
                    reason: "0 is out of range".into(),
                });
            }
        }
        if let Some(ref sys) = self.active_system {
            if sys.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "active_system",
                    reason: "must not be blank".into(),
                });
            }
        }
        Ok(())
    }
}

/// Check an operator-entered admin secret against `ADMIN_GATE_SECRET`
/// (fallback [`DEFAULT_ADMIN_GATE`]).
pub fn admin_gate_ok(input: &str) -> bool {
    let expected =
        std::env::var("ADMIN_GATE_SECRET").unwrap_or_else(|_| DEFAULT_ADMIN_GATE.to_string());
    input == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_host() {
        let cfg = AppConfig {
            database: Some(DatabaseConfig {
                username: "u".into(),
                password: "p".into(),
                host: " ".into(),
                port: 3306,
                database: "catalog".into(),
            }),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn degraded_mode_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = DatabaseConfig {
            username: "u".into(),
            password: "hunter2".into(),
            host: "h".into(),
            port: 3306,
            database: "d".into(),
        };
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
