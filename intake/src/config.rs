//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `INTAKE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `INTAKE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `INTAKE_STORAGE__MAX_FILE_SIZE=1048576` sets the `storage.max_file_size` field.
//!
//! ## Configuration Structure
//!
//! See the repository's `config.yaml` for a complete example. Key sections:
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Storage**: `storage.dir`, `storage.max_file_size`, `storage.chunk_size`,
//!   `storage.allowed_extensions` - upload acceptance policy
//! - **Security**: `cors` - allowed origins for browser clients

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "INTAKE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upload acceptance policy (directory, size cap, chunking, extensions)
    pub storage: StorageConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// Upload acceptance policy.
///
/// Immutable after startup; every upload request is checked against these
/// values before and while bytes are written to disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory accepted files are written into. Created at startup if missing.
    pub dir: PathBuf,
    /// Hard ceiling on total bytes accepted per upload (default: 50 MiB).
    /// Enforced on the bytes actually received, never on a client-advertised length.
    pub max_file_size: u64,
    /// Size of each read from the upload stream (default: 5 MiB).
    /// A throughput/memory tuning knob only; it never changes which uploads are accepted.
    pub chunk_size: usize,
    /// Case-insensitive extension allowlist, each entry with its leading dot.
    pub allowed_extensions: Vec<String>,
}

impl StorageConfig {
    /// Whether `extension` (lower-or-mixed case, with leading dot) is accepted.
    pub fn is_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_file_size: 50 * 1024 * 1024, // 50 MiB
            chunk_size: 5 * 1024 * 1024,     // 5 MiB
            allowed_extensions: vec![
                ".parquet".to_string(),
                ".txt".to_string(),
                ".csv".to_string(),
                ".pdf".to_string(),
            ],
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins allowed to call the upload endpoint from a browser
    pub allowed_origins: Vec<CorsOrigin>,
    /// Whether to allow credentialed cross-origin requests
    pub allow_credentials: bool,
    /// How long (seconds) browsers may cache preflight responses
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                // Development frontend (Vite)
                CorsOrigin::Url(Url::parse("http://localhost:5173").unwrap()),
            ],
            allow_credentials: true,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage: StorageConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("INTAKE_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.storage.dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.dir cannot be empty".to_string(),
            });
        }

        if self.storage.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: storage.max_file_size must be greater than zero".to_string(),
            });
        }

        if self.storage.chunk_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: storage.chunk_size must be greater than zero".to_string(),
            });
        }

        if self.storage.allowed_extensions.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.allowed_extensions cannot be empty. Add at least one extension."
                    .to_string(),
            });
        }

        for extension in &self.storage.allowed_extensions {
            if !extension.starts_with('.') || extension.len() < 2 {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: invalid extension '{extension}': entries must start with a dot, e.g. '.csv'"
                    ),
                });
            }
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin."
                    .to_string(),
            });
        }

        // Validate that wildcard is not used with credentials
        let has_wildcard = self
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let args = Args {
                config: "missing.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 8000);
            assert_eq!(config.storage.dir, PathBuf::from("uploads"));
            assert_eq!(config.storage.max_file_size, 50 * 1024 * 1024);
            assert_eq!(config.storage.chunk_size, 5 * 1024 * 1024);
            assert!(config.storage.is_allowed(".csv"));
            assert!(config.storage.is_allowed(".PDF"));
            assert!(!config.storage.is_allowed(".exe"));

            Ok(())
        });
    }

    #[test]
    fn test_storage_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  dir: /srv/intake/files
  max_file_size: 1048576
  chunk_size: 65536
  allowed_extensions:
    - .csv
    - .json
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.storage.dir, PathBuf::from("/srv/intake/files"));
            assert_eq!(config.storage.max_file_size, 1048576);
            assert_eq!(config.storage.chunk_size, 65536);
            assert!(config.storage.is_allowed(".json"));
            assert!(!config.storage.is_allowed(".pdf"));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
"#,
            )?;

            jail.set_env("INTAKE_HOST", "127.0.0.1");
            jail.set_env("INTAKE_STORAGE__MAX_FILE_SIZE", "2048");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            // Env vars should override
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.storage.max_file_size, 2048);

            // YAML values should be preserved
            assert_eq!(config.port, 9000);

            Ok(())
        });
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  chunk_size: 0
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            assert!(Config::load(&args).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_rejects_extension_without_dot() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  allowed_extensions:
    - csv
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            assert!(Config::load(&args).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_rejects_wildcard_cors_with_credentials() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
cors:
  allowed_origins:
    - "*"
  allow_credentials: true
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            assert!(Config::load(&args).is_err());

            Ok(())
        });
    }
}
