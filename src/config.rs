//! Connection configuration.
//!
//! Connection URLs follow the PDO-style DSN layout: a driver prefix, the
//! database path, then optional `key=value` options separated by `;`.
//!
//! ```text
//! sqlite::memory:
//! sqlite:/var/lib/app/site.db;mode=rw;busy_timeout=500
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConnectionError;

/// Settings a collaborator loads from its own configuration source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, see [`ConnectionUrl`].
    pub url: String,
    /// Record statement history and timing.
    #[serde(default)]
    pub verbose: bool,
    /// Skip every statement that is not a `SELECT`.
    #[serde(default)]
    pub read_only: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verbose: false,
            read_only: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    #[default]
    ReadWriteCreate,
}

/// A parsed connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    pub path: String,
    pub mode: OpenMode,
    pub busy_timeout: Option<Duration>,
}

impl ConnectionUrl {
    pub const MEMORY: &'static str = ":memory:";

    pub fn parse(url: &str) -> Result<Self, ConnectionError> {
        let (driver, rest) = url
            .split_once(':')
            .ok_or_else(|| ConnectionError::InvalidUrl("missing driver prefix".to_string()))?;
        if !driver.eq_ignore_ascii_case("sqlite") {
            return Err(ConnectionError::UnsupportedDriver(driver.to_string()));
        }

        let mut parts = rest.split(';');
        let path = parts.next().unwrap_or_default().trim();
        if path.is_empty() {
            return Err(ConnectionError::InvalidUrl("missing database path".to_string()));
        }

        let mut parsed = Self {
            path: path.to_string(),
            mode: OpenMode::default(),
            busy_timeout: None,
        };

        for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ConnectionError::InvalidUrl(format!("option `{part}` is not key=value"))
            })?;
            match key.trim() {
                "mode" => {
                    parsed.mode = match value.trim() {
                        "ro" => OpenMode::ReadOnly,
                        "rw" => OpenMode::ReadWrite,
                        "rwc" => OpenMode::ReadWriteCreate,
                        other => {
                            return Err(ConnectionError::InvalidUrl(format!(
                                "unknown mode `{other}`"
                            )))
                        }
                    };
                }
                "busy_timeout" => {
                    let ms = value.trim().parse::<u64>().map_err(|_| {
                        ConnectionError::InvalidUrl(format!("busy_timeout `{value}` is not a number"))
                    })?;
                    parsed.busy_timeout = Some(Duration::from_millis(ms));
                }
                // Credentials are part of the DSN layout but mean nothing to SQLite.
                "user" | "password" => {}
                other => return Err(ConnectionError::UnsupportedOption(other.to_string())),
            }
        }

        Ok(parsed)
    }

    pub fn is_memory(&self) -> bool {
        self.path == Self::MEMORY
    }
}

impl FromStr for ConnectionUrl {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_url() {
        let url = ConnectionUrl::parse("sqlite::memory:").unwrap();
        assert!(url.is_memory());
        assert_eq!(url.mode, OpenMode::ReadWriteCreate);
        assert_eq!(url.busy_timeout, None);
    }

    #[test]
    fn file_url_with_options() {
        let url: ConnectionUrl = "sqlite:/tmp/site.db;mode=ro;busy_timeout=250;user=web;password=secret"
            .parse()
            .unwrap();
        assert_eq!(url.path, "/tmp/site.db");
        assert_eq!(url.mode, OpenMode::ReadOnly);
        assert_eq!(url.busy_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            ConnectionUrl::parse("no-driver"),
            Err(ConnectionError::InvalidUrl(_))
        ));
        assert!(matches!(
            ConnectionUrl::parse("mysql:host=localhost;dbname=db"),
            Err(ConnectionError::UnsupportedDriver(d)) if d == "mysql"
        ));
        assert!(matches!(
            ConnectionUrl::parse("sqlite:"),
            Err(ConnectionError::InvalidUrl(_))
        ));
        assert!(matches!(
            ConnectionUrl::parse("sqlite:/tmp/x.db;charset=utf8"),
            Err(ConnectionError::UnsupportedOption(o)) if o == "charset"
        ));
        assert!(ConnectionUrl::parse("sqlite:/tmp/x.db;mode=append").is_err());
        assert!(ConnectionUrl::parse("sqlite:/tmp/x.db;busy_timeout=soon").is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{ "url": "sqlite::memory:" }"#).unwrap();
        assert_eq!(config, DatabaseConfig::new("sqlite::memory:"));

        let config: DatabaseConfig = serde_json::from_str(
            r#"{ "url": "sqlite::memory:", "verbose": true, "read_only": true }"#,
        )
        .unwrap();
        assert!(config.verbose);
        assert!(config.read_only);
    }
}
