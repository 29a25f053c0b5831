//! Probe-mode target resolution.
//!
//! A probe request names a `target` (`host` or `host:port`) and a `module`.
//! The module selects a credential section of an INI store:
//!
//! ```ini
//! [client]
//! user = monitor
//! password = secret
//! host = db.internal
//!
//! [client.replica]
//! user = replica_monitor
//! password = other
//! sslmode = require
//! ```
//!
//! `module=""` and `module="default"` use `[client]`, any other name uses
//! `[client.<name>]`. Host and port fall back to `[client]`, then to
//! `localhost:5432`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use config::{Config, File, FileFormat, Source, Value, ValueKind};
use thiserror::Error;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_SECTION: &str = "client";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;

/// Section keys passed on to the connection string besides host, port,
/// user and password. Other keys (client options of other tools sharing
/// the file) are ignored.
const CONNECTION_OPTIONS: &[&str] = &[
    "dbname",
    "sslmode",
    "application_name",
    "connect_timeout",
    "options",
    "keepalives",
    "keepalives_idle",
    "target_session_attrs",
    "channel_binding",
];

/// Reasons a probe request cannot be turned into a connection target.
///
/// The messages are returned verbatim to the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("invalid port {0}")]
    InvalidPort(String),
    #[error("didn't find section [{0}] in config")]
    SectionNotFound(String),
    #[error("no user or password specified under [{0}] in config")]
    MissingCredentials(String),
}

/// INI credential sections, keyed by lower-cased section name.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl CredentialStore {
    /// Reads and parses an INI file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let store = Self::from_ini_str(&text)?;
        debug!(path = %path.display(), sections = store.sections.len(), "loaded credential store");
        Ok(store)
    }

    /// Parses INI text. A key without a value (`skip-ssl`) reads as `true`.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let text = expand_boolean_keys(text);
        let settings = Config::builder()
            .add_source(File::from_str(&text, FileFormat::Ini))
            .build()
            .map_err(|e| ConfigError::Credentials(e.to_string()))?;
        let table = settings
            .collect()
            .map_err(|e| ConfigError::Credentials(e.to_string()))?;

        // Dotted section names come back as nested tables.
        let mut store = Self::default();
        for (name, value) in table {
            if let ValueKind::Table(children) = value.kind {
                store.flatten(name.to_lowercase(), children);
            }
        }
        Ok(store)
    }

    fn flatten(&mut self, path: String, table: config::Map<String, Value>) {
        let mut keys = BTreeMap::new();
        let mut children = Vec::new();
        for (key, value) in table {
            match value.kind {
                ValueKind::Table(nested) => {
                    children.push((format!("{path}.{}", key.to_lowercase()), nested))
                }
                ValueKind::Nil => {
                    keys.insert(key.to_lowercase(), String::new());
                }
                ValueKind::Array(_) => {}
                _ => {
                    if let Ok(text) = value.into_string() {
                        keys.insert(key.to_lowercase(), text);
                    }
                }
            }
        }
        if !keys.is_empty() || children.is_empty() {
            self.sections.entry(path).or_default().extend(keys);
        }
        for (child, nested) in children {
            self.flatten(child, nested);
        }
    }

    /// Adds or replaces a section.
    pub fn with_section<I, K, V>(mut self, name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let section = entries
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
            .collect();
        self.sections.insert(name.to_lowercase(), section);
        self
    }

    /// Section by name, case-insensitive.
    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(&name.to_lowercase())
    }

    fn key(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Everything needed to open a PostgreSQL connection to one probe target.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Extra connection parameters such as `dbname` or `sslmode`.
    pub options: BTreeMap<String, String>,
}

impl ConnectionTarget {
    /// Renders a libpq key/value connection string.
    pub fn to_connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote(&self.user)),
            format!("password={}", quote(&self.password)),
        ];
        parts.extend(
            self.options
                .iter()
                .map(|(k, v)| format!("{k}={}", quote(v))),
        );
        parts.join(" ")
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("options", &self.options)
            .finish()
    }
}

fn expand_boolean_keys(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim();
            let bare = !trimmed.is_empty()
                && !trimmed.starts_with(['[', ';', '#'])
                && !trimmed.contains(['=', ':']);
            if bare {
                format!("{trimmed} = true")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn parse_port(raw: &str) -> Result<u16, TargetError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| TargetError::InvalidPort(raw.to_string()))
}

/// Resolves a probe request into a connection target.
///
/// A port of `0`, given or configured, counts as unset.
pub fn resolve_target(
    target: &str,
    module: &str,
    store: &CredentialStore,
) -> Result<ConnectionTarget, TargetError> {
    let (mut host, mut port) = (String::new(), 0u16);
    if !target.is_empty() {
        let mut parts = target.splitn(2, ':');
        host = parts.next().unwrap_or_default().to_string();
        if let Some(raw) = parts.next() {
            port = parse_port(raw)?;
        }
    }

    let section = match module {
        "" | "default" => DEFAULT_SECTION.to_string(),
        name => format!("{DEFAULT_SECTION}.{name}"),
    };
    let credentials = store
        .section(&section)
        .ok_or_else(|| TargetError::SectionNotFound(section.clone()))?;

    if host.is_empty() {
        host = store
            .key(DEFAULT_SECTION, "host")
            .unwrap_or(DEFAULT_HOST)
            .to_string();
    }
    if port == 0 {
        port = match store.key(DEFAULT_SECTION, "port") {
            Some(raw) => parse_port(raw)?,
            None => 0,
        };
    }
    if port == 0 {
        port = DEFAULT_PORT;
    }

    let field = |key: &str| credentials.get(key).cloned().unwrap_or_default();
    let (user, password) = (field("user"), field("password"));
    if user.is_empty() || password.is_empty() {
        return Err(TargetError::MissingCredentials(section));
    }

    let mut options = BTreeMap::new();
    for (key, value) in credentials {
        if CONNECTION_OPTIONS.contains(&key.as_str()) {
            options.insert(key.clone(), value.clone());
        } else if !matches!(key.as_str(), "host" | "port" | "user" | "password") {
            debug!(section = %section, key = %key, "ignoring non-connection key");
        }
    }

    Ok(ConnectionTarget {
        host,
        port,
        user,
        password,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STORE: &str = "\
[client]
user = monitor
password = s3cret

[client.replica]
User = replica_monitor
Password = other
sslmode = require
dbname = app
";

    fn store() -> CredentialStore {
        CredentialStore::from_ini_str(STORE).unwrap()
    }

    #[test]
    fn explicit_host_and_port_are_used() {
        let target = resolve_target("db1:5236", "", &store()).unwrap();
        assert_eq!(target.host, "db1");
        assert_eq!(target.port, 5236);
        assert_eq!(target.user, "monitor");
        assert_eq!(target.password, "s3cret");
        assert!(target.options.is_empty());
    }

    #[test]
    fn request_overrides_configured_host_and_port() {
        let store = CredentialStore::default().with_section(
            "client",
            [("host", "x"), ("port", "1"), ("user", "u"), ("password", "p")],
        );

        let target = resolve_target("db1:5236", "", &store).unwrap();
        assert_eq!((target.host.as_str(), target.port), ("db1", 5236));

        let target = resolve_target("", "", &store).unwrap();
        assert_eq!((target.host.as_str(), target.port), ("x", 1));
    }

    #[test]
    fn empty_target_falls_back_to_defaults() {
        let target = resolve_target("", "", &store()).unwrap();
        assert_eq!(target.host, DEFAULT_HOST);
        assert_eq!(target.port, DEFAULT_PORT);
    }

    #[test]
    fn host_and_port_fall_back_to_client_section() {
        let store = CredentialStore::default()
            .with_section(
                "client",
                [("host", "db.internal"), ("port", "6432"), ("user", "u"), ("password", "p")],
            )
            .with_section("client.batch", [("user", "batch"), ("password", "b")]);

        let target = resolve_target("", "batch", &store).unwrap();
        assert_eq!(target.host, "db.internal");
        assert_eq!(target.port, 6432);
        assert_eq!(target.user, "batch");

        let target = resolve_target("other", "batch", &store).unwrap();
        assert_eq!(target.host, "other");
        assert_eq!(target.port, 6432);
    }

    #[test]
    fn default_module_name_selects_client_section() {
        let target = resolve_target("h", "default", &store()).unwrap();
        assert_eq!(target.user, "monitor");
    }

    #[test]
    fn module_section_is_case_insensitive_and_carries_options() {
        let target = resolve_target("h", "Replica", &store()).unwrap();
        assert_eq!(target.user, "replica_monitor");
        assert_eq!(target.password, "other");
        assert_eq!(target.options.get("sslmode").map(String::as_str), Some("require"));
        assert_eq!(target.options.get("dbname").map(String::as_str), Some("app"));
    }

    #[test]
    fn unknown_module_is_reported() {
        let err = resolve_target("h", "missingmod", &store()).unwrap_err();
        assert_eq!(err, TargetError::SectionNotFound("client.missingmod".to_string()));
        assert_eq!(err.to_string(), "didn't find section [client.missingmod] in config");
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let err = resolve_target("db1:abc", "", &store()).unwrap_err();
        assert_eq!(err.to_string(), "invalid port abc");

        let err = resolve_target("db1:70000", "", &store()).unwrap_err();
        assert_eq!(err, TargetError::InvalidPort("70000".to_string()));
    }

    #[test]
    fn bad_configured_port_is_rejected() {
        let store = CredentialStore::default().with_section(
            "client",
            [("port", "fivefour"), ("user", "u"), ("password", "p")],
        );
        let err = resolve_target("db1", "", &store).unwrap_err();
        assert_eq!(err, TargetError::InvalidPort("fivefour".to_string()));
    }

    #[test]
    fn missing_password_is_reported() {
        let store = CredentialStore::default().with_section("client", [("user", "u")]);
        let err = resolve_target("db1", "", &store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no user or password specified under [client] in config"
        );
    }

    #[test]
    fn connection_string_quotes_special_values() {
        let target = ConnectionTarget {
            host: "db1".to_string(),
            port: 5432,
            user: "monitor".to_string(),
            password: "it's a secret".to_string(),
            options: [("application_name".to_string(), String::new())]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            target.to_connection_string(),
            r"host=db1 port=5432 user=monitor password='it\'s a secret' application_name=''"
        );
    }

    #[test]
    fn debug_output_masks_password() {
        let target = resolve_target("db1", "", &store()).unwrap();
        let debug = format!("{target:?}");
        assert!(!debug.contains("s3cret"));
        assert_eq!(target.to_string(), "monitor@db1:5432");
    }

    #[test]
    fn loads_store_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STORE.as_bytes()).unwrap();

        let store = CredentialStore::load(file.path()).unwrap();
        assert!(store.section("client").is_some());
        assert!(store.section("CLIENT.REPLICA").is_some());
    }

    #[test]
    fn bare_keys_load_as_true() {
        let text = "\
[client]
user = monitor
password = s3cret
skip-ssl
; comment
# another comment
";
        let store = CredentialStore::from_ini_str(text).unwrap();
        let client = store.section("client").unwrap();
        assert_eq!(client.get("skip-ssl").map(String::as_str), Some("true"));
        assert_eq!(client.get("user").map(String::as_str), Some("monitor"));
    }

    #[test]
    fn non_connection_keys_stay_out_of_the_connection_string() {
        let text = "\
[client]
user = monitor
password = s3cret
skip-ssl
sslmode = disable
";
        let store = CredentialStore::from_ini_str(text).unwrap();
        let target = resolve_target("db1", "", &store).unwrap();
        assert_eq!(
            target.to_connection_string(),
            "host=db1 port=5432 user=monitor password=s3cret sslmode=disable"
        );
    }

    #[test]
    fn missing_store_file_is_an_io_error() {
        let err = CredentialStore::load(Path::new("/nonexistent/config.default.cnf")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
