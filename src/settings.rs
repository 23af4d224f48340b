use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::*;

pub const DEFAULT_PORT: u16 = 110;
pub const DEFAULT_TLS_PORT: u16 = 995;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionSecurity {
    None,
    StartTlsRequired,
    SslTlsRequired,
}

impl ConnectionSecurity {
    pub fn default_port(self) -> u16 {
        match self {
            ConnectionSecurity::SslTlsRequired => DEFAULT_TLS_PORT,
            _ => DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    Plain,
    CramMd5,
    External,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::Plain => "PLAIN",
            AuthType::CramMd5 => "CRAM_MD5",
            AuthType::External => "EXTERNAL",
        }
    }

    pub fn from_name(name: &str) -> Option<AuthType> {
        match name {
            "PLAIN" => Some(AuthType::Plain),
            "CRAM_MD5" => Some(AuthType::CramMd5),
            "EXTERNAL" => Some(AuthType::External),
            _ => None,
        }
    }
}

/// Where and how to connect, as encoded in a store URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub connection_security: ConnectionSecurity,
    pub auth_type: AuthType,
    pub username: String,
    pub password: Option<String>,
    pub client_certificate_alias: Option<String>,
}

/// Socket tuning that is not part of the store URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Log passwords and SASL responses in protocol traces.
    pub log_sensitive: bool,
}

impl Default for ConnectionOptions {
    fn default() -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            log_sensitive: false,
        }
    }
}

impl ConnectionOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }
}

/// Per-account configuration of a [`Pop3Store`](crate::Pop3Store).
///
/// ```toml
/// store_uri = "pop3+ssl+://PLAIN:alice:secret@pop.example.com:995"
/// maximum_auto_download_message_size = 65536
///
/// [connection]
/// read_timeout_secs = 120
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub store_uri: String,
    pub inbox_folder_id: String,
    /// Byte cap for partial downloads; zero or less means "always download fully".
    pub maximum_auto_download_message_size: i64,
    /// Below this many unresolved messages, a large mailbox is queried one
    /// message at a time instead of with a full listing.
    pub per_message_unindexed_limit: usize,
    /// Mailboxes with more messages than this count as large.
    pub per_message_mailbox_threshold: u32,
    pub connection: ConnectionOptions,
}

impl Default for StoreConfig {
    fn default() -> StoreConfig {
        StoreConfig {
            store_uri: String::new(),
            inbox_folder_id: "INBOX".to_owned(),
            maximum_auto_download_message_size: 32 * 1024,
            per_message_unindexed_limit: 50,
            per_message_mailbox_threshold: 5000,
            connection: ConnectionOptions::default(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(config: &str) -> Result<StoreConfig> {
        Ok(toml::from_str(config)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<StoreConfig> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .chain_err(|| format!("Could not read {}", path.display()))?;
        StoreConfig::from_toml_str(&contents)
    }

    pub(crate) fn use_per_message_commands(&self, pending: usize, message_count: u32) -> bool {
        pending < self.per_message_unindexed_limit && message_count > self.per_message_mailbox_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = StoreConfig::from_toml_str("store_uri = \"pop3://PLAIN:a:b@h:110\"").unwrap();
        assert_eq!(config.inbox_folder_id, "INBOX");
        assert_eq!(config.maximum_auto_download_message_size, 32768);
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.connection.read_timeout(), Duration::from_secs(60));
        assert!(!config.connection.log_sensitive);
    }

    #[test]
    fn overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "store_uri = \"pop3+ssl+://PLAIN:alice:secret@pop.example.com:995\"\n\
             inbox_folder_id = \"Inbox\"\n\
             per_message_mailbox_threshold = 100\n\
             [connection]\n\
             read_timeout_secs = 5\n\
             log_sensitive = true"
        )
        .unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(config.inbox_folder_id, "Inbox");
        assert_eq!(config.per_message_mailbox_threshold, 100);
        assert_eq!(config.per_message_unindexed_limit, 50);
        assert_eq!(config.connection.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.connect_timeout_secs, 30);
        assert!(config.connection.log_sensitive);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(StoreConfig::from_toml_str("store_uri = ").is_err());
    }

    #[test]
    fn per_message_threshold() {
        let config = StoreConfig::default();
        assert!(config.use_per_message_commands(10, 5001));
        assert!(!config.use_per_message_commands(10, 4999));
        assert!(!config.use_per_message_commands(50, 6000));
        assert!(!config.use_per_message_commands(10, 5000));
    }

    #[test]
    fn default_ports() {
        assert_eq!(ConnectionSecurity::None.default_port(), 110);
        assert_eq!(ConnectionSecurity::StartTlsRequired.default_port(), 110);
        assert_eq!(ConnectionSecurity::SslTlsRequired.default_port(), 995);
    }
}
