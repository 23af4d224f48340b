use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::Pop3Connection;
use crate::errors::*;
use crate::folder::{OpenMode, Pop3Folder};
use crate::message::{MessageParser, RawMessageParser};
use crate::settings::{ServerSettings, StoreConfig};
use crate::tls::TrustedSocketFactory;
use crate::uri::decode_uri;

/// What folders need from their store, shared between them.
pub(crate) struct StoreContext {
    pub(crate) settings: ServerSettings,
    pub(crate) config: StoreConfig,
    pub(crate) socket_factory: Arc<dyn TrustedSocketFactory>,
    pub(crate) parser: Arc<dyn MessageParser>,
}

impl StoreContext {
    pub(crate) fn inbox_id(&self) -> &str {
        &self.config.inbox_folder_id
    }

    /// Any spelling of the inbox id collapses to the configured one.
    pub(crate) fn canonical_folder_id(&self, name: &str) -> String {
        if name.eq_ignore_ascii_case(self.inbox_id()) {
            self.inbox_id().to_owned()
        } else {
            name.to_owned()
        }
    }

    pub(crate) fn create_connection(&self) -> Result<Pop3Connection> {
        let mut connection = Pop3Connection::new(
            self.settings.clone(),
            self.config.connection.clone(),
            Arc::clone(&self.socket_factory),
        );
        connection.open()?;
        Ok(connection)
    }
}

/// A POP3 account.
///
/// ```no_run
/// use std::sync::Arc;
/// use pop3_store::{FetchItem, FetchProfile, OpenMode, OpensslSocketFactory, Pop3Store, StoreConfig};
///
/// # fn main() -> pop3_store::Result<()> {
/// let config = StoreConfig::load("account.toml")?;
/// let mut store = Pop3Store::new(config, Arc::new(OpensslSocketFactory::new()))?;
/// let inbox_id = store.personal_namespaces()[0].clone();
/// let inbox = store.get_folder(&inbox_id);
/// inbox.open(OpenMode::ReadWrite)?;
/// let count = inbox.message_count();
/// if count > 0 {
///     let mut messages = inbox.get_messages(1, count, None)?;
///     let profile = FetchProfile::new().with(FetchItem::Envelope).with(FetchItem::BodySane);
///     inbox.fetch(&mut messages, &profile, None)?;
/// }
/// inbox.close();
/// # Ok(())
/// # }
/// ```
pub struct Pop3Store {
    context: Arc<StoreContext>,
    folders: HashMap<String, Pop3Folder>,
}

impl Pop3Store {
    /// Decodes `config.store_uri` and keeps downloaded messages as raw bytes.
    pub fn new(config: StoreConfig, socket_factory: Arc<dyn TrustedSocketFactory>) -> Result<Pop3Store> {
        let settings = decode_uri(&config.store_uri).chain_err(|| "Error while decoding store URI")?;
        Ok(Pop3Store::from_settings(
            settings,
            config,
            socket_factory,
            Arc::new(RawMessageParser),
        ))
    }

    pub fn from_settings(
        settings: ServerSettings,
        config: StoreConfig,
        socket_factory: Arc<dyn TrustedSocketFactory>,
        parser: Arc<dyn MessageParser>,
    ) -> Pop3Store {
        Pop3Store {
            context: Arc::new(StoreContext {
                settings,
                config,
                socket_factory,
                parser,
            }),
            folders: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.context.settings
    }

    pub fn config(&self) -> &StoreConfig {
        &self.context.config
    }

    /// The folder called `name`, created on first use.
    pub fn get_folder(&mut self, name: &str) -> &mut Pop3Folder {
        let id = self.context.canonical_folder_id(name);
        let context = &self.context;
        self.folders
            .entry(id)
            .or_insert_with_key(|id| Pop3Folder::new(Arc::clone(context), id))
    }

    /// POP3 has exactly one folder.
    pub fn personal_namespaces(&self) -> Vec<String> {
        vec![self.context.inbox_id().to_owned()]
    }

    /// Logs in and makes sure the server can list UIDs, which this client
    /// cannot work without.
    pub fn check_settings(&self) -> Result<()> {
        let mut folder = Pop3Folder::new(Arc::clone(&self.context), self.context.inbox_id());
        let result = folder
            .open(OpenMode::ReadWrite)
            .and_then(|_| folder.request_uidl());
        folder.close();
        result
    }

    pub fn is_seen_flag_supported(&self) -> bool {
        false
    }

    /// An opened, authenticated connection with this account's settings.
    pub fn create_connection(&self) -> Result<Pop3Connection> {
        self.context.create_connection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcpstream::MailSocket;

    struct NoTls;

    impl TrustedSocketFactory for NoTls {
        fn create_socket(
            &self,
            socket: Box<dyn MailSocket>,
            _host: &str,
            _port: u16,
            _client_certificate_alias: Option<&str>,
        ) -> Result<Box<dyn MailSocket>> {
            Ok(socket)
        }
    }

    fn store() -> Pop3Store {
        let config = StoreConfig {
            store_uri: "pop3://PLAIN:user:password@localhost:110".to_owned(),
            ..StoreConfig::default()
        };
        Pop3Store::new(config, Arc::new(NoTls)).unwrap()
    }

    #[test]
    fn inbox_name_is_canonicalized() {
        let mut store = store();
        assert_eq!(store.get_folder("inbox").id(), "INBOX");
        assert_eq!(store.get_folder("InBoX").id(), "INBOX");
        assert_eq!(store.folders.len(), 1);
    }

    #[test]
    fn other_folders_keep_their_name_and_do_not_exist() {
        let mut store = store();
        let folder = store.get_folder("Archive");
        assert_eq!(folder.id(), "Archive");
        assert!(!folder.exists());
        assert_eq!(store.folders.len(), 1);
    }

    #[test]
    fn opening_a_folder_other_than_the_inbox_fails() {
        let mut store = store();
        let folder = store.get_folder("Archive");
        match *folder.open(OpenMode::ReadWrite).unwrap_err().kind() {
            ErrorKind::FolderNotFound(ref name) => assert_eq!(name, "Archive"),
            ref other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn single_namespace() {
        assert_eq!(store().personal_namespaces(), vec!["INBOX".to_owned()]);
        assert!(!store().is_seen_flag_supported());
    }

    #[test]
    fn bad_uri_is_rejected() {
        let config = StoreConfig {
            store_uri: "imap://PLAIN:user:password@localhost".to_owned(),
            ..StoreConfig::default()
        };
        assert!(Pop3Store::new(config, Arc::new(NoTls)).is_err());
    }
}
