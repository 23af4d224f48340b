//! A POP3 mail store.
//!
//! The crate is layered the way the protocol is: a [`Pop3Connection`] owns the
//! socket, negotiates security and capabilities and authenticates; a
//! [`Pop3Folder`] maps transient message numbers to stable UIDs and downloads
//! content according to a [`FetchProfile`]; a [`Pop3Store`] turns a settings
//! URI into connections and hands out the single folder POP3 has.
//!
//! All I/O is blocking. A connection carries exactly one outstanding command
//! at a time, so callers sharing a store between threads have to serialize
//! access themselves (for instance by wrapping it in a `Mutex`).

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate base64;
extern crate hmac;
extern crate md5;
extern crate openssl;
extern crate percent_encoding;
extern crate regex;
extern crate serde;
extern crate toml;
extern crate url;

pub mod errors {
    use openssl::x509::X509;
    use std::fmt;

    /// Why a connection was refused on trust grounds.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CertificateReason {
        /// The TLS layer rejected the server certificate.
        Untrusted(String),
        /// STARTTLS was required but the server does not offer STLS.
        StartTlsUnavailable,
        /// A capability needed for certificate based login is missing.
        MissingCapability(String),
        /// The server refused the client certificate.
        ClientCertificateRejected(String),
    }

    impl fmt::Display for CertificateReason {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match *self {
                CertificateReason::Untrusted(ref why) => write!(f, "untrusted certificate ({})", why),
                CertificateReason::StartTlsUnavailable => {
                    write!(f, "STARTTLS connection security not available")
                }
                CertificateReason::MissingCapability(ref name) => {
                    write!(f, "missing capability {}", name)
                }
                CertificateReason::ClientCertificateRejected(ref response) => {
                    write!(f, "client certificate authentication failed: {}", response)
                }
            }
        }
    }

    /// Coarse grouping of errors, used to decide what to show a user.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ErrorCategory {
        Certificate,
        Authentication,
        Unsupported,
        Messaging,
    }

    error_chain! {
        foreign_links {
            Io(::std::io::Error);
            SslStack(::openssl::error::ErrorStack);
            UTF8Error(::std::string::FromUtf8Error);
            ParseInt(::std::num::ParseIntError);
            Url(::url::ParseError);
            Toml(::toml::de::Error);
        }

        errors {
            CertificateValidation(reason: CertificateReason, chain: Vec<X509>) {
                description("certificate validation failed")
                display("certificate validation failed: {}", reason)
            }
            AuthenticationFailed(message: String, response: String) {
                description("authentication failed")
                display("{}: {}", message, response)
            }
            ErrorResponse(response: String) {
                description("negative POP3 response")
                display("negative POP3 response: {}", response)
            }
            UnsupportedOperation(what: String) {
                description("unsupported operation")
                display("unsupported operation: {}", what)
            }
            FolderNotFound(name: String) {
                description("folder does not exist")
                display("folder does not exist: {}", name)
            }
            UnknownMessage(uid: String) {
                description("no message number for UID")
                display("could not find a message number for UID {}; permanent error", uid)
            }
            InvalidUri(reason: String) {
                description("invalid store URI")
                display("invalid store URI: {}", reason)
            }
            InvalidMessageSet(start: u32, end: u32) {
                description("invalid message set")
                display("invalid message set {} {}", start, end)
            }
            MalformedResponse(line: String) {
                description("malformed POP3 response")
                display("malformed POP3 response: {}", line)
            }
        }
    }

    impl Error {
        pub fn category(&self) -> ErrorCategory {
            match *self.kind() {
                ErrorKind::CertificateValidation(..) => ErrorCategory::Certificate,
                ErrorKind::AuthenticationFailed(..) => ErrorCategory::Authentication,
                ErrorKind::UnsupportedOperation(_) => ErrorCategory::Unsupported,
                _ => ErrorCategory::Messaging,
            }
        }

        /// True for a `-ERR` style reply, as opposed to a transport failure.
        pub fn is_error_response(&self) -> bool {
            match *self.kind() {
                ErrorKind::ErrorResponse(_) => true,
                _ => false,
            }
        }

        /// Retrying will not help; the message is gone from the server.
        pub fn is_permanent(&self) -> bool {
            match *self.kind() {
                ErrorKind::UnknownMessage(_) => true,
                _ => false,
            }
        }

        /// The peer certificate chain, if the failure carried one.
        pub fn certificate_chain(&self) -> &[X509] {
            match *self.kind() {
                ErrorKind::CertificateValidation(_, ref chain) => chain,
                _ => &[],
            }
        }
    }
}

mod capabilities;
mod commands;
mod connection;
mod fetch;
mod folder;
mod message;
mod pop3result;
mod settings;
mod store;
mod tcpreader;
mod tcpstream;
mod tls;
mod uri;
mod utils;

pub use capabilities::{Capabilities, TopSupport};
pub use connection::Pop3Connection;
pub use errors::{CertificateReason, Error, ErrorCategory, ErrorKind, Result};
pub use fetch::{FetchItem, FetchProfile, MessageRetrievalListener};
pub use folder::{OpenMode, Pop3Folder};
pub use message::{BoundMessage, Deletable, Flag, MessageParser, MutableFlags, Pop3Message, RawMessageParser};
pub use pop3result::{ListEntry, Pop3Stat, UidlEntry};
pub use settings::{AuthType, ConnectionOptions, ConnectionSecurity, ServerSettings, StoreConfig};
pub use store::Pop3Store;
pub use tcpreader::ResponseReader;
pub use tcpstream::MailSocket;
pub use tls::{ClientCertificate, OpensslSocketFactory, TrustedSocketFactory};
pub use uri::{create_uri, decode_uri};
