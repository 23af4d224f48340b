//! The settings URI of a POP3 account.
//!
//! ```text
//! pop3://authType:user:password@server:port       no transport security
//! pop3+tls+://authType:user:password@server:port  STARTTLS required
//! pop3+ssl+://authType:user:password@server:port  implicit TLS
//! ```
//!
//! For `EXTERNAL` authentication the secret is the client certificate alias.
//! The obsolete schemes `pop3+tls` and `pop3+ssl` and the legacy userinfo
//! form `user:password` are still understood when decoding.

use percent_encoding::percent_decode_str;
use url::form_urlencoded::byte_serialize;
use url::Url;

use crate::errors::*;
use crate::settings::{AuthType, ConnectionSecurity, ServerSettings};

fn decode_utf8(part: &str) -> Result<String> {
    let spaced = part.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ErrorKind::InvalidUri(format!("invalid UTF-8 in userinfo: {}", e)).into())
}

fn encode_utf8(part: &str) -> String {
    byte_serialize(part.as_bytes()).collect()
}

/// The userinfo exactly as written; `Url` re-encodes separators inside it.
fn raw_userinfo(uri: &str) -> &str {
    let authority = uri.splitn(2, "://").nth(1).unwrap_or("");
    let authority = authority
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    match authority.rfind('@') {
        Some(at) => &authority[..at],
        None => "",
    }
}

fn non_empty<'a>(part: Option<&&'a str>) -> Option<&'a str> {
    part.cloned().filter(|part| !part.is_empty())
}

pub fn decode_uri(uri: &str) -> Result<ServerSettings> {
    let url = Url::parse(uri).chain_err(|| ErrorKind::InvalidUri(format!("cannot parse {}", uri)))?;

    let scheme = url.scheme();
    let connection_security = if scheme == "pop3" {
        ConnectionSecurity::None
    } else if scheme.starts_with("pop3+tls") {
        ConnectionSecurity::StartTlsRequired
    } else if scheme.starts_with("pop3+ssl") {
        ConnectionSecurity::SslTlsRequired
    } else {
        bail!(ErrorKind::InvalidUri(format!("Unsupported protocol ({})", scheme)));
    };

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_owned(),
        _ => {
            bail!(ErrorKind::InvalidUri("missing host".to_owned()));
        }
    };
    let port = url.port().unwrap_or_else(|| connection_security.default_port());

    let parts: Vec<&str> = raw_userinfo(uri).split(':').collect();

    let mut auth_type = AuthType::Plain;
    let (username, secret) = if parts.len() > 2 {
        auth_type = AuthType::from_name(parts[0])
            .ok_or_else(|| ErrorKind::InvalidUri(format!("unknown authentication type {}", parts[0])))?;
        (parts[1], non_empty(parts.get(2)))
    } else {
        (parts[0], non_empty(parts.get(1)))
    };

    let username = decode_utf8(username)?;
    let secret = match secret {
        Some(secret) => Some(decode_utf8(secret)?),
        None => None,
    };
    let (password, client_certificate_alias) = if auth_type == AuthType::External {
        (None, secret)
    } else {
        (secret, None)
    };

    Ok(ServerSettings {
        host,
        port,
        connection_security,
        auth_type,
        username,
        password,
        client_certificate_alias,
    })
}

pub fn create_uri(server: &ServerSettings) -> String {
    let scheme = match server.connection_security {
        ConnectionSecurity::SslTlsRequired => "pop3+ssl+",
        ConnectionSecurity::StartTlsRequired => "pop3+tls+",
        ConnectionSecurity::None => "pop3",
    };
    let secret = if server.auth_type == AuthType::External {
        server.client_certificate_alias.as_ref()
    } else {
        server.password.as_ref()
    };
    format!(
        "{}://{}:{}:{}@{}:{}",
        scheme,
        server.auth_type.as_str(),
        encode_utf8(&server.username),
        secret.map(|secret| encode_utf8(secret)).unwrap_or_default(),
        server.host,
        server.port
    )
}
