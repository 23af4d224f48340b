use crate::commands::{
    AUTH_CRAM_MD5_CAPABILITY, AUTH_EXTERNAL_CAPABILITY, AUTH_PLAIN_CAPABILITY, SASL_CAPABILITY,
    STLS_CAPABILITY, TOP_CAPABILITY, UIDL_CAPABILITY,
};

/// What a server advertised in response to `AUTH` and `CAPA`.
///
/// A server that understands neither command produces an all-false record,
/// which is valid: USER/PASS and RETR are always available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub stls: bool,
    pub uidl: bool,
    pub top: bool,
    pub auth_plain: bool,
    pub cram_md5: bool,
    pub external: bool,
}

/// Whether the TOP command can be used on a connection.
///
/// `Unknown` licenses exactly one attempt; the outcome of that attempt moves
/// the connection to `Supported` or `Unsupported` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopSupport {
    Supported,
    Unsupported,
    Unknown,
}

impl Capabilities {
    /// Records one line of the listing returned by an argument-less `AUTH`.
    pub fn record_auth_mechanism(&mut self, line: &str) {
        self.record_mechanism(line.trim());
    }

    /// Records one line of a `CAPA` listing.
    pub fn record_capa_line(&mut self, line: &str) {
        let line = line.trim().to_uppercase();
        if line == STLS_CAPABILITY {
            self.stls = true;
        } else if line == UIDL_CAPABILITY {
            self.uidl = true;
        } else if line == TOP_CAPABILITY {
            self.top = true;
        } else if line.starts_with(SASL_CAPABILITY) {
            for mechanism in line.split_whitespace().skip(1) {
                self.record_mechanism(mechanism);
            }
        }
    }

    fn record_mechanism(&mut self, mechanism: &str) {
        let mechanism = mechanism.to_uppercase();
        match mechanism.as_str() {
            AUTH_PLAIN_CAPABILITY => self.auth_plain = true,
            AUTH_CRAM_MD5_CAPABILITY => self.cram_md5 = true,
            AUTH_EXTERNAL_CAPABILITY => self.external = true,
            _ => {}
        }
    }

    pub fn top_support(&self) -> TopSupport {
        if self.top {
            TopSupport::Supported
        } else {
            TopSupport::Unknown
        }
    }
}
