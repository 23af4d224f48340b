use openssl::ssl::{HandshakeError, SslConnector, SslFiletype, SslMethod};
use openssl::x509::{X509VerifyResult, X509};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::*;
use crate::tcpstream::MailSocket;

/// Turns a connected socket into one that is safe to speak POP3 over.
///
/// Used both for implicit TLS, right after the TCP connect, and for the
/// STARTTLS upgrade of an existing plaintext socket.
pub trait TrustedSocketFactory: Send + Sync {
    fn create_socket(
        &self,
        socket: Box<dyn MailSocket>,
        host: &str,
        port: u16,
        client_certificate_alias: Option<&str>,
    ) -> Result<Box<dyn MailSocket>>;
}

/// PEM files backing a client certificate alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub certificate_chain: PathBuf,
    pub private_key: PathBuf,
}

/// A `TrustedSocketFactory` backed by OpenSSL with peer verification on.
#[derive(Debug, Clone, Default)]
pub struct OpensslSocketFactory {
    ca_file: Option<PathBuf>,
    client_certificates: HashMap<String, ClientCertificate>,
}

impl OpensslSocketFactory {
    pub fn new() -> OpensslSocketFactory {
        OpensslSocketFactory::default()
    }

    /// Trusts the CAs in `path` in addition to the system defaults.
    pub fn with_ca_file<P: Into<PathBuf>>(mut self, path: P) -> OpensslSocketFactory {
        self.ca_file = Some(path.into());
        self
    }

    pub fn add_client_certificate(&mut self, alias: &str, certificate: ClientCertificate) {
        self.client_certificates.insert(alias.to_owned(), certificate);
    }

    fn connector(&self, client_certificate_alias: Option<&str>) -> Result<SslConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if let Some(ref ca_file) = self.ca_file {
            builder.set_ca_file(ca_file)?;
        }
        if let Some(alias) = client_certificate_alias {
            let certificate = self
                .client_certificates
                .get(alias)
                .ok_or_else(|| format!("Unknown client certificate alias {}", alias))?;
            builder.set_certificate_chain_file(&certificate.certificate_chain)?;
            builder.set_private_key_file(&certificate.private_key, SslFiletype::PEM)?;
            builder.check_private_key()?;
        }
        Ok(builder.build())
    }
}

impl TrustedSocketFactory for OpensslSocketFactory {
    fn create_socket(
        &self,
        socket: Box<dyn MailSocket>,
        host: &str,
        _port: u16,
        client_certificate_alias: Option<&str>,
    ) -> Result<Box<dyn MailSocket>> {
        debug!("Starting TLS handshake with {}", host);
        match self.connector(client_certificate_alias)?.connect(host, socket) {
            Ok(stream) => Ok(Box::new(stream)),
            Err(HandshakeError::SetupFailure(stack)) => Err(stack.into()),
            Err(HandshakeError::Failure(mid)) => {
                let verify_result = mid.ssl().verify_result();
                if verify_result != X509VerifyResult::OK {
                    let chain: Vec<X509> = mid
                        .ssl()
                        .peer_cert_chain()
                        .map(|chain| chain.iter().map(|cert| cert.to_owned()).collect())
                        .unwrap_or_default();
                    warn!("Certificate of {} rejected: {}", host, verify_result.error_string());
                    bail!(ErrorKind::CertificateValidation(
                        CertificateReason::Untrusted(verify_result.error_string().to_owned()),
                        chain
                    ));
                }
                Err(Error::with_chain(mid.into_error(), "Unable to connect"))
            }
            Err(HandshakeError::WouldBlock(_)) => {
                bail!("TLS handshake interrupted");
            }
        }
    }
}
