use std::io::{self, BufReader};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use crate::capabilities::{Capabilities, TopSupport};
use crate::commands::*;
use crate::errors::*;
use crate::settings::{AuthType, ConnectionOptions, ConnectionSecurity, ServerSettings};
use crate::tcpreader::ResponseReader;
use crate::tcpstream::{LineStream, MailSocket};
use crate::tls::TrustedSocketFactory;
use crate::utils;

/// One authenticated POP3 session.
///
/// A connection is opened once and torn down with [`close`](Pop3Connection::close);
/// it is never reused afterwards. Any failure while a command is in flight
/// closes it, since the position in the reply stream is then unknown.
pub struct Pop3Connection {
    settings: ServerSettings,
    options: ConnectionOptions,
    socket_factory: Arc<dyn TrustedSocketFactory>,
    stream: Option<LineStream>,
    capabilities: Capabilities,
    top_support: TopSupport,
}

impl Pop3Connection {
    pub fn new(
        settings: ServerSettings,
        options: ConnectionOptions,
        socket_factory: Arc<dyn TrustedSocketFactory>,
    ) -> Pop3Connection {
        Pop3Connection {
            settings,
            options,
            socket_factory,
            stream: None,
            capabilities: Capabilities::default(),
            top_support: TopSupport::Unknown,
        }
    }

    /// Connects, negotiates transport security and authenticates.
    pub fn open(&mut self) -> Result<()> {
        trace!("Initiate POP3 Connection to {}:{}", self.settings.host, self.settings.port);
        match self.establish() {
            Ok(()) => {
                trace!("Connection Established");
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(match *e.kind() {
                    ErrorKind::Io(_) => Error::with_chain(e, "Unable to open connection to POP server."),
                    ErrorKind::SslStack(_) => Error::with_chain(
                        e,
                        "Unable to open connection to POP server due to security error.",
                    ),
                    _ => e,
                })
            }
        }
    }

    fn establish(&mut self) -> Result<()> {
        let socket = self.connect()?;
        self.stream = Some(LineStream::new(socket));

        let greeting = self.send(None)?;

        self.probe_capabilities()?;

        if self.settings.connection_security == ConnectionSecurity::StartTlsRequired {
            self.perform_start_tls_upgrade()?;
        }

        self.perform_authentication(&greeting)
    }

    fn connect(&self) -> Result<Box<dyn MailSocket>> {
        let host = self.settings.host.as_str();
        let port = self.settings.port;

        let mut last_error = None;
        for address in (host, port).to_socket_addrs()? {
            debug!("Connecting to {} as {}", host, address);
            match TcpStream::connect_timeout(&address, self.options.connect_timeout()) {
                Ok(tcp_stream) => return self.secure(tcp_stream),
                Err(e) => {
                    warn!("Could not connect to {}: {}", address, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("Unknown host {}", host)))
            .into())
    }

    fn secure(&self, tcp_stream: TcpStream) -> Result<Box<dyn MailSocket>> {
        tcp_stream.set_read_timeout(Some(self.options.read_timeout()))?;
        let socket: Box<dyn MailSocket> = Box::new(tcp_stream);
        if self.settings.connection_security != ConnectionSecurity::SslTlsRequired {
            debug!("Creating a Plain TCP Connection");
            return Ok(socket);
        }

        debug!("Creating a SSL Connection");
        let socket = self.socket_factory.create_socket(
            socket,
            &self.settings.host,
            self.settings.port,
            self.settings.client_certificate_alias.as_deref(),
        )?;
        socket.set_read_timeout(Some(self.options.read_timeout()))?;
        Ok(socket)
    }

    /// Runs the two optional discovery commands, `AUTH` and `CAPA`.
    ///
    /// A negative reply to either only means the server does not implement
    /// it. Transport failures still propagate.
    fn probe_capabilities(&mut self) -> Result<()> {
        let mut capabilities = Capabilities::default();

        match self.send(Some(AUTH_COMMAND)) {
            Ok(_) => self.for_each_response_line(|line| capabilities.record_auth_mechanism(line))?,
            Err(ref e) if e.is_error_response() => debug!("Server does not list SASL mechanisms"),
            Err(e) => return Err(e),
        }

        match self.send(Some(CAPA_COMMAND)) {
            Ok(_) => {
                self.for_each_response_line(|line| capabilities.record_capa_line(line))?;
                if !capabilities.top {
                    debug!("CAPA did not advertise TOP; it will be probed on first use");
                }
            }
            Err(ref e) if e.is_error_response() => debug!("Server does not support CAPA"),
            Err(e) => return Err(e),
        }

        debug!("Capabilities: {:?}", capabilities);
        self.capabilities = capabilities;
        self.top_support = capabilities.top_support();
        Ok(())
    }

    fn perform_start_tls_upgrade(&mut self) -> Result<()> {
        if !self.capabilities.stls {
            bail!(ErrorKind::CertificateValidation(
                CertificateReason::StartTlsUnavailable,
                Vec::new()
            ));
        }

        self.send(Some(STLS_COMMAND))?;

        let plain = match self.stream.take() {
            Some(stream) => stream.into_socket(),
            None => {
                bail!("Unable to connect socket");
            }
        };
        let secure = self.socket_factory.create_socket(
            plain,
            &self.settings.host,
            self.settings.port,
            self.settings.client_certificate_alias.as_deref(),
        )?;
        secure.set_read_timeout(Some(self.options.read_timeout()))?;
        self.stream = Some(LineStream::new(secure));

        self.probe_capabilities()
    }

    fn perform_authentication(&mut self, greeting: &str) -> Result<()> {
        match self.settings.auth_type {
            AuthType::Plain => {
                if self.capabilities.auth_plain {
                    self.auth_plain()
                } else {
                    self.login()
                }
            }
            AuthType::CramMd5 => {
                if self.capabilities.cram_md5 {
                    self.auth_cram_md5()
                } else {
                    self.auth_apop(greeting)
                }
            }
            AuthType::External => {
                if self.capabilities.external {
                    self.auth_external()
                } else {
                    bail!(ErrorKind::CertificateValidation(
                        CertificateReason::MissingCapability(format!(
                            "{} {}",
                            SASL_CAPABILITY, AUTH_EXTERNAL_CAPABILITY
                        )),
                        Vec::new()
                    ))
                }
            }
        }
    }

    fn password(&self) -> String {
        self.settings.password.clone().unwrap_or_default()
    }

    fn login(&mut self) -> Result<()> {
        let username = self.settings.username.clone();
        self.send(Some(&format!("{} {}", USER_COMMAND, username)))
            .map_err(|e| authentication_failure(e, "POP3 login authentication failed"))?;
        let password = self.password();
        self.execute_sensitive_command(&format!("{} {}", PASS_COMMAND, password))
            .map_err(|e| authentication_failure(e, "POP3 login authentication failed"))?;
        Ok(())
    }

    fn auth_plain(&mut self) -> Result<()> {
        self.send(Some(&format!("{} {}", AUTH_COMMAND, AUTH_PLAIN_CAPABILITY)))?;
        let argument = utils::auth_plain_argument(&self.settings.username, &self.password());
        self.execute_sensitive_command(&argument)
            .map_err(|e| authentication_failure(e, "POP3 SASL auth PLAIN authentication failed"))?;
        Ok(())
    }

    fn auth_apop(&mut self, greeting: &str) -> Result<()> {
        let timestamp = match utils::apop_timestamp(greeting) {
            Some(timestamp) => timestamp,
            None => {
                bail!("APOP authentication is not supported");
            }
        };
        let digest = utils::get_apop_digest(timestamp, &self.password());
        let command = format!("{} {} {}", APOP_COMMAND, self.settings.username, digest);
        self.execute_sensitive_command(&command)
            .map_err(|e| authentication_failure(e, "POP3 APOP authentication failed"))?;
        Ok(())
    }

    fn auth_cram_md5(&mut self) -> Result<()> {
        let challenge = self.send(Some(&format!(
            "{} {}",
            AUTH_COMMAND, AUTH_CRAM_MD5_CAPABILITY
        )))?;
        let nonce = challenge.trim_start_matches('+').trim();
        let response = utils::cram_md5_response(&self.settings.username, &self.password(), nonce)?;
        self.execute_sensitive_command(&response)
            .map_err(|e| authentication_failure(e, "POP3 CRAM-MD5 authentication failed"))?;
        Ok(())
    }

    fn auth_external(&mut self) -> Result<()> {
        let command = format!(
            "{} {} {}",
            AUTH_COMMAND,
            AUTH_EXTERNAL_CAPABILITY,
            utils::auth_external_argument(&self.settings.username)
        );
        match self.send(Some(&command)) {
            Ok(_) => Ok(()),
            Err(e) => {
                let response = match *e.kind() {
                    ErrorKind::ErrorResponse(ref response) => response.clone(),
                    _ => return Err(e),
                };
                Err(Error::with_chain(
                    e,
                    ErrorKind::CertificateValidation(
                        CertificateReason::ClientCertificateRejected(response),
                        Vec::new(),
                    ),
                ))
            }
        }
    }

    fn stream(&mut self) -> Result<&mut LineStream> {
        match self.stream {
            Some(ref mut stream) => Ok(stream),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "POP3 connection is closed").into()),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.stream()?.write_string(line)?;
        Ok(())
    }

    fn read_raw_line(&mut self) -> Result<String> {
        let mut buff = Vec::new();
        if self.stream()?.read_until(b'\n', &mut buff)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "End of stream reached while trying to read line.",
            )
            .into());
        }
        buff.retain(|&b| b != b'\r' && b != b'\n');
        let line = String::from_utf8_lossy(&buff).into_owned();
        debug!("<<< {}", line);
        Ok(line)
    }

    /// Reads one reply line, without the line terminator.
    pub fn read_line(&mut self) -> Result<String> {
        let result = self.read_raw_line();
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Reads the lines of a multi-line reply up to the lone `.`.
    pub fn for_each_response_line<F>(&mut self, mut each: F) -> Result<()>
    where
        F: FnMut(&str),
    {
        loop {
            let line = self.read_line()?;
            if line == "." {
                return Ok(());
            }
            each(line.strip_prefix('.').unwrap_or(&line));
        }
    }

    /// Sends `command` (or nothing, to read the greeting) and reads the
    /// single-line reply. A reply not starting with `+` is an
    /// [`ErrorResponse`](ErrorKind::ErrorResponse).
    pub fn execute_simple_command(&mut self, command: Option<&str>) -> Result<String> {
        self.send(command).map_err(|e| {
            if e.is_error_response() {
                e
            } else {
                Error::with_chain(e, "Unable to execute POP3 command")
            }
        })
    }

    fn send(&mut self, command: Option<&str>) -> Result<String> {
        self.execute(command, false)
    }

    fn execute_sensitive_command(&mut self, command: &str) -> Result<String> {
        self.execute(Some(command), true)
    }

    fn execute(&mut self, command: Option<&str>, sensitive: bool) -> Result<String> {
        let response = match self.exchange(command, sensitive) {
            Ok(response) => response,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        if !response.starts_with('+') {
            bail!(ErrorKind::ErrorResponse(response));
        }
        Ok(response)
    }

    fn exchange(&mut self, command: Option<&str>, sensitive: bool) -> Result<String> {
        if let Some(command) = command {
            if sensitive && !self.options.log_sensitive {
                debug!(">>> [Command Hidden, Enable Sensitive Debug Logging To Show]");
            } else {
                debug!(">>> {}", command);
            }
            self.write_line(command)?;
        }
        self.read_raw_line()
    }

    /// A reader over the data of the RETR/TOP reply that was just accepted.
    pub fn response_body(&mut self) -> Result<ResponseReader<'_, BufReader<Box<dyn MailSocket>>>> {
        Ok(ResponseReader::new(self.stream()?.reader()))
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Releases the socket. Each step is attempted even if an earlier one
    /// fails; calling this again is harmless.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(Shutdown::Read) {
                debug!("Closing input failed: {}", e);
            }
            if let Err(e) = stream.shutdown(Shutdown::Write) {
                debug!("Closing output failed: {}", e);
            }
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Closing socket failed: {}", e);
            }
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn supports_uidl(&self) -> bool {
        self.capabilities.uidl
    }

    pub fn top_support(&self) -> TopSupport {
        self.top_support
    }

    /// Records the outcome of trying TOP. Only a connection that has not
    /// made up its mind yet changes state.
    pub fn set_top_support(&mut self, support: TopSupport) {
        if self.top_support == TopSupport::Unknown {
            self.top_support = support;
        }
    }
}

impl Drop for Pop3Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn authentication_failure(e: Error, message: &str) -> Error {
    let response = match *e.kind() {
        ErrorKind::ErrorResponse(ref response) => response.clone(),
        _ => return e,
    };
    Error::with_chain(e, ErrorKind::AuthenticationFailed(message.to_owned(), response))
}
