#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Write};
use std::mem;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pop3_store::{
    AuthType, CertificateReason, ConnectionSecurity, ErrorKind, MailSocket, ServerSettings, TrustedSocketFactory,
};

const TIMEOUT: Duration = Duration::from_secs(5);

pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "password";
pub const AUTH_PLAIN_ARGUMENT: &str = "AHVzZXIAcGFzc3dvcmQ=";

enum Action {
    Output(String),
    Expect(String),
    CloseConnection,
}

/// A POP3 server that plays back a fixed script to a single client.
///
/// After the script the client must hang up without sending anything else.
pub struct MockPop3Server {
    actions: Vec<Action>,
    port: u16,
    handle: Option<JoinHandle<Result<(), String>>>,
}

impl MockPop3Server {
    pub fn new() -> MockPop3Server {
        MockPop3Server {
            actions: Vec::new(),
            port: 0,
            handle: None,
        }
    }

    pub fn output(&mut self, line: &str) {
        self.actions.push(Action::Output(line.to_owned()));
    }

    pub fn expect(&mut self, line: &str) {
        self.actions.push(Action::Expect(line.to_owned()));
    }

    pub fn close_connection(&mut self) {
        self.actions.push(Action::CloseConnection);
    }

    pub fn start(&mut self) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        self.port = listener.local_addr().expect("local address").port();
        let actions = mem::replace(&mut self.actions, Vec::new());
        self.handle = Some(thread::spawn(move || serve(&listener, actions)));
    }

    pub fn host(&self) -> &str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn verify_interaction_completed(&mut self) {
        let handle = self.handle.take().expect("mock server was not started");
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => panic!("{}", e),
            Err(_) => panic!("mock server thread panicked"),
        }
    }
}

fn accept(listener: &TcpListener) -> Result<TcpStream, String> {
    listener.set_nonblocking(true).map_err(|e| e.to_string())?;
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).map_err(|e| e.to_string())?;
                stream.set_read_timeout(Some(TIMEOUT)).map_err(|e| e.to_string())?;
                return Ok(stream);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() > deadline {
                    return Err("client never connected".to_owned());
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Result<Option<String>, String> {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(line.trim_end_matches(|c| c == '\r' || c == '\n').to_owned())),
        Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(None),
        Err(e) => Err(format!("reading from client: {}", e)),
    }
}

fn serve(listener: &TcpListener, actions: Vec<Action>) -> Result<(), String> {
    let stream = accept(listener)?;
    let mut writer = stream.try_clone().map_err(|e| e.to_string())?;
    let mut reader = BufReader::new(stream);

    for action in actions {
        match action {
            Action::Output(line) => writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .map_err(|e| format!("writing {:?}: {}", line, e))?,
            Action::Expect(expected) => match read_line(&mut reader)? {
                Some(ref actual) if *actual == expected => {}
                Some(actual) => return Err(format!("expected {:?}, got {:?}", expected, actual)),
                None => return Err(format!("expected {:?}, but the client hung up", expected)),
            },
            Action::CloseConnection => {
                let _ = writer.shutdown(Shutdown::Both);
                return Ok(());
            }
        }
    }

    match read_line(&mut reader)? {
        None => Ok(()),
        Some(extra) => Err(format!("unexpected command {:?}", extra)),
    }
}

pub fn settings(server: &MockPop3Server, auth_type: AuthType, security: ConnectionSecurity) -> ServerSettings {
    ServerSettings {
        host: server.host().to_owned(),
        port: server.port(),
        connection_security: security,
        auth_type,
        username: USERNAME.to_owned(),
        password: Some(PASSWORD.to_owned()),
        client_certificate_alias: None,
    }
}

/// Greeting, a rejected `AUTH` probe and a `CAPA` listing with one SASL line.
pub fn setup_server_with_authentication_methods(server: &mut MockPop3Server, methods: &str) {
    server.output("+OK POP3 server greeting");
    server.expect("AUTH");
    server.output("-ERR Unknown command");
    server.expect("CAPA");
    server.output("+OK Listing of supported mechanisms follows");
    server.output(&format!("SASL {}", methods));
    server.output(".");
}

pub fn setup_server_with_start_tls_available(server: &mut MockPop3Server) {
    server.output("+OK POP3 server greeting");
    server.expect("AUTH");
    server.output("-ERR Unknown command");
    server.expect("CAPA");
    server.output("+OK Listing of supported mechanisms follows");
    server.output("STLS");
    server.output("SASL PLAIN");
    server.output(".");
}

/// Greeting, probes advertising `capabilities`, and a USER/PASS login.
pub fn setup_login(server: &mut MockPop3Server, capabilities: &[&str]) {
    server.output("+OK POP3 server ready");
    server.expect("AUTH");
    server.output("-ERR Unknown command");
    server.expect("CAPA");
    server.output("+OK Capability list follows");
    for capability in capabilities {
        server.output(capability);
    }
    server.output(".");
    server.expect("USER user");
    server.output("+OK");
    server.expect("PASS password");
    server.output("+OK Logged in");
}

/// Hands the socket back untouched, counting how often it was asked to.
#[derive(Default)]
pub struct PassthroughSocketFactory {
    calls: AtomicUsize,
}

impl PassthroughSocketFactory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrustedSocketFactory for PassthroughSocketFactory {
    fn create_socket(
        &self,
        socket: Box<dyn MailSocket>,
        _host: &str,
        _port: u16,
        _client_certificate_alias: Option<&str>,
    ) -> pop3_store::Result<Box<dyn MailSocket>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(socket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    UntrustedCertificate,
    Io,
}

pub struct FailingSocketFactory {
    failure: Failure,
    calls: AtomicUsize,
}

impl FailingSocketFactory {
    pub fn new(failure: Failure) -> FailingSocketFactory {
        FailingSocketFactory {
            failure,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrustedSocketFactory for FailingSocketFactory {
    fn create_socket(
        &self,
        _socket: Box<dyn MailSocket>,
        _host: &str,
        _port: u16,
        _client_certificate_alias: Option<&str>,
    ) -> pop3_store::Result<Box<dyn MailSocket>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Failure::UntrustedCertificate => Err(ErrorKind::CertificateValidation(
                CertificateReason::Untrusted("self signed certificate".to_owned()),
                Vec::new(),
            )
            .into()),
            Failure::Io => Err(io::Error::new(io::ErrorKind::ConnectionAborted, "handshake failed").into()),
        }
    }
}
