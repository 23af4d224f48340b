use openssl::ssl::SslStream;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A connected byte stream the line protocol can run over.
///
/// Implemented for plain TCP sockets and for TLS streams wrapping another
/// `MailSocket`, which is what lets a STARTTLS upgrade wrap the socket it
/// already has.
pub trait MailSocket: Read + Write + Send {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()>;
}

impl MailSocket for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }
}

impl<S: MailSocket + ?Sized> MailSocket for Box<S> {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        (**self).shutdown(how)
    }
}

impl<S: MailSocket> MailSocket for SslStream<S> {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.get_ref().set_read_timeout(timeout)
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        if how != Shutdown::Read {
            SslStream::shutdown(self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        self.get_mut().shutdown(how)
    }
}

/// Buffered line-oriented access to a `MailSocket`.
pub struct LineStream {
    reader: BufReader<Box<dyn MailSocket>>,
}

impl LineStream {
    pub fn new(socket: Box<dyn MailSocket>) -> LineStream {
        LineStream {
            reader: BufReader::with_capacity(1024, socket),
        }
    }

    pub fn read_until(&mut self, byte: u8, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.reader.read_until(byte, buf)
    }

    /// Writes `line` followed by CRLF and flushes.
    pub fn write_string(&mut self, line: &str) -> io::Result<()> {
        let socket = self.reader.get_mut();
        socket.write_all(format!("{}\r\n", line).as_bytes())?;
        socket.flush()
    }

    pub fn reader(&mut self) -> &mut BufReader<Box<dyn MailSocket>> {
        &mut self.reader
    }

    pub fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        self.reader.get_mut().shutdown(how)
    }

    /// Gives the socket back, dropping whatever was buffered.
    pub fn into_socket(self) -> Box<dyn MailSocket> {
        self.reader.into_inner()
    }
}
