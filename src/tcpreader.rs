use std::io::{self, BufRead, Read};

/// Reads the data part of a multi-line response (RETR, TOP).
///
/// Leading dots are unstuffed and reading stops at the lone `.` line, which
/// is consumed but not returned. The reader must be read to the end, or
/// [`drain`](ResponseReader::drain)ed, before the next command is sent.
pub struct ResponseReader<'a, R: BufRead + ?Sized> {
    inner: &'a mut R,
    line: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<'a, R: BufRead + ?Sized> ResponseReader<'a, R> {
    pub fn new(inner: &'a mut R) -> ResponseReader<'a, R> {
        ResponseReader {
            inner,
            line: Vec::new(),
            position: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Discards everything up to and including the terminator.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    fn fill_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        self.position = 0;
        if self.inner.read_until(b'\n', &mut self.line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "End of stream reached while reading multi-line response.",
            ));
        }
        if self.line == b".\r\n" || self.line == b".\n" || self.line == b"." {
            self.line.clear();
            self.finished = true;
            return Ok(false);
        }
        if self.line[0] == b'.' {
            self.position = 1;
        }
        Ok(true)
    }
}

impl<'a, R: BufRead + ?Sized> Read for ResponseReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.line.len() && (self.finished || !self.fill_line()?) {
            return Ok(0);
        }
        let available = &self.line[self.position..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.position += count;
        Ok(count)
    }
}
