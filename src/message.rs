use std::collections::BTreeSet;
use std::io::Read;

use crate::errors::*;
use crate::folder::Pop3Folder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Deleted,
    Seen,
    Answered,
    Flagged,
    Draft,
    Recent,
    /// The whole message has been downloaded.
    XDownloadedFull,
    /// Only a prefix of the message has been downloaded.
    XDownloadedPartial,
    /// The server cannot tell whether the message was read.
    XNoSeenInfo,
}

/// A message on the server, known by its UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pop3Message {
    uid: String,
    size: i64,
    flags: BTreeSet<Flag>,
    body: Option<Vec<u8>>,
}

impl Pop3Message {
    pub fn new(uid: &str) -> Pop3Message {
        let mut flags = BTreeSet::new();
        flags.insert(Flag::XNoSeenInfo);
        Pop3Message {
            uid: uid.to_owned(),
            size: -1,
            flags,
            body: None,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Size in octets, or -1 while unknown.
    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn set_size(&mut self, size: i64) {
        self.size = size;
    }

    pub fn flags(&self) -> &BTreeSet<Flag> {
        &self.flags
    }

    pub fn is_set(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    /// Updates the local flag set only; see [`BoundMessage`] for forwarding
    /// to the server.
    pub fn set_flag(&mut self, flag: Flag, set: bool) {
        if set {
            self.flags.insert(flag);
        } else {
            self.flags.remove(&flag);
        }
    }

    pub(crate) fn replace_flags(&mut self, flags: BTreeSet<Flag>) {
        self.flags = flags;
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_ref().map(|body| body.as_slice())
    }

    pub fn set_body(&mut self, body: Option<Vec<u8>>) {
        self.body = body;
    }
}

/// Interprets the data of a RETR or TOP reply.
pub trait MessageParser: Send + Sync {
    fn parse(&self, message: &mut Pop3Message, data: &mut dyn Read) -> Result<()>;
}

/// Keeps the downloaded octets as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawMessageParser;

impl MessageParser for RawMessageParser {
    fn parse(&self, message: &mut Pop3Message, data: &mut dyn Read) -> Result<()> {
        let mut body = Vec::new();
        data.read_to_end(&mut body)?;
        message.set_body(Some(body));
        Ok(())
    }
}

pub trait MutableFlags {
    fn set_flag(&mut self, flag: Flag, set: bool) -> Result<()>;
}

pub trait Deletable {
    fn delete(&mut self) -> Result<()>;
}

/// A message paired with the folder it came from, so that flag changes
/// reach the server.
pub struct BoundMessage<'a> {
    folder: &'a mut Pop3Folder,
    message: &'a mut Pop3Message,
}

impl<'a> BoundMessage<'a> {
    pub fn new(folder: &'a mut Pop3Folder, message: &'a mut Pop3Message) -> BoundMessage<'a> {
        BoundMessage { folder, message }
    }

    pub fn message(&self) -> &Pop3Message {
        self.message
    }
}

impl<'a> MutableFlags for BoundMessage<'a> {
    fn set_flag(&mut self, flag: Flag, set: bool) -> Result<()> {
        self.message.set_flag(flag, set);
        self.folder
            .set_flags(std::slice::from_ref(&*self.message), &[flag], set)
    }
}

impl<'a> Deletable for BoundMessage<'a> {
    fn delete(&mut self) -> Result<()> {
        self.set_flag(Flag::Deleted, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn new_message_has_unknown_size_and_no_seen_info() {
        let message = Pop3Message::new("uid1");
        assert_eq!(message.size(), -1);
        assert!(message.is_set(Flag::XNoSeenInfo));
        assert!(!message.is_set(Flag::Deleted));
        assert_eq!(message.body(), None);
    }

    #[test]
    fn raw_parser_keeps_bytes() {
        let mut message = Pop3Message::new("uid1");
        RawMessageParser
            .parse(&mut message, &mut Cursor::new(b"Subject: x\r\n\r\nhello\r\n".to_vec()))
            .unwrap();
        assert_eq!(message.body(), Some(&b"Subject: x\r\n\r\nhello\r\n"[..]));
    }

    #[test]
    fn local_flag_changes() {
        let mut message = Pop3Message::new("uid1");
        message.set_flag(Flag::Seen, true);
        assert!(message.is_set(Flag::Seen));
        message.set_flag(Flag::Seen, false);
        assert!(!message.is_set(Flag::Seen));
    }
}
