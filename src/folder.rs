use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::capabilities::TopSupport;
use crate::commands::*;
use crate::connection::Pop3Connection;
use crate::errors::*;
use crate::fetch::{FetchItem, FetchProfile, MessageRetrievalListener};
use crate::message::{BoundMessage, Flag, Pop3Message};
use crate::pop3result::{ListEntry, Pop3Stat, UidlEntry};
use crate::store::StoreContext;

/// Assumed average line length when turning a byte cap into a TOP line count.
const AVERAGE_LINE_LENGTH: i64 = 76;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
}

/// Message number and UID lookups for one session.
///
/// `index` is the only way entries get in, and it keeps the three maps in
/// step: every UID in `messages` has exactly one number in `msg_nums`, which
/// maps back to it in `uids`.
#[derive(Debug, Default)]
struct MessageIndex {
    messages: HashMap<String, Pop3Message>,
    uids: HashMap<u32, String>,
    msg_nums: HashMap<String, u32>,
}

impl MessageIndex {
    fn clear(&mut self) {
        self.messages.clear();
        self.uids.clear();
        self.msg_nums.clear();
    }

    fn index(&mut self, msg_num: u32, uid: &str) {
        trace!("Adding index for UID {} to msgNum {}", uid, msg_num);
        if let Some(previous_uid) = self.uids.insert(msg_num, uid.to_owned()) {
            if previous_uid != uid {
                self.messages.remove(&previous_uid);
                self.msg_nums.remove(&previous_uid);
            }
        }
        if let Some(previous_num) = self.msg_nums.insert(uid.to_owned(), msg_num) {
            if previous_num != msg_num {
                self.uids.remove(&previous_num);
            }
        }
        self.messages
            .entry(uid.to_owned())
            .or_insert_with(|| Pop3Message::new(uid));
    }

    /// Copies size and flags of `message` into the cached entry, if the UID
    /// is indexed. Bodies stay with the caller.
    fn remember(&mut self, message: &Pop3Message) {
        if let Some(cached) = self.messages.get_mut(message.uid()) {
            cached.set_size(message.size());
            cached.replace_flags(message.flags().clone());
        }
    }

    fn contains_msg_num(&self, msg_num: u32) -> bool {
        self.uids.contains_key(&msg_num)
    }

    fn contains_uid(&self, uid: &str) -> bool {
        self.msg_nums.contains_key(uid)
    }

    fn msg_num(&self, uid: &str) -> Option<u32> {
        self.msg_nums.get(uid).cloned()
    }

    fn message(&self, uid: &str) -> Option<&Pop3Message> {
        self.messages.get(uid)
    }

    fn message_mut(&mut self, uid: &str) -> Option<&mut Pop3Message> {
        self.messages.get_mut(uid)
    }

    fn message_by_num(&self, msg_num: u32) -> Option<&Pop3Message> {
        self.uids.get(&msg_num).and_then(|uid| self.messages.get(uid))
    }
}

/// The single mailbox of a POP3 account.
///
/// The message-number index is rebuilt from scratch on every `open`.
pub struct Pop3Folder {
    store: Arc<StoreContext>,
    name: String,
    index: MessageIndex,
    message_count: u32,
    connection: Option<Pop3Connection>,
}

impl Pop3Folder {
    pub(crate) fn new(store: Arc<StoreContext>, name: &str) -> Pop3Folder {
        Pop3Folder {
            store,
            name: name.to_owned(),
            index: MessageIndex::default(),
            message_count: 0,
            connection: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.name.eq_ignore_ascii_case(self.store.inbox_id())
    }

    /// Connects, authenticates and reads the message count with STAT.
    /// Does nothing if the folder is already open.
    pub fn open(&mut self, _mode: OpenMode) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        if !self.exists() {
            bail!(ErrorKind::FolderNotFound(self.name.clone()));
        }

        let mut connection = self.store.create_connection()?;
        let stat = connection
            .execute_simple_command(Some(STAT_COMMAND))
            .and_then(|response| Pop3Stat::parse(&response));
        let stat = match stat {
            Ok(stat) => stat,
            Err(e) => {
                connection.close();
                return Err(e);
            }
        };
        debug!("{} has {} messages", self.name, stat.num_mails);

        self.message_count = stat.num_mails;
        self.index.clear();
        self.connection = Some(connection);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.connection.as_ref().map_or(false, |connection| connection.is_open())
    }

    pub fn get_mode(&self) -> OpenMode {
        OpenMode::ReadWrite
    }

    /// Sends QUIT, which commits pending deletions, and drops the connection.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if connection.is_open() {
                if let Err(e) = connection.execute_simple_command(Some(QUIT_COMMAND)) {
                    debug!("QUIT failed: {}", e);
                }
            }
            connection.close();
        }
    }

    /// The count reported by STAT when the folder was opened.
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn unread_message_count(&self) -> i32 {
        -1
    }

    pub fn flagged_message_count(&self) -> i32 {
        -1
    }

    pub fn create(&self) -> bool {
        false
    }

    pub fn can_have_sub_folders(&self) -> bool {
        false
    }

    fn connection(&mut self) -> Result<&mut Pop3Connection> {
        if !self.is_open() {
            bail!("Folder {} is not open", self.name);
        }
        match self.connection {
            Some(ref mut connection) => Ok(connection),
            None => {
                bail!("Folder {} is not open", self.name);
            }
        }
    }

    /// The cached message for `uid`, or a fresh one the server has not been asked about.
    pub fn get_message(&self, uid: &str) -> Pop3Message {
        self.index
            .message(uid)
            .cloned()
            .unwrap_or_else(|| Pop3Message::new(uid))
    }

    /// Messages `start..=end` in message-number order. Numbers the server
    /// did not report are skipped.
    pub fn get_messages(
        &mut self,
        start: u32,
        end: u32,
        mut listener: Option<&mut dyn MessageRetrievalListener>,
    ) -> Result<Vec<Pop3Message>> {
        if start < 1 || end < start {
            bail!(ErrorKind::InvalidMessageSet(start, end));
        }
        self.index_msg_nums(start, end)?;

        let messages: Vec<Pop3Message> = (start..=end)
            .filter_map(|msg_num| self.index.message_by_num(msg_num).cloned())
            .collect();

        if let Some(listener) = listener.as_mut() {
            let total = messages.len();
            for (number, message) in messages.iter().enumerate() {
                listener.message_started(message.uid(), number, total);
                listener.message_finished(message, number, total);
            }
        }
        Ok(messages)
    }

    pub fn are_more_messages_available(&self, index_of_oldest_message: u32) -> bool {
        index_of_oldest_message > 1
    }

    fn uidl_listing(&mut self) -> Result<Vec<UidlEntry>> {
        let connection = self.connection()?;
        connection.execute_simple_command(Some(UIDL_COMMAND))?;
        let mut entries = Vec::new();
        connection.for_each_response_line(|line| entries.extend(UidlEntry::parse_listing_line(line)))?;
        Ok(entries)
    }

    fn list_listing(&mut self) -> Result<Vec<ListEntry>> {
        let connection = self.connection()?;
        connection.execute_simple_command(Some(LIST_COMMAND))?;
        let mut entries = Vec::new();
        connection.for_each_response_line(|line| entries.extend(ListEntry::parse_listing_line(line)))?;
        Ok(entries)
    }

    /// Makes sure every number in `start..=end` the server knows has a UID.
    fn index_msg_nums(&mut self, start: u32, end: u32) -> Result<()> {
        let pending = (start..=end)
            .filter(|&msg_num| !self.index.contains_msg_num(msg_num))
            .count();
        if pending == 0 {
            return Ok(());
        }

        if self.store.config.use_per_message_commands(pending, self.message_count) {
            for msg_num in start..=end {
                if self.index.contains_msg_num(msg_num) {
                    continue;
                }
                let response = self
                    .connection()?
                    .execute_simple_command(Some(&format!("{} {}", UIDL_COMMAND, msg_num)))?;
                match UidlEntry::parse_single(&response) {
                    Some(entry) => self.index.index(msg_num, &entry.uid),
                    None => {
                        error!("ERR response: {}", response);
                        return Ok(());
                    }
                }
            }
        } else {
            for entry in self.uidl_listing()? {
                if entry.msg_num >= start && entry.msg_num <= end && !self.index.contains_msg_num(entry.msg_num) {
                    self.index.index(entry.msg_num, &entry.uid);
                }
            }
        }
        Ok(())
    }

    /// Resolves message numbers for `uids`. POP3 cannot look a UID up
    /// directly, so anything missing costs a full UIDL listing.
    fn index_uids(&mut self, uids: &[String]) -> Result<()> {
        let pending: HashSet<&str> = uids
            .iter()
            .map(|uid| uid.as_str())
            .filter(|uid| !self.index.contains_uid(uid))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        debug!("Need to index {} UIDs", pending.len());

        for entry in self.uidl_listing()? {
            if pending.contains(entry.uid.as_str()) {
                self.index.index(entry.msg_num, &entry.uid);
            }
        }
        Ok(())
    }

    /// Downloads what `profile` asks for into `messages`.
    pub fn fetch(
        &mut self,
        messages: &mut [Pop3Message],
        profile: &FetchProfile,
        mut listener: Option<&mut dyn MessageRetrievalListener>,
    ) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let uids: Vec<String> = messages.iter().map(|message| message.uid().to_owned()).collect();
        self.index_uids(&uids)?;

        let total = messages.len();
        let envelope_only = profile.contains(FetchItem::Envelope) && profile.len() == 1;

        if profile.contains(FetchItem::Envelope) {
            let sized = self.fetch_envelope(messages)?;
            if envelope_only {
                if let Some(listener) = listener.as_mut() {
                    for number in sized {
                        let message = &messages[number];
                        listener.message_started(message.uid(), number, total);
                        listener.message_finished(message, number, total);
                    }
                }
            }
        }

        let max_download_size = self.store.config.maximum_auto_download_message_size;
        for (number, message) in messages.iter_mut().enumerate() {
            if !envelope_only {
                if let Some(listener) = listener.as_mut() {
                    listener.message_started(message.uid(), number, total);
                }
            }

            if profile.contains(FetchItem::Body) {
                self.fetch_body(message, None)?;
            } else if profile.contains(FetchItem::BodySane) {
                if max_download_size > 0 {
                    let lines = max_download_size / AVERAGE_LINE_LENGTH;
                    self.fetch_body(message, Some(lines.min(i64::from(u32::MAX)) as u32))?;
                } else {
                    self.fetch_body(message, None)?;
                }
            } else if profile.contains(FetchItem::Structure) {
                message.set_body(None);
            }
            self.index.remember(message);

            if !envelope_only {
                if let Some(listener) = listener.as_mut() {
                    listener.message_finished(message, number, total);
                }
            }
        }
        Ok(())
    }

    /// Fills in sizes from LIST. Returns the positions of the messages that
    /// were updated.
    fn fetch_envelope(&mut self, messages: &mut [Pop3Message]) -> Result<Vec<usize>> {
        let unsized_messages = messages.iter().filter(|message| message.size() == -1).count();
        if unsized_messages == 0 {
            return Ok(Vec::new());
        }

        let mut sized = Vec::new();
        if self
            .store
            .config
            .use_per_message_commands(unsized_messages, self.message_count)
        {
            for (number, message) in messages.iter_mut().enumerate() {
                if message.size() != -1 {
                    continue;
                }
                let msg_num = match self.index.msg_num(message.uid()) {
                    Some(msg_num) => msg_num,
                    None => {
                        warn!("No message number for UID {}", message.uid());
                        continue;
                    }
                };
                let response = self
                    .connection()?
                    .execute_simple_command(Some(&format!("{} {}", LIST_COMMAND, msg_num)))?;
                let entry = ListEntry::parse_single(&response)
                    .ok_or_else(|| ErrorKind::MalformedResponse(response.clone()))?;
                message.set_size(entry.size);
                self.index.remember(message);
                sized.push(number);
            }
        } else {
            let wanted: HashMap<u32, usize> = messages
                .iter()
                .enumerate()
                .filter_map(|(number, message)| self.index.msg_num(message.uid()).map(|msg_num| (msg_num, number)))
                .collect();
            for entry in self.list_listing()? {
                if let Some(&number) = wanted.get(&entry.msg_num) {
                    messages[number].set_size(entry.size);
                    self.index.remember(&messages[number]);
                    sized.push(number);
                }
            }
        }
        Ok(sized)
    }

    /// Downloads a message, at most `lines` body lines of it if TOP allows.
    fn fetch_body(&mut self, message: &mut Pop3Message, lines: Option<u32>) -> Result<()> {
        let msg_num = match self.index.msg_num(message.uid()) {
            Some(msg_num) => msg_num,
            None => {
                bail!(ErrorKind::UnknownMessage(message.uid().to_owned()));
            }
        };
        let parser = Arc::clone(&self.store.parser);
        let connection = self.connection()?;

        let mut retrieved = false;
        if let Some(lines) = lines {
            if connection.top_support() != TopSupport::Unsupported {
                if connection.top_support() == TopSupport::Unknown {
                    debug!("TOP was not advertised. Checking to see if it is supported nevertheless.");
                }
                match connection.execute_simple_command(Some(&format!("{} {} {}", TOP_COMMAND, msg_num, lines))) {
                    Ok(_) => {
                        connection.set_top_support(TopSupport::Supported);
                        retrieved = true;
                    }
                    Err(ref e) if e.is_error_response() && connection.top_support() == TopSupport::Unknown => {
                        debug!("The server really doesn't support the TOP command. Using RETR instead.");
                        connection.set_top_support(TopSupport::Unsupported);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        if !retrieved {
            connection.execute_simple_command(Some(&format!("{} {}", RETR_COMMAND, msg_num)))?;
        }
        let full = lines.is_none() || connection.top_support() == TopSupport::Unsupported;

        let (parsed, drained) = {
            let mut data = connection.response_body()?;
            let parsed = parser.parse(message, &mut data);
            (parsed, data.drain())
        };
        if let Err(e) = drained {
            connection.close();
            return Err(Error::with_chain(e, "Unable to execute POP3 command"));
        }

        match parsed {
            Ok(()) => {
                if full {
                    message.set_flag(Flag::XDownloadedPartial, false);
                    message.set_flag(Flag::XDownloadedFull, true);
                } else {
                    message.set_flag(Flag::XDownloadedPartial, true);
                }
                Ok(())
            }
            Err(e) => {
                if lines.is_none() {
                    return Err(e);
                }
                warn!("Ignoring parse failure of partially downloaded message {}: {}", message.uid(), e);
                Ok(())
            }
        }
    }

    /// Only setting [`Flag::Deleted`] has an effect: each message gets a
    /// DELE right away. Everything else is ignored.
    pub fn set_flags(&mut self, messages: &[Pop3Message], flags: &[Flag], value: bool) -> Result<()> {
        if !value || !flags.contains(&Flag::Deleted) {
            return Ok(());
        }
        self.open(OpenMode::ReadWrite)?;

        let uids: Vec<String> = messages.iter().map(|message| message.uid().to_owned()).collect();
        self.index_uids(&uids)?;

        for uid in &uids {
            let msg_num = match self.index.msg_num(uid) {
                Some(msg_num) => msg_num,
                None => {
                    bail!(ErrorKind::UnknownMessage(uid.clone()));
                }
            };
            self.open(OpenMode::ReadWrite)?;
            self.connection()?
                .execute_simple_command(Some(&format!("{} {}", DELE_COMMAND, msg_num)))?;
            if let Some(cached) = self.index.message_mut(uid) {
                cached.set_flag(Flag::Deleted, true);
            }
        }
        Ok(())
    }

    pub fn delete_messages(&mut self, messages: &[Pop3Message]) -> Result<()> {
        self.set_flags(messages, &[Flag::Deleted], true)
    }

    /// Changing flags without naming messages cannot be expressed in POP3.
    pub fn set_flags_all(&mut self, _flags: &[Flag], _value: bool) -> Result<()> {
        bail!(ErrorKind::UnsupportedOperation(
            "POP3 cannot set flags on all messages".to_owned()
        ))
    }

    pub fn is_flag_supported(&self, flag: Flag) -> bool {
        flag == Flag::Deleted
    }

    pub fn supports_fetching_flags(&self) -> bool {
        false
    }

    /// Fails unless the server can list UIDs. Issues UIDL when the
    /// capability was not advertised.
    pub fn request_uidl(&mut self) -> Result<()> {
        let connection = self.connection()?;
        if !connection.supports_uidl() {
            connection.execute_simple_command(Some(UIDL_COMMAND))?;
            connection.for_each_response_line(|_| {})?;
        }
        Ok(())
    }

    /// Pairs `message` with this folder so flag changes reach the server.
    pub fn bind<'a>(&'a mut self, message: &'a mut Pop3Message) -> BoundMessage<'a> {
        BoundMessage::new(self, message)
    }
}

impl PartialEq for Pop3Folder {
    fn eq(&self, other: &Pop3Folder) -> bool {
        self.name == other.name
    }
}
