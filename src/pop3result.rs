use regex::Regex;

use crate::errors::*;

lazy_static! {
    static ref STAT_REGEX: Regex = Regex::new(r"^\+OK +(?P<nmsg>\d+)(?: +(?P<size>\d+))?").unwrap();
    // Some servers pad fields with more than one space
    static ref SPACES: Regex = Regex::new(r" +").unwrap();
}

fn fields(line: &str) -> Vec<&str> {
    SPACES.split(line.trim()).filter(|field| !field.is_empty()).collect()
}

/// Reply to `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pop3Stat {
    pub num_mails: u32,
    pub mbox_size: Option<u64>,
}

impl Pop3Stat {
    pub fn parse(stat_line: &str) -> Result<Pop3Stat> {
        let cap = STAT_REGEX
            .captures(stat_line)
            .ok_or_else(|| ErrorKind::MalformedResponse(stat_line.to_owned()))?;
        Ok(Pop3Stat {
            num_mails: cap["nmsg"].parse()?,
            mbox_size: match cap.name("size") {
                Some(size) => Some(size.as_str().parse()?),
                None => None,
            },
        })
    }
}

/// One `<msgnum> <uid>` pair from `UIDL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    pub msg_num: u32,
    pub uid: String,
}

impl UidlEntry {
    /// Parses a line of the multi-line `UIDL` listing.
    ///
    /// Tolerates servers that prefix every line with `+OK`. Lines without a
    /// UID, or with a non-numeric message number, yield `None`.
    pub fn parse_listing_line(line: &str) -> Option<UidlEntry> {
        let mut parts = fields(line);
        if parts.len() >= 3 && parts[0] == "+OK" {
            parts.remove(0);
        }
        if parts.len() < 2 {
            return None;
        }
        match parts[0].parse() {
            Ok(msg_num) => Some(UidlEntry {
                msg_num,
                uid: parts[1].to_owned(),
            }),
            Err(_) => {
                warn!("Ignoring UIDL line with invalid message number: {}", line);
                None
            }
        }
    }

    /// Parses the single-line reply `+OK <msgnum> <uid>` to `UIDL <n>`.
    pub fn parse_single(response: &str) -> Option<UidlEntry> {
        let parts = fields(response);
        if parts.len() < 3 || parts[0] != "+OK" {
            return None;
        }
        parts[1].parse().ok().map(|msg_num| UidlEntry {
            msg_num,
            uid: parts[2].to_owned(),
        })
    }
}

/// One `<msgnum> <size>` pair from `LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    pub msg_num: u32,
    pub size: i64,
}

impl ListEntry {
    pub fn parse_listing_line(line: &str) -> Option<ListEntry> {
        let parts = fields(line);
        if parts.len() < 2 {
            return None;
        }
        match (parts[0].parse(), parts[1].parse()) {
            (Ok(msg_num), Ok(size)) => Some(ListEntry { msg_num, size }),
            _ => {
                warn!("Ignoring malformed LIST line: {}", line);
                None
            }
        }
    }

    /// Parses the single-line reply `+OK <msgnum> <size>` to `LIST <n>`.
    pub fn parse_single(response: &str) -> Option<ListEntry> {
        let parts = fields(response);
        if parts.len() < 3 || parts[0] != "+OK" {
            return None;
        }
        match (parts[1].parse(), parts[2].parse()) {
            (Ok(msg_num), Ok(size)) => Some(ListEntry { msg_num, size }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_with_and_without_size() {
        assert_eq!(
            Pop3Stat::parse("+OK 2 320").unwrap(),
            Pop3Stat {
                num_mails: 2,
                mbox_size: Some(320)
            }
        );
        assert_eq!(Pop3Stat::parse("+OK 7").unwrap().num_mails, 7);
    }

    #[test]
    fn malformed_stat_is_an_error() {
        match *Pop3Stat::parse("+OK maildrop locked").unwrap_err().kind() {
            ErrorKind::MalformedResponse(_) => {}
            ref other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn uidl_line_with_spurious_ok_prefix_matches_plain_line() {
        assert_eq!(
            UidlEntry::parse_listing_line("+OK 3 whqtswO00WBw418f9t5JxYwZ"),
            UidlEntry::parse_listing_line("3 whqtswO00WBw418f9t5JxYwZ")
        );
    }

    #[test]
    fn uidl_line_with_multiple_spaces() {
        assert_eq!(
            UidlEntry::parse_listing_line("1   abc123"),
            UidlEntry::parse_listing_line("1 abc123")
        );
        assert_eq!(
            UidlEntry::parse_listing_line("1   abc123").unwrap(),
            UidlEntry {
                msg_num: 1,
                uid: "abc123".to_owned()
            }
        );
    }

    #[test]
    fn uidl_line_without_uid_is_skipped() {
        assert_eq!(UidlEntry::parse_listing_line("4"), None);
        assert_eq!(UidlEntry::parse_listing_line("x uid"), None);
    }

    #[test]
    fn single_uidl_reply() {
        assert_eq!(
            UidlEntry::parse_single("+OK 2  QhdPYR:00WBw1Ph7x7"),
            Some(UidlEntry {
                msg_num: 2,
                uid: "QhdPYR:00WBw1Ph7x7".to_owned()
            })
        );
        assert_eq!(UidlEntry::parse_single("-ERR no such message"), None);
    }

    #[test]
    fn list_lines() {
        assert_eq!(
            ListEntry::parse_listing_line("1 120"),
            Some(ListEntry { msg_num: 1, size: 120 })
        );
        assert_eq!(
            ListEntry::parse_single("+OK 2 200"),
            Some(ListEntry { msg_num: 2, size: 200 })
        );
        assert_eq!(ListEntry::parse_listing_line("garbage"), None);
    }
}
