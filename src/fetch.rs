use std::collections::BTreeSet;
use std::iter::FromIterator;

use crate::message::Pop3Message;

/// A category of content a caller wants for a batch of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FetchItem {
    /// Message size, from `LIST`.
    Envelope,
    /// The complete message, from `RETR`.
    Body,
    /// A size-capped prefix of the message, from `TOP` where possible.
    BodySane,
    /// Always leaves the body empty; POP3 has no structure-only fetch.
    Structure,
}

/// The set of [`FetchItem`]s requested for one `fetch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchProfile {
    items: BTreeSet<FetchItem>,
}

impl FetchProfile {
    pub fn new() -> FetchProfile {
        FetchProfile::default()
    }

    pub fn with(mut self, item: FetchItem) -> FetchProfile {
        self.add(item);
        self
    }

    pub fn add(&mut self, item: FetchItem) {
        self.items.insert(item);
    }

    pub fn contains(&self, item: FetchItem) -> bool {
        self.items.contains(&item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FetchItem> + '_ {
        self.items.iter().cloned()
    }
}

impl FromIterator<FetchItem> for FetchProfile {
    fn from_iter<I: IntoIterator<Item = FetchItem>>(iter: I) -> FetchProfile {
        FetchProfile {
            items: iter.into_iter().collect(),
        }
    }
}

/// Progress callbacks for `get_messages` and `fetch`.
///
/// `number` counts from zero within the batch; `total` is the batch size.
pub trait MessageRetrievalListener {
    fn message_started(&mut self, uid: &str, number: usize, total: usize);

    fn message_finished(&mut self, message: &Pop3Message, number: usize, total: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_a_set() {
        let profile = FetchProfile::new()
            .with(FetchItem::Envelope)
            .with(FetchItem::BodySane)
            .with(FetchItem::Envelope);
        assert_eq!(profile.len(), 2);
        assert!(profile.contains(FetchItem::BodySane));
        assert!(!profile.contains(FetchItem::Body));
        assert_eq!(
            profile.iter().collect::<Vec<_>>(),
            vec![FetchItem::Envelope, FetchItem::BodySane]
        );
    }

    #[test]
    fn collect_into_profile() {
        let profile: FetchProfile = vec![FetchItem::Body, FetchItem::Structure].into_iter().collect();
        assert!(profile.contains(FetchItem::Structure));
        assert!(!profile.is_empty());
    }
}
