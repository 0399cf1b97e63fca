//! The change bus: patches, selection changes and unsets, in order.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use super::EditorSelection;
use crate::models::Block;
use crate::patch::Patch;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorChange {
    Patch {
        patch: Patch,
    },
    Selection {
        selection: Option<EditorSelection>,
        /// Set when the editor moved the selection itself after remote changes
        adjusted: bool,
    },
    /// The document became empty; the value it had right before
    Unset {
        #[serde(rename = "previousValue")]
        previous_value: Vec<Block>,
    },
}

/// A change together with its position in the stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencedChange {
    pub seq: u64,
    #[serde(flatten)]
    pub change: EditorChange,
}

/// Identifies a subscriber, for unsubscribing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Subscriber = Box<dyn FnMut(&SequencedChange)>;

/// Synchronous, ordered delivery of editor changes.
///
/// Subscribers are called in the order they subscribed, within the call that
/// caused the change. The last `capacity` changes are retained so a late
/// subscriber can catch up.
pub struct ChangeBus {
    next_seq: u64,
    retained: VecDeque<SequencedChange>,
    capacity: usize,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("next_seq", &self.next_seq)
            .field("retained", &self.retained.len())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            retained: VecDeque::new(),
            capacity,
            subscribers: Vec::new(),
        }
    }

    pub fn emit(&mut self, change: EditorChange) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let sequenced = SequencedChange { seq, change };

        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&sequenced);
        }

        if self.capacity > 0 {
            if self.retained.len() == self.capacity {
                self.retained.pop_front();
            }
            self.retained.push_back(sequenced);
        }
        seq
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&SequencedChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Subscribe and immediately receive every retained change
    pub fn subscribe_with_replay(
        &mut self,
        mut subscriber: impl FnMut(&SequencedChange) + 'static,
    ) -> SubscriptionId {
        for change in &self.retained {
            subscriber(change);
        }
        self.subscribe(subscriber)
    }

    /// Returns false when `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub fn retained(&self) -> impl Iterator<Item = &SequencedChange> {
        self.retained.iter()
    }

    /// Sequence number the next change will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}
