//! Shared broker state
//!
//! Fixed-size tables allocated once from `BrokerSettings`:
//! - the client table (slot reuse is the only deletion),
//! - the circular message log (entry with sequence `s` lives in slot
//!   `(s - 1) % capacity`, so a wrap overwrites the oldest entries),
//! - the retained table (one slot per topic, last write wins).
//!
//! Callers must hold the broker lock for every access.

use uuid::Uuid;

use crate::broker::message::{Message, QoS};
use crate::broker::notify::WakeSignal;
use crate::broker::topic::topic_matches;
use crate::config::BrokerSettings;
use crate::utils::{MqttError, Result};

/// Identifies one connected session of a client in the client table.
///
/// A handle goes stale when the client disconnects or when another session
/// connects with the same client id; stale handles get `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub(crate) slot: usize,
    pub(crate) session: Uuid,
    pub(crate) client_id: String,
    pub(crate) connected_at_sequence: u64,
}

impl SessionHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Broker sequence counter at connect time; the initial cursor.
    pub fn connected_at_sequence(&self) -> u64 {
        self.connected_at_sequence
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientRecord {
    pub connected: bool,
    pub client_id: String,
    pub session: Option<Uuid>,
    pub waker: Option<WakeSignal>,
    pub last_seen_ms: i64,
    /// Mirror of the client's local filters, used only to route wake-ups.
    pub filters: Vec<String>,
    pub last_processed_sequence: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LogEntry {
    pub valid: bool,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
    pub timestamp_ms: i64,
    pub sequence: u64,
}

impl LogEntry {
    pub fn to_message(&self) -> Message {
        Message {
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            qos: self.qos,
            retained: self.retained,
            timestamp_ms: self.timestamp_ms,
            sequence: self.sequence,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetainedEntry {
    pub valid: bool,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub timestamp_ms: i64,
    /// Sequence of the publish that last updated this topic.
    pub sequence: u64,
}

impl RetainedEntry {
    pub fn to_message(&self) -> Message {
        Message {
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            qos: self.qos,
            retained: true,
            timestamp_ms: self.timestamp_ms,
            sequence: self.sequence,
        }
    }
}

#[derive(Debug)]
pub struct BrokerState {
    /// Last assigned sequence number; 0 before the first publish.
    pub sequence_counter: u64,
    pub clients: Vec<ClientRecord>,
    pub log: Vec<LogEntry>,
    pub retained: Vec<RetainedEntry>,
}

impl BrokerState {
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            sequence_counter: 0,
            clients: vec![ClientRecord::default(); settings.max_clients],
            log: vec![LogEntry::default(); settings.log_capacity],
            retained: vec![RetainedEntry::default(); settings.retained_capacity],
        }
    }

    fn slot_of(&self, sequence: u64) -> usize {
        ((sequence - 1) % self.log.len() as u64) as usize
    }

    /// Slot the next publish will write.
    pub fn log_head(&self) -> usize {
        (self.sequence_counter % self.log.len() as u64) as usize
    }

    /// Oldest sequence that can still be in the log.
    pub fn oldest_available_sequence(&self) -> u64 {
        let window = self.log.len() as u64;
        if self.sequence_counter <= window {
            1
        } else {
            self.sequence_counter - window + 1
        }
    }

    pub fn connected_count(&self) -> usize {
        self.clients.iter().filter(|r| r.connected).count()
    }

    /// Slot already owned by `client_id` (connected or not), else the first
    /// free one.
    pub fn find_client_slot(&self, client_id: &str) -> Option<usize> {
        self.clients
            .iter()
            .position(|r| r.client_id == client_id)
            .or_else(|| self.clients.iter().position(|r| !r.connected))
    }

    pub fn record(&self, handle: &SessionHandle) -> Result<&ClientRecord> {
        self.clients
            .get(handle.slot)
            .filter(|r| r.connected && r.session == Some(handle.session))
            .ok_or(MqttError::Disconnected)
    }

    pub fn record_mut(&mut self, handle: &SessionHandle) -> Result<&mut ClientRecord> {
        self.clients
            .get_mut(handle.slot)
            .filter(|r| r.connected && r.session == Some(handle.session))
            .ok_or(MqttError::Disconnected)
    }

    /// Write a new log entry at the next slot and return its sequence.
    pub fn append(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
        timestamp_ms: i64,
    ) -> u64 {
        self.sequence_counter += 1;
        let sequence = self.sequence_counter;
        let slot = self.slot_of(sequence);

        let entry = &mut self.log[slot];
        entry.valid = true;
        entry.topic.clear();
        entry.topic.push_str(topic);
        entry.payload.clear();
        entry.payload.extend_from_slice(payload);
        entry.qos = qos;
        entry.retained = retained;
        entry.timestamp_ms = timestamp_ms;
        entry.sequence = sequence;
        sequence
    }

    /// Entry about to be overwritten by the next publish, if any.
    pub fn entry_at_head(&self) -> Option<&LogEntry> {
        let entry = &self.log[self.log_head()];
        entry.valid.then_some(entry)
    }

    /// Entry for `sequence`, unless it was never written or already overwritten.
    pub fn entry(&self, sequence: u64) -> Option<&LogEntry> {
        if sequence == 0 || sequence > self.sequence_counter {
            return None;
        }
        let entry = &self.log[self.slot_of(sequence)];
        (entry.valid && entry.sequence == sequence).then_some(entry)
    }

    /// Connected clients that subscribe to `entry` but have not read it yet.
    pub fn unread_by(&self, entry: &LogEntry) -> usize {
        self.clients
            .iter()
            .filter(|r| r.connected && r.last_processed_sequence < entry.sequence)
            .filter(|r| r.filters.iter().any(|f| topic_matches(&entry.topic, f)))
            .count()
    }

    /// Slot holding `topic`, else the first free slot.
    pub fn retained_slot_for(&self, topic: &str) -> Option<usize> {
        self.retained
            .iter()
            .position(|r| r.valid && r.topic == topic)
            .or_else(|| self.retained.iter().position(|r| !r.valid))
    }

    pub fn store_retained(
        &mut self,
        slot: usize,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        timestamp_ms: i64,
        sequence: u64,
    ) {
        let entry = &mut self.retained[slot];
        entry.valid = true;
        entry.topic.clear();
        entry.topic.push_str(topic);
        entry.payload.clear();
        entry.payload.extend_from_slice(payload);
        entry.qos = qos;
        entry.timestamp_ms = timestamp_ms;
        entry.sequence = sequence;
    }

    pub fn retained_count(&self) -> usize {
        self.retained.iter().filter(|r| r.valid).count()
    }

    /// Retained messages whose topic matches `filter`, in slot order.
    pub fn matching_retained(&self, filter: &str) -> Vec<Message> {
        self.retained
            .iter()
            .filter(|r| r.valid && topic_matches(&r.topic, filter))
            .map(RetainedEntry::to_message)
            .collect()
    }
}
