//! Broker engine
//!
//! This module contains the shared broker responsible for:
//! - registering client sessions in a fixed client table
//! - appending published messages to the circular log and tracking retained
//!   messages
//! - waking subscribers whose filters match a new message
//! - serving log reads and cursor updates to the per-client event loops
//!
//! Concurrency and usage notes:
//! - One `std::sync::Mutex` guards the whole state. Every critical section
//!   is a bounded table scan and never calls user code, so callbacks can
//!   block without stalling other clients.
//! - The broker is shared as `Arc<Broker>`; its lifetime is that of the last
//!   `Arc`, or of the `BrokerRegistry` entry it was attached through.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::message::{Message, QoS};
use crate::broker::notify::{WakeSignal, notify_subscribers};
use crate::broker::state::{BrokerState, SessionHandle};
use crate::broker::stats::BrokerStats;
use crate::broker::topic::validate_topic_with_limit;
use crate::config::BrokerSettings;
use crate::utils::{MqttError, Result, timestamp_ms};

#[derive(Debug)]
pub struct Broker {
    settings: BrokerSettings,
    state: Mutex<BrokerState>,
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Result<Self> {
        settings.validate()?;
        let state = BrokerState::new(&settings);
        info!(
            name = %settings.name,
            clients = settings.max_clients,
            log = settings.log_capacity,
            retained = settings.retained_capacity,
            "created broker"
        );
        Ok(Self {
            settings,
            state: Mutex::new(state),
        })
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub(crate) fn lock_state(&self) -> Result<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| MqttError::Internal("broker state lock poisoned".to_string()))
    }

    /// Validate a publish topic or a subscription filter with this broker's
    /// length limit.
    pub fn validate_topic(&self, topic: &str, allow_wildcards: bool) -> bool {
        validate_topic_with_limit(topic, allow_wildcards, self.settings.max_topic_length)
    }

    /// Register `client_id` and return its session handle.
    ///
    /// Reuses the slot already owned by the same id (taking over a live
    /// session if there is one) or the first free slot. The cursor starts at
    /// the current sequence counter, so earlier messages are never replayed.
    pub fn connect(&self, client_id: &str, waker: WakeSignal) -> Result<SessionHandle> {
        if client_id.is_empty() || client_id.len() > self.settings.max_client_id_length {
            return Err(MqttError::InvalidParameter(format!(
                "client id must be 1..={} bytes",
                self.settings.max_client_id_length
            )));
        }

        let mut state = self.lock_state()?;
        let slot = state
            .find_client_slot(client_id)
            .ok_or(MqttError::NoAvailableSlots {
                max: self.settings.max_clients,
            })?;

        let cursor = state.sequence_counter;
        let session = Uuid::new_v4();
        let record = &mut state.clients[slot];
        let takeover = record.connected;
        if takeover {
            // Let the previous owner notice on its next poll.
            if let Some(previous) = record.waker.take() {
                previous.wake();
            }
        }
        record.connected = true;
        record.client_id.clear();
        record.client_id.push_str(client_id);
        record.session = Some(session);
        record.waker = Some(waker);
        record.last_seen_ms = timestamp_ms();
        record.filters.clear();
        record.last_processed_sequence = cursor;
        drop(state);

        if takeover {
            warn!(client_id, slot, "took over existing session");
        } else {
            info!(client_id, slot, cursor, "client connected");
        }

        Ok(SessionHandle {
            slot,
            session,
            client_id: client_id.to_string(),
            connected_at_sequence: cursor,
        })
    }

    /// Mark the session's slot disconnected and clear its filters.
    ///
    /// Idempotent: a handle that no longer owns its slot is ignored.
    pub fn disconnect(&self, handle: &SessionHandle) -> Result<()> {
        let mut state = self.lock_state()?;
        if let Ok(record) = state.record_mut(handle) {
            record.connected = false;
            record.session = None;
            record.waker = None;
            record.filters.clear();
            record.last_seen_ms = timestamp_ms();
            info!(client_id = %handle.client_id, slot = handle.slot, "client disconnected");
        }
        Ok(())
    }

    /// True while `handle` still owns its slot.
    pub fn is_session_current(&self, handle: &SessionHandle) -> bool {
        self.lock_state()
            .map(|state| state.record(handle).is_ok())
            .unwrap_or(false)
    }

    pub fn connected_clients(&self) -> Result<usize> {
        Ok(self.lock_state()?.connected_count())
    }

    pub fn current_sequence(&self) -> Result<u64> {
        Ok(self.lock_state()?.sequence_counter)
    }

    /// Append a message to the log, update the retained table if asked, and
    /// wake matching subscribers. Returns the assigned sequence number.
    ///
    /// Either everything commits under the lock or nothing does: a full
    /// retained table rejects the publish before the log is touched.
    pub fn publish(
        &self,
        handle: &SessionHandle,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<u64> {
        if !self.validate_topic(topic, false) {
            return Err(MqttError::TopicInvalid(topic.to_string()));
        }
        if payload.len() > self.settings.max_payload_size {
            return Err(MqttError::PayloadTooLarge {
                size: payload.len(),
                max: self.settings.max_payload_size,
            });
        }

        let now = timestamp_ms();
        let mut state = self.lock_state()?;
        state.record_mut(handle)?.last_seen_ms = now;

        let retained_slot = if retained {
            let slot = state.retained_slot_for(topic).ok_or_else(|| {
                MqttError::PublishFailed(format!(
                    "retained table full ({} topics)",
                    self.settings.retained_capacity
                ))
            })?;
            Some(slot)
        } else {
            None
        };

        if let Some(evicted) = state.entry_at_head() {
            let unread = state.unread_by(evicted);
            if unread > 0 {
                warn!(
                    sequence = evicted.sequence,
                    topic = %evicted.topic,
                    unread,
                    "overwriting log entry not yet read by all subscribers"
                );
            }
        }

        let sequence = state.append(topic, payload, qos, retained, now);
        if let Some(slot) = retained_slot {
            state.store_retained(slot, topic, payload, qos, now, sequence);
        }
        let woken = notify_subscribers(&state, topic);
        drop(state);

        debug!(
            client_id = %handle.client_id,
            topic,
            bytes = payload.len(),
            sequence,
            retained,
            woken,
            "published"
        );
        Ok(sequence)
    }

    /// Mirror `filter` into the session's client record and return the
    /// retained messages it matches, for replay outside the lock.
    pub fn register_filter(&self, handle: &SessionHandle, filter: &str) -> Result<Vec<Message>> {
        if !self.validate_topic(filter, true) {
            return Err(MqttError::TopicInvalid(filter.to_string()));
        }

        let mut state = self.lock_state()?;
        let record = state.record_mut(handle)?;
        if !record.filters.iter().any(|f| f == filter) {
            if record.filters.len() >= self.settings.max_subscriptions {
                return Err(MqttError::SubscribeFailed(format!(
                    "subscription table full ({} filters)",
                    self.settings.max_subscriptions
                )));
            }
            record.filters.push(filter.to_string());
        }
        record.last_seen_ms = timestamp_ms();

        let replay = state.matching_retained(filter);
        drop(state);

        debug!(client_id = %handle.client_id, filter, retained = replay.len(), "filter registered");
        Ok(replay)
    }

    /// Remove `filter` from the session's mirror. Unknown filters are ignored.
    pub fn remove_filter(&self, handle: &SessionHandle, filter: &str) -> Result<()> {
        let mut state = self.lock_state()?;
        let record = state.record_mut(handle)?;
        if let Some(pos) = record.filters.iter().position(|f| f == filter) {
            record.filters.swap_remove(pos);
            debug!(client_id = %handle.client_id, filter, "filter removed");
        }
        record.last_seen_ms = timestamp_ms();
        Ok(())
    }

    /// Start a scan: returns the first sequence to read and the snapshot of
    /// the sequence counter the scan stops at. The range is empty when
    /// `first > last`.
    pub fn begin_scan(&self, handle: &SessionHandle) -> Result<(u64, u64)> {
        let state = self.lock_state()?;
        let cursor = state.record(handle)?.last_processed_sequence;
        let snapshot = state.sequence_counter;
        let first = (cursor + 1).max(state.oldest_available_sequence());
        if first > cursor + 1 && first <= snapshot {
            warn!(
                client_id = %handle.client_id,
                lost = first - cursor - 1,
                "log wrapped past cursor, skipping overwritten entries"
            );
        }
        Ok((first, snapshot))
    }

    /// Copy of the log entry for `sequence`, or `None` if it was overwritten.
    pub fn read_entry(&self, handle: &SessionHandle, sequence: u64) -> Result<Option<Message>> {
        let state = self.lock_state()?;
        state.record(handle)?;
        Ok(state.entry(sequence).map(|entry| entry.to_message()))
    }

    /// Advance the session's cursor after a scan.
    pub fn commit_cursor(&self, handle: &SessionHandle, sequence: u64) -> Result<()> {
        let mut state = self.lock_state()?;
        let record = state.record_mut(handle)?;
        if sequence > record.last_processed_sequence {
            record.last_processed_sequence = sequence;
        }
        record.last_seen_ms = timestamp_ms();
        Ok(())
    }

    pub fn stats(&self) -> Result<BrokerStats> {
        let state = self.lock_state()?;
        Ok(BrokerStats::capture(&self.settings.name, &state))
    }
}
