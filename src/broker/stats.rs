//! Operator diagnostics: a point-in-time snapshot of the shared state.

use std::fmt;

use serde::Serialize;

use crate::broker::state::BrokerState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub slot: usize,
    pub client_id: String,
    pub subscriptions: usize,
    pub last_processed_sequence: u64,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub name: String,
    pub sequence_counter: u64,
    pub log_head: usize,
    pub log_capacity: usize,
    pub oldest_available_sequence: u64,
    pub connected_clients: usize,
    pub max_clients: usize,
    pub clients: Vec<ClientStats>,
    pub retained_count: usize,
    pub retained_capacity: usize,
}

impl BrokerStats {
    pub(crate) fn capture(name: &str, state: &BrokerState) -> Self {
        let clients = state
            .clients
            .iter()
            .enumerate()
            .filter(|(_, r)| r.connected)
            .map(|(slot, r)| ClientStats {
                slot,
                client_id: r.client_id.clone(),
                subscriptions: r.filters.len(),
                last_processed_sequence: r.last_processed_sequence,
                last_seen_ms: r.last_seen_ms,
            })
            .collect::<Vec<_>>();

        Self {
            name: name.to_string(),
            sequence_counter: state.sequence_counter,
            log_head: state.log_head(),
            log_capacity: state.log.len(),
            oldest_available_sequence: state.oldest_available_sequence(),
            connected_clients: clients.len(),
            max_clients: state.clients.len(),
            clients,
            retained_count: state.retained_count(),
            retained_capacity: state.retained.len(),
        }
    }
}

impl fmt::Display for BrokerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Broker '{}' statistics ===", self.name)?;
        writeln!(f, "Sequence counter: {}", self.sequence_counter)?;
        writeln!(
            f,
            "Message log: head {} of {} (oldest available seq {})",
            self.log_head, self.log_capacity, self.oldest_available_sequence
        )?;
        writeln!(
            f,
            "Connected clients: {}/{}",
            self.connected_clients, self.max_clients
        )?;
        for client in &self.clients {
            writeln!(
                f,
                "  [{}] '{}' (subs={}, last_seq={})",
                client.slot, client.client_id, client.subscriptions, client.last_processed_sequence
            )?;
        }
        write!(
            f,
            "Retained messages: {}/{}",
            self.retained_count, self.retained_capacity
        )
    }
}
