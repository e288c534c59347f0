//! Client sessions
//!
//! A `Client` is one participant of the shared broker. It owns its local
//! subscription list (filter, QoS, callback) and its cursor into the message
//! log; only the filter strings are mirrored into the broker so publishers
//! know whom to wake. A client is driven by one task: callbacks run inside
//! `subscribe`, `process` and `loop_forever`, never under the broker lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::broker::{
    Broker, BrokerStats, Message, QoS, SessionHandle, WakeSignal, topic_matches,
};
use crate::client::options::ConnectOptions;
use crate::config::ClientSettings;
use crate::utils::{MqttError, Result, generate_client_id};

pub type MessageCallback = Box<dyn FnMut(&Message) + Send>;
pub type ConnectionCallback = Box<dyn FnMut(ConnectionState, Option<&MqttError>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation for `loop_forever`.
///
/// Cloneable and `Send`, so a callback or another task can stop a loop that
/// holds the client mutably. Stopping also interrupts the current wait.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: WakeSignal,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.wake();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}

pub struct Subscription {
    pub filter: String,
    pub qos: QoS,
    callback: MessageCallback,
    /// Sequences of retained messages replayed on subscribe that the log
    /// scan has not passed yet.
    replayed: Vec<u64>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("filter", &self.filter)
            .field("qos", &self.qos)
            .finish()
    }
}

pub struct Client {
    id: String,
    broker: Arc<Broker>,
    state: ConnectionState,
    session: Option<SessionHandle>,
    subscriptions: Vec<Subscription>,
    last_processed_sequence: u64,
    wake: WakeSignal,
    stop: StopHandle,
    connection_callback: Option<ConnectionCallback>,
    poll_interval: Duration,
    had_session: bool,
}

impl Client {
    /// Create a disconnected client. An empty id gets a generated one.
    pub fn create(broker: Arc<Broker>, client_id: &str) -> Result<Self> {
        let id = if client_id.is_empty() {
            generate_client_id()
        } else {
            client_id.to_string()
        };
        check_client_id(&broker, &id)?;

        let wake = WakeSignal::new();
        debug!(client_id = %id, "created client");
        Ok(Self {
            id,
            broker,
            state: ConnectionState::Disconnected,
            session: None,
            subscriptions: Vec::new(),
            last_processed_sequence: 0,
            stop: StopHandle {
                stopped: Arc::new(AtomicBool::new(false)),
                wake: wake.clone(),
            },
            wake,
            connection_callback: None,
            poll_interval: Duration::from_millis(ClientSettings::default().poll_interval_ms),
            had_session: false,
        })
    }

    pub fn with_settings(mut self, settings: &ClientSettings) -> Self {
        self.poll_interval = Duration::from_millis(settings.poll_interval_ms);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Highest log sequence this client has consumed.
    pub fn last_processed_sequence(&self) -> u64 {
        self.last_processed_sequence
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn set_connection_callback<F>(&mut self, callback: F)
    where
        F: FnMut(ConnectionState, Option<&MqttError>) + Send + 'static,
    {
        self.connection_callback = Some(Box::new(callback));
    }

    fn set_state(&mut self, state: ConnectionState, reason: Option<&MqttError>) {
        self.state = state;
        if let Some(callback) = self.connection_callback.as_mut() {
            callback(state, reason);
        }
    }

    fn session(&self) -> Result<SessionHandle> {
        match (&self.session, self.state) {
            (Some(session), ConnectionState::Connected) => Ok(session.clone()),
            _ => Err(MqttError::NotConnected),
        }
    }

    /// Drop local session state when the broker reports that this session
    /// was closed or taken over.
    fn check_session_error(&mut self, err: MqttError) -> MqttError {
        if err == MqttError::Disconnected && self.session.take().is_some() {
            warn!(client_id = %self.id, "session no longer owns its broker slot");
            self.set_state(ConnectionState::Disconnected, Some(&err));
        }
        err
    }

    /// Register with the broker. Connecting twice is a no-op.
    ///
    /// The cursor starts at the broker's current sequence, so nothing
    /// published before this call is delivered (retained messages aside).
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        if let Some(id) = options.client_id.as_deref().filter(|id| !id.is_empty()) {
            check_client_id(&self.broker, id)?;
            self.id = id.to_string();
        }

        let transition = if self.had_session {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.set_state(transition, None);

        let session = match self.broker.connect(&self.id, self.wake.clone()) {
            Ok(session) => session,
            Err(err) => {
                warn!(client_id = %self.id, error = %err, "connect failed");
                self.set_state(ConnectionState::Error, Some(&err));
                return Err(err);
            }
        };

        if options.clean_session {
            self.subscriptions.clear();
        } else {
            let filters: Vec<String> = self.subscriptions.iter().map(|s| s.filter.clone()).collect();
            for filter in &filters {
                if let Err(err) = self.broker.register_filter(&session, filter) {
                    let _ = self.broker.disconnect(&session);
                    self.set_state(ConnectionState::Error, Some(&err));
                    return Err(err);
                }
            }
        }
        if options.last_will.is_some() {
            debug!(client_id = %self.id, "last will accepted but not enforced by this backend");
        }

        self.last_processed_sequence = session.connected_at_sequence();
        for sub in &mut self.subscriptions {
            sub.replayed.clear();
        }
        self.session = Some(session);
        self.had_session = true;
        self.stop.reset();
        self.set_state(ConnectionState::Connected, None);
        info!(client_id = %self.id, "connected");
        Ok(())
    }

    /// Leave the broker. Calling it on a disconnected client is a no-op.
    pub fn disconnect(&mut self) -> Result<()> {
        self.stop.stop();
        let Some(session) = self.session.take() else {
            if self.state != ConnectionState::Disconnected {
                self.set_state(ConnectionState::Disconnected, None);
            }
            return Ok(());
        };

        let result = self.broker.disconnect(&session);
        self.set_state(ConnectionState::Disconnected, None);
        result
    }

    /// Disconnect if needed and release the client.
    pub fn destroy(mut self) {
        if let Err(err) = self.disconnect() {
            warn!(client_id = %self.id, error = %err, "disconnect on destroy failed");
        }
    }

    /// Publish `payload` on `topic`. Returns the assigned sequence number.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retained: bool) -> Result<u64> {
        let session = self.session()?;
        self.broker
            .publish(&session, topic, payload, qos, retained)
            .map_err(|err| self.check_session_error(err))
    }

    pub fn publish_string(&mut self, topic: &str, text: &str, qos: QoS, retained: bool) -> Result<u64> {
        self.publish(topic, text.as_bytes(), qos, retained)
    }

    /// Subscribe `callback` to `filter`, then replay matching retained
    /// messages to it before returning.
    ///
    /// Subscribing again to the same filter replaces its callback and QoS.
    pub fn subscribe<F>(&mut self, filter: &str, qos: QoS, callback: F) -> Result<()>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        if !self.broker.validate_topic(filter, true) {
            return Err(MqttError::TopicInvalid(filter.to_string()));
        }
        let session = self.session()?;

        let existing = self.subscriptions.iter().position(|s| s.filter == filter);
        let max = self.broker.settings().max_subscriptions;
        if existing.is_none() && self.subscriptions.len() >= max {
            return Err(MqttError::SubscribeFailed(format!(
                "local subscription table full ({max} filters)"
            )));
        }

        let replay = self
            .broker
            .register_filter(&session, filter)
            .map_err(|err| self.check_session_error(err))?;

        // Replayed messages still ahead of the cursor must not come back
        // from the log.
        let cursor = self.last_processed_sequence;
        let subscription = Subscription {
            filter: filter.to_string(),
            qos,
            callback: Box::new(callback),
            replayed: replay
                .iter()
                .map(|m| m.sequence)
                .filter(|&seq| seq > cursor)
                .collect(),
        };
        let index = match existing {
            Some(index) => {
                self.subscriptions[index] = subscription;
                index
            }
            None => {
                self.subscriptions.push(subscription);
                self.subscriptions.len() - 1
            }
        };
        info!(client_id = %self.id, filter, ?qos, "subscribed");

        let callback = &mut self.subscriptions[index].callback;
        for message in &replay {
            callback(message);
        }
        Ok(())
    }

    /// Remove the subscription for `filter`. Unknown filters succeed.
    pub fn unsubscribe(&mut self, filter: &str) -> Result<()> {
        if let Some(index) = self.subscriptions.iter().position(|s| s.filter == filter) {
            self.subscriptions.remove(index);
            info!(client_id = %self.id, filter, "unsubscribed");
        }

        match self.session() {
            Ok(session) => self
                .broker
                .remove_filter(&session, filter)
                .map_err(|err| self.check_session_error(err)),
            Err(_) => Ok(()),
        }
    }

    /// Wait up to `timeout` for a wake-up (zero means don't wait), then
    /// deliver every new log entry matching a local subscription.
    ///
    /// Each entry goes to the first matching subscription only. Entries
    /// overwritten before this scan reached them are skipped. Returns how
    /// many callbacks ran.
    pub async fn process(&mut self, timeout: Duration) -> Result<usize> {
        let session = self.session()?;
        if !timeout.is_zero() {
            self.wake.wait(timeout).await;
        }
        self.drain(&session)
            .map_err(|err| self.check_session_error(err))
    }

    fn drain(&mut self, session: &SessionHandle) -> Result<usize> {
        let (first, last) = self.broker.begin_scan(session)?;
        let mut delivered = 0;

        for sequence in first..=last {
            // The broker lock is released between entries and during callbacks.
            let Some(message) = self.broker.read_entry(session, sequence)? else {
                debug!(client_id = %self.id, sequence, "entry overwritten before it was read");
                continue;
            };
            if message.retained
                && self
                    .subscriptions
                    .iter()
                    .any(|s| s.replayed.contains(&message.sequence))
            {
                debug!(client_id = %self.id, sequence, "retained entry already replayed");
                continue;
            }
            if let Some(sub) = self
                .subscriptions
                .iter_mut()
                .find(|s| topic_matches(&message.topic, &s.filter))
            {
                (sub.callback)(&message);
                delivered += 1;
            }
        }

        self.broker.commit_cursor(session, last)?;
        self.last_processed_sequence = self.last_processed_sequence.max(last);
        let cursor = self.last_processed_sequence;
        for sub in &mut self.subscriptions {
            sub.replayed.retain(|&seq| seq > cursor);
        }
        Ok(delivered)
    }

    /// Call `process` with the poll interval until `stop_loop` is requested
    /// or the session ends.
    pub async fn loop_forever(&mut self) -> Result<()> {
        self.stop.reset();
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        debug!(client_id = %self.id, "starting event loop");

        while !self.stop.is_stopped() && self.is_connected() {
            match self.process(self.poll_interval).await {
                Ok(_) | Err(MqttError::Timeout) => {}
                Err(MqttError::Disconnected) => break,
                Err(err) => return Err(err),
            }
        }

        debug!(client_id = %self.id, "event loop stopped");
        Ok(())
    }

    pub fn stop_loop(&self) {
        self.stop.stop();
        debug!(client_id = %self.id, "loop stop requested");
    }

    /// Log a snapshot of the broker's shared state and return it.
    pub fn print_stats(&self) -> Result<BrokerStats> {
        let stats = self.broker.stats()?;
        info!("\n{stats}");
        Ok(stats)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions)
            .field("last_processed_sequence", &self.last_processed_sequence)
            .finish()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(err) = self.disconnect() {
                warn!(client_id = %self.id, error = %err, "disconnect on drop failed");
            }
        }
    }
}

fn check_client_id(broker: &Broker, id: &str) -> Result<()> {
    let max = broker.settings().max_client_id_length;
    if id.len() > max {
        return Err(MqttError::InvalidParameter(format!(
            "client id '{id}' longer than {max} bytes"
        )));
    }
    Ok(())
}
