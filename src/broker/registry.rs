//! Named attach points
//!
//! A `BrokerRegistry` lets unrelated components rendezvous on a broker by a
//! well-known name. The first `attach` creates the broker; later ones get
//! the same instance. A broker lives until `cleanup` removes it, even when
//! every client has gone away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::broker::engine::Broker;
use crate::config::BrokerSettings;
use crate::utils::{MqttError, Result};

#[derive(Debug, Default)]
pub struct BrokerRegistry {
    brokers: Mutex<HashMap<String, Arc<Broker>>>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<Broker>>>> {
        self.brokers
            .lock()
            .map_err(|_| MqttError::Internal("broker registry lock poisoned".to_string()))
    }

    /// Attach to the broker named `settings.name`, creating it if needed.
    ///
    /// An existing broker keeps its first layout; differing settings are
    /// logged and ignored.
    pub fn attach(&self, settings: &BrokerSettings) -> Result<Arc<Broker>> {
        let mut brokers = self.lock()?;
        if let Some(existing) = brokers.get(&settings.name) {
            if existing.settings() != settings {
                warn!(name = %settings.name, "attaching with different settings, keeping existing layout");
            }
            return Ok(existing.clone());
        }

        let broker = Arc::new(Broker::new(settings.clone())?);
        brokers.insert(settings.name.clone(), broker.clone());
        Ok(broker)
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<Broker>>> {
        Ok(self.lock()?.get(name).cloned())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Remove the named broker. Refuses while any client is connected.
    ///
    /// Returns false when no broker had that name. Clients still holding the
    /// `Arc` keep a working but unreachable broker.
    pub fn cleanup(&self, name: &str) -> Result<bool> {
        let mut brokers = self.lock()?;
        let Some(broker) = brokers.get(name) else {
            return Ok(false);
        };

        let connected = broker.connected_clients()?;
        if connected > 0 {
            return Err(MqttError::InvalidParameter(format!(
                "broker '{name}' still has {connected} connected clients"
            )));
        }

        brokers.remove(name);
        info!(name, "cleaned up broker");
        Ok(true)
    }
}
