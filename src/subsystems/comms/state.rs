//! Shared state for the comms subsystem: the capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and reach the rest of the bot only
//! through the accessors below. Neither channel touches the provider router
//! or storage except through the [`Consultant`].

use std::sync::Arc;

use crate::config::Config;
use crate::consult::{AccessGate, Consultant};
use crate::supervisor::HealthRegistry;

pub struct CommsState {
    config: Arc<Config>,
    consultant: Consultant,
    gate: AccessGate,
    health: HealthRegistry,
}

impl CommsState {
    pub fn new(config: Arc<Config>, consultant: Consultant, health: HealthRegistry) -> Self {
        let gate = AccessGate::new(consultant.db().clone(), config.secrets.admin_user_ids.clone());
        Self { config, consultant, gate, health }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn consultant(&self) -> &Consultant {
        &self.consultant
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }
}
