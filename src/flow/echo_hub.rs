//! Echo hub node
//!
//! The hub passes messages through unchanged and owns the discovery
//! lifecycle of the devices it announces. No network discovery traffic is
//! produced; an announcement only records and logs the device set.
//!
//! ```text
//! Stopped ──start──▶ Starting ──▶ Ready ──close──▶ Stopping ──▶ Stopped
//!    ▲                  │
//!    │                  ▼
//!    └────close───── Failed ──start──▶ Starting
//! ```

use super::{FlowMessage, FlowNode, NodeContext};
use crate::config::HubConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Hub lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    Stopped,
    Starting,
    Ready,
    Stopping,
    Failed,
}

impl HubState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: HubState) -> bool {
        use HubState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Failed, Starting)
                | (Starting, Ready)
                | (Starting, Failed)
                | (Ready, Stopping)
                | (Failed, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for HubState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HubState::Stopped => "stopped",
            HubState::Starting => "starting",
            HubState::Ready => "ready",
            HubState::Stopping => "stopping",
            HubState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct EchoHubNode {
    config: HubConfig,
    state: RwLock<HubState>,
    announcements: AtomicU64,
}

impl EchoHubNode {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HubState::Stopped),
            announcements: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub async fn state(&self) -> HubState {
        *self.state.read().await
    }

    /// Number of device announcements made so far
    pub fn announcements(&self) -> u64 {
        self.announcements.load(Ordering::Relaxed)
    }

    /// Move `state` to `next`; callers hold the write lock across a whole
    /// lifecycle step
    fn transition(&self, state: &mut HubState, next: HubState) -> Result<()> {
        let current = *state;
        if !current.can_transition_to(next) {
            return Err(BridgeError::invalid_state(format!(
                "hub {} cannot go from {} to {}",
                self.config.id, current, next
            )));
        }
        debug!(node_id = %self.config.id, from = %current, to = %next, "Hub state change");
        *state = next;
        Ok(())
    }

    fn announce(&self) {
        let count = self.announcements.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            node_id = %self.config.id,
            port = self.config.port,
            devices = self.config.devices.len(),
            announcement = count,
            "Announcing devices"
        );
    }

    fn start_locked(&self, state: &mut HubState) -> Result<()> {
        self.transition(state, HubState::Starting)?;

        if self.config.port == 0 {
            self.transition(state, HubState::Failed)?;
            return Err(BridgeError::invalid_state(format!(
                "hub {} has no port to announce on",
                self.config.id
            )));
        }

        self.transition(state, HubState::Ready)?;
        info!(node_id = %self.config.id, port = self.config.port, "Echo hub started");
        self.announce();
        Ok(())
    }
}

#[async_trait]
impl FlowNode for EchoHubNode {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> &'static str {
        "echo-hub"
    }

    fn on_input(&self, msg: FlowMessage, ctx: &NodeContext) {
        if let Err(e) = ctx.send(msg) {
            ctx.error(e.to_string());
        }
        ctx.done();
    }

    /// Start a stopped or failed hub; re-announce when already ready
    async fn discover(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match *state {
            HubState::Ready => {
                self.announce();
                Ok(())
            }
            HubState::Stopped | HubState::Failed => self.start_locked(&mut state),
            current @ (HubState::Starting | HubState::Stopping) => Err(
                BridgeError::invalid_state(format!("hub {} is {}", self.config.id, current)),
            ),
        }
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.start_locked(&mut state)
    }

    async fn close(&self) {
        let mut state = self.state.write().await;
        if *state == HubState::Stopped {
            return;
        }
        if let Err(e) = self.transition(&mut state, HubState::Stopping) {
            warn!(node_id = %self.config.id, error = %e, "Closing hub from unexpected state");
        }
        *state = HubState::Stopped;
        info!(node_id = %self.config.id, "Echo hub stopped");
    }
}
