use async_trait::async_trait;
use peerwarden_core::AppResult;
use peerwarden_domain::Peer;
use serde::Serialize;

/// Normalized result of one peer control call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Whether the control call took effect.
    pub success: bool,
    /// Human-readable result message.
    pub message: String,
}

impl ActionOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Port returning the live set of connected peers.
#[async_trait]
pub trait PeerSource: Send + Sync {
    /// Lists currently connected peers.
    async fn list_peers(&self) -> AppResult<Vec<Peer>>;
}

/// Port for node-side peer control operations.
#[async_trait]
pub trait PeerControl: Send + Sync {
    /// Bans one peer address for the given duration.
    async fn ban(&self, address: &str, duration_seconds: u64) -> AppResult<ActionOutcome>;

    /// Disconnects one peer by node identifier.
    async fn disconnect(&self, peer_id: &str) -> AppResult<ActionOutcome>;
}
