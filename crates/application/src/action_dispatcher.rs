use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use peerwarden_core::AppResult;
use peerwarden_domain::{Peer, RuleAction};
use tracing::debug;

use crate::rule_engine_ports::{ActionOutcome, PeerActionDispatcher, PeerControl};

/// Default deadline applied to each peer control call.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatcher that maps rule actions onto peer control calls.
#[derive(Clone)]
pub struct PeerControlDispatcher {
    peer_control: Arc<dyn PeerControl>,
    call_timeout: Duration,
}

impl PeerControlDispatcher {
    /// Creates a dispatcher with the default call deadline.
    #[must_use]
    pub fn new(peer_control: Arc<dyn PeerControl>) -> Self {
        Self {
            peer_control,
            call_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    /// Overrides the per-call deadline.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout.max(Duration::from_millis(1));
        self
    }

    async fn bounded<F>(&self, call: F) -> ActionOutcome
    where
        F: Future<Output = AppResult<ActionOutcome>> + Send,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => ActionOutcome::failed(error.to_string()),
            Err(_) => ActionOutcome::failed(format!(
                "peer control call timed out after {} ms",
                self.call_timeout.as_millis()
            )),
        }
    }
}

#[async_trait]
impl PeerActionDispatcher for PeerControlDispatcher {
    async fn dispatch(&self, peer: &Peer, action: &RuleAction) -> AppResult<ActionOutcome> {
        let outcome = match action {
            RuleAction::Ban { .. } => {
                let Some(address) = peer.address() else {
                    return Ok(ActionOutcome::failed("peer has no address to ban"));
                };
                let Some(duration_seconds) = action.effective_ban_time_seconds() else {
                    return Ok(ActionOutcome::failed("ban action has no duration"));
                };
                debug!(peer_addr = %address, duration_seconds, "dispatching peer ban");

                self.bounded(self.peer_control.ban(address, duration_seconds))
                    .await
            }
            RuleAction::Disconnect => {
                let Some(peer_id) = peer.id() else {
                    return Ok(ActionOutcome::failed("peer has no id to disconnect"));
                };
                debug!(peer_id = %peer_id, "dispatching peer disconnect");

                self.bounded(self.peer_control.disconnect(peer_id.as_str()))
                    .await
            }
            RuleAction::Unsupported { action } => {
                ActionOutcome::failed(format!("Unknown action: {action}"))
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use peerwarden_domain::{Peer, RuleAction};
    use serde_json::json;

    use super::PeerControlDispatcher;
    use crate::rule_engine_ports::PeerActionDispatcher;
    use crate::test_support::{ControlCall, FakePeerControl};

    fn peer() -> Peer {
        Peer::from_value(json!({
            "id": 12,
            "addr": "203.0.113.7:8333",
            "pingtime": 2.5
        }))
        .unwrap_or_default()
    }

    #[tokio::test]
    async fn ban_without_ban_time_uses_default_duration() {
        let control = Arc::new(FakePeerControl::default());
        let dispatcher = PeerControlDispatcher::new(control.clone());

        let outcome = dispatcher
            .dispatch(
                &peer(),
                &RuleAction::Ban {
                    ban_time_seconds: None,
                },
            )
            .await;

        assert!(outcome.is_ok());
        assert!(outcome.unwrap_or_else(|_| unreachable!()).success);
        assert_eq!(
            control.calls().await,
            vec![ControlCall::Ban {
                address: "203.0.113.7:8333".to_owned(),
                duration_seconds: 86_400,
            }]
        );
    }

    #[tokio::test]
    async fn ban_passes_configured_ban_time() {
        let control = Arc::new(FakePeerControl::default());
        let dispatcher = PeerControlDispatcher::new(control.clone());

        let _ = dispatcher
            .dispatch(
                &peer(),
                &RuleAction::Ban {
                    ban_time_seconds: Some(600),
                },
            )
            .await;

        assert_eq!(
            control.calls().await,
            vec![ControlCall::Ban {
                address: "203.0.113.7:8333".to_owned(),
                duration_seconds: 600,
            }]
        );
    }

    #[tokio::test]
    async fn disconnect_uses_peer_id() {
        let control = Arc::new(FakePeerControl::default());
        let dispatcher = PeerControlDispatcher::new(control.clone());

        let outcome = dispatcher.dispatch(&peer(), &RuleAction::Disconnect).await;

        assert!(outcome.is_ok_and(|outcome| outcome.success));
        assert_eq!(
            control.calls().await,
            vec![ControlCall::Disconnect {
                peer_id: "12".to_owned()
            }]
        );
    }

    #[tokio::test]
    async fn unknown_action_fails_without_calling_control() {
        let control = Arc::new(FakePeerControl::default());
        let dispatcher = PeerControlDispatcher::new(control.clone());

        let outcome = dispatcher
            .dispatch(
                &peer(),
                &RuleAction::Unsupported {
                    action: "throttle".to_owned(),
                },
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Unknown action: throttle");
        assert!(control.calls().await.is_empty());
    }

    #[tokio::test]
    async fn control_errors_become_failed_outcomes() {
        let control = Arc::new(FakePeerControl::failing("node refused setban"));
        let dispatcher = PeerControlDispatcher::new(control);

        let outcome = dispatcher
            .dispatch(
                &peer(),
                &RuleAction::Ban {
                    ban_time_seconds: None,
                },
            )
            .await;

        assert!(outcome.is_ok());
        let outcome = outcome.unwrap_or_else(|_| unreachable!());
        assert!(!outcome.success);
        assert!(outcome.message.contains("node refused setban"));
    }

    #[tokio::test]
    async fn hanging_control_call_times_out() {
        let control = Arc::new(FakePeerControl::hanging(Duration::from_secs(30)));
        let dispatcher =
            PeerControlDispatcher::new(control).with_call_timeout(Duration::from_millis(20));

        let outcome = dispatcher
            .dispatch(&peer(), &RuleAction::Disconnect)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(!outcome.success);
        assert!(outcome.message.contains("timed out"));
    }

    #[tokio::test]
    async fn peer_without_address_is_not_banned() {
        let control = Arc::new(FakePeerControl::default());
        let dispatcher = PeerControlDispatcher::new(control.clone());
        let anonymous = Peer::from_value(json!({"id": 3})).unwrap_or_default();

        let outcome = dispatcher
            .dispatch(
                &anonymous,
                &RuleAction::Ban {
                    ban_time_seconds: None,
                },
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(!outcome.success);
        assert!(control.calls().await.is_empty());
    }
}
