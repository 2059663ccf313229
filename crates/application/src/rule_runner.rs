use std::sync::Arc;

use chrono::Utc;
use peerwarden_core::AppResult;
use peerwarden_domain::{Peer, RuleDefinition};
use tracing::{info, warn};

use crate::condition_evaluator::matches_conditions;
use crate::rule_engine_ports::{
    NewRuleAuditEntry, PeerActionDispatcher, PeerActionOutcome, PeerSource, RuleAuditRepository,
    RuleRunSummary,
};

/// Executes one rule against the live peer set.
#[derive(Clone)]
pub struct RuleRunner {
    peer_source: Arc<dyn PeerSource>,
    dispatcher: Arc<dyn PeerActionDispatcher>,
    audit_repository: Arc<dyn RuleAuditRepository>,
}

impl RuleRunner {
    /// Creates a runner from its ports.
    #[must_use]
    pub fn new(
        peer_source: Arc<dyn PeerSource>,
        dispatcher: Arc<dyn PeerActionDispatcher>,
        audit_repository: Arc<dyn RuleAuditRepository>,
    ) -> Self {
        Self {
            peer_source,
            dispatcher,
            audit_repository,
        }
    }

    /// Runs `rule` once.
    ///
    /// Inactive rules are skipped without contacting the node. A failed peer
    /// listing fails the run. Dispatch and audit failures are recorded per peer
    /// and never stop the remaining peers.
    pub async fn run(&self, rule: &RuleDefinition) -> AppResult<RuleRunSummary> {
        if !rule.is_active() {
            return Ok(RuleRunSummary::skipped(rule));
        }

        let peers = self.peer_source.list_peers().await?;
        let matched: Vec<&Peer> = peers
            .iter()
            .filter(|peer| matches_conditions(peer, rule.conditions()))
            .collect();

        let mut outcomes = Vec::with_capacity(matched.len());
        for peer in matched {
            outcomes.push(self.apply_to_peer(rule, peer).await);
        }

        let matched_count = outcomes.len();
        let actions_executed = outcomes.iter().filter(|outcome| outcome.success).count();
        info!(
            rule_id = %rule.id(),
            rule_name = rule.name().as_str(),
            peers_total = peers.len(),
            matched_count,
            actions_executed,
            "rule run finished"
        );

        Ok(RuleRunSummary {
            rule_id: rule.id(),
            rule_name: rule.name().as_str().to_owned(),
            success: true,
            message: format!(
                "Rule executed: {matched_count} peers matched, {actions_executed} actions executed"
            ),
            matched_count,
            actions_executed,
            outcomes,
        })
    }

    async fn apply_to_peer(&self, rule: &RuleDefinition, peer: &Peer) -> PeerActionOutcome {
        let triggered_at = Utc::now();
        let (success, result) = match self.dispatcher.dispatch(peer, rule.action()).await {
            Ok(outcome) => (outcome.success, outcome.message),
            Err(error) => (false, format!("Error: {error}")),
        };

        let entry = NewRuleAuditEntry {
            rule_id: rule.id(),
            triggered_at,
            peer_snapshot: peer.snapshot(),
            action_taken: rule.action().action_type().to_owned(),
            result: result.clone(),
        };
        let logged = match self.audit_repository.append_entry(entry).await {
            Ok(_) => true,
            Err(error) => {
                warn!(
                    rule_id = %rule.id(),
                    peer_addr = peer.address().unwrap_or_default(),
                    error = %error,
                    "failed to append rule audit entry"
                );
                false
            }
        };

        PeerActionOutcome {
            peer_id: peer.id(),
            peer_address: peer.address().map(ToOwned::to_owned),
            success,
            result,
            logged,
        }
    }
}
