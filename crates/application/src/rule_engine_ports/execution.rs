use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerwarden_core::{AppResult, RuleId};
use peerwarden_domain::{Peer, RuleAction, RuleDefinition};
use serde::Serialize;

use super::peers::ActionOutcome;

/// Port that applies one rule action to one peer.
///
/// Implementations normalize control failures into a failed outcome; an `Err`
/// is reserved for the dispatch call itself breaking.
#[async_trait]
pub trait PeerActionDispatcher: Send + Sync {
    /// Applies `action` to `peer`.
    async fn dispatch(&self, peer: &Peer, action: &RuleAction) -> AppResult<ActionOutcome>;
}

/// Result of the action attempted against one matched peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerActionOutcome {
    /// Node-assigned peer identifier, when present.
    pub peer_id: Option<String>,
    /// Peer network address, when present.
    pub peer_address: Option<String>,
    /// Whether the action took effect.
    pub success: bool,
    /// Result text written to the audit log.
    pub result: String,
    /// Whether the audit entry was persisted.
    pub logged: bool,
}

/// Summary of one rule run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRunSummary {
    /// Rule identifier.
    pub rule_id: RuleId,
    /// Rule name at run time.
    pub rule_name: String,
    /// Whether the run went through fetch, filter and dispatch.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Number of peers matching the conditions.
    pub matched_count: usize,
    /// Number of successful dispatches.
    pub actions_executed: usize,
    /// One outcome per matched peer, in processing order.
    pub outcomes: Vec<PeerActionOutcome>,
}

impl RuleRunSummary {
    /// Summary returned for a rule that is not active.
    #[must_use]
    pub fn skipped(rule: &RuleDefinition) -> Self {
        Self {
            rule_id: rule.id(),
            rule_name: rule.name().as_str().to_owned(),
            success: false,
            message: "Rule is not active".to_owned(),
            matched_count: 0,
            actions_executed: 0,
            outcomes: Vec::new(),
        }
    }
}

/// Per-rule entry of a batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleExecutionReport {
    /// Rule identifier.
    pub rule_id: RuleId,
    /// Rule name.
    pub rule_name: String,
    /// Run summary when the rule ran to completion.
    pub summary: Option<RuleRunSummary>,
    /// Error text when the run failed.
    pub error: Option<String>,
}

impl RuleExecutionReport {
    /// Returns whether the rule run failed with an error.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of one scheduled tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    /// Tick start.
    pub started_at: DateTime<Utc>,
    /// Tick end.
    pub finished_at: DateTime<Utc>,
    /// Rules that ran to completion.
    pub rules_executed: usize,
    /// Rules whose run failed.
    pub rules_failed: usize,
    /// Error that aborted the whole tick, such as a failed rule listing.
    pub error: Option<String>,
}

/// Scheduler state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    /// Whether the recurring job is active.
    pub running: bool,
    /// Interval of the active job.
    pub interval_ms: Option<u64>,
    /// Most recent completed scheduled tick.
    pub last_tick: Option<TickSummary>,
}
