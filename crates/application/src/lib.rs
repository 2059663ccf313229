//! Application services and ports.

#![forbid(unsafe_code)]

mod action_dispatcher;
mod condition_evaluator;
mod rule_engine_ports;
mod rule_engine_service;
mod rule_runner;
mod rule_scheduler;
mod rule_service;

#[cfg(test)]
mod test_support;

pub use action_dispatcher::{DEFAULT_DISPATCH_TIMEOUT, PeerControlDispatcher};
pub use condition_evaluator::matches_conditions;
pub use rule_engine_ports::{
    ActionOutcome, DEFAULT_AUDIT_PAGE_LIMIT, ExecutionGuard, ExecutionPermit, MAX_AUDIT_PAGE_LIMIT,
    NewRuleAuditEntry, PeerActionDispatcher, PeerActionOutcome, PeerControl, PeerSource,
    RuleAuditEntry, RuleAuditPage, RuleAuditQuery, RuleAuditRepository, RuleExecutionReport,
    RuleRepository, RuleRunSummary, SchedulerStatus, StoredRule, TickSummary,
};
pub use rule_engine_service::{
    DEFAULT_LEASE_RENEW_INTERVAL, EXECUTE_ACTIVE_RULES_SCOPE, RuleEngineService,
};
pub use rule_runner::RuleRunner;
pub use rule_scheduler::{DEFAULT_RULE_INTERVAL_MS, RuleScheduler};
pub use rule_service::{CreateRuleInput, RuleService, RuleView, UpdateRuleInput};
