mod audit_log;
mod execution;
mod guard;
mod peers;
mod repository;

pub use audit_log::{
    DEFAULT_AUDIT_PAGE_LIMIT, MAX_AUDIT_PAGE_LIMIT, NewRuleAuditEntry, RuleAuditEntry,
    RuleAuditPage, RuleAuditQuery, RuleAuditRepository,
};
pub use execution::{
    PeerActionDispatcher, PeerActionOutcome, RuleExecutionReport, RuleRunSummary, SchedulerStatus,
    TickSummary,
};
pub use guard::{ExecutionGuard, ExecutionPermit};
pub use peers::{ActionOutcome, PeerControl, PeerSource};
pub use repository::{RuleRepository, StoredRule};
