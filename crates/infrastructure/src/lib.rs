//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_rule_repository;
mod in_process_execution_guard;
mod node_rpc_client;
mod postgres_audit_log_repository;
mod postgres_rule_repository;
mod redis_execution_guard;

pub use in_memory_rule_repository::InMemoryRuleRepository;
pub use in_process_execution_guard::InProcessExecutionGuard;
pub use node_rpc_client::{NodeRpcClient, NodeRpcCredentials};
pub use postgres_audit_log_repository::PostgresAuditLogRepository;
pub use postgres_rule_repository::PostgresRuleRepository;
pub use redis_execution_guard::RedisExecutionGuard;
