use std::env;
use std::path::PathBuf;
use std::time::Duration;

use peerwarden_application::DEFAULT_RULE_INTERVAL_MS;
use peerwarden_core::{AppError, AppResult};
use peerwarden_infrastructure::NodeRpcCredentials;

const DEFAULT_NODE_RPC_URL: &str = "http://127.0.0.1:8332";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: Option<String>,
    pub node_rpc_url: String,
    pub node_rpc_user: Option<String>,
    pub node_rpc_password: Option<String>,
    pub rule_interval_ms: u64,
    pub dispatch_timeout_ms: u64,
    pub rpc_timeout_ms: u64,
    pub redis_url: Option<String>,
    pub rule_lock_lease_seconds: u64,
    pub worker_id: String,
    pub rules_seed_path: Option<PathBuf>,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let node_rpc_url = optional("NODE_RPC_URL")
            .unwrap_or_else(|| DEFAULT_NODE_RPC_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let worker_id =
            optional("WORKER_ID").unwrap_or_else(|| format!("worker-{}", std::process::id()));

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            node_rpc_url,
            node_rpc_user: optional("NODE_RPC_USER"),
            node_rpc_password: lookup("NODE_RPC_PASSWORD"),
            rule_interval_ms: parse_positive_u64(
                &optional,
                "RULE_INTERVAL_MS",
                DEFAULT_RULE_INTERVAL_MS,
            )?,
            dispatch_timeout_ms: parse_positive_u64(&optional, "DISPATCH_TIMEOUT_MS", 10_000)?,
            rpc_timeout_ms: parse_positive_u64(&optional, "RPC_TIMEOUT_MS", 15_000)?,
            redis_url: optional("REDIS_URL"),
            rule_lock_lease_seconds: parse_positive_u64(&optional, "RULE_LOCK_LEASE_SECONDS", 600)?,
            worker_id,
            rules_seed_path: optional("RULES_SEED_PATH").map(PathBuf::from),
        })
    }

    pub fn node_rpc_credentials(&self) -> Option<NodeRpcCredentials> {
        self.node_rpc_user.as_ref().map(|user| NodeRpcCredentials {
            user: user.clone(),
            password: self.node_rpc_password.clone(),
        })
    }

    /// Renews the rule lock three times per lease.
    pub fn lease_renew_interval(&self) -> Duration {
        Duration::from_millis((self.rule_lock_lease_seconds * 1_000 / 3).max(1))
    }
}

fn parse_positive_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> AppResult<u64> {
    let value = match lookup(name) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        })?,
        None => default,
    };

    if value == 0 {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}
