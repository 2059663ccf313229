//! Peerwarden rule worker runtime.

#![forbid(unsafe_code)]

mod worker_config;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use peerwarden_application::{
    CreateRuleInput, ExecutionGuard, PeerControlDispatcher, RuleAuditRepository, RuleEngineService,
    RuleRepository, RuleRunner, RuleScheduler, RuleService,
};
use peerwarden_core::{AppError, AppResult};
use peerwarden_infrastructure::{
    InMemoryRuleRepository, InProcessExecutionGuard, NodeRpcClient, PostgresAuditLogRepository,
    PostgresRuleRepository, RedisExecutionGuard,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

const RULE_LOCK_KEY_PREFIX: &str = "peerwarden:rules";

struct RuleStores {
    rules: Arc<dyn RuleRepository>,
    audit: Arc<dyn RuleAuditRepository>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let run_once = env::args()
        .nth(1)
        .is_some_and(|argument| argument == "run-once");

    let stores = build_stores(&config).await?;
    let guard = build_guard(&config)?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.rpc_timeout_ms))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let node = Arc::new(NodeRpcClient::new(
        http_client,
        config.node_rpc_url.clone(),
        config.node_rpc_credentials(),
    ));

    if let Some(seed_path) = &config.rules_seed_path {
        let rule_service = RuleService::new(stores.rules.clone(), stores.audit.clone());
        seed_rules(&rule_service, seed_path).await?;
    }

    let dispatcher = PeerControlDispatcher::new(node.clone())
        .with_call_timeout(Duration::from_millis(config.dispatch_timeout_ms));
    let runner = RuleRunner::new(node, Arc::new(dispatcher), stores.audit);
    let engine = RuleEngineService::new(stores.rules, runner, guard)
        .with_lease_renew_interval(config.lease_renew_interval());

    info!(
        worker_id = %config.worker_id,
        node_rpc_url = %config.node_rpc_url,
        persistent = config.database_url.is_some(),
        distributed_lock = config.redis_url.is_some(),
        rule_interval_ms = config.rule_interval_ms,
        "peerwarden-worker started"
    );

    if run_once {
        return run_active_rules_once(&engine, config.worker_id.as_str()).await;
    }

    let scheduler = RuleScheduler::new(engine);
    scheduler.start(config.rule_interval_ms).await?;

    tokio::signal::ctrl_c().await.map_err(|error| {
        AppError::Internal(format!("failed to listen for shutdown signal: {error}"))
    })?;

    scheduler.stop().await;
    let status = scheduler.status().await;
    info!(
        worker_id = %config.worker_id,
        last_tick_rules_executed = status.last_tick.as_ref().map(|tick| tick.rules_executed),
        "peerwarden-worker stopped"
    );

    Ok(())
}

async fn run_active_rules_once(engine: &RuleEngineService, worker_id: &str) -> AppResult<()> {
    let reports = engine.run_all_active().await?;

    for report in &reports {
        match (&report.summary, &report.error) {
            (Some(summary), _) => info!(
                worker_id,
                rule_id = %report.rule_id,
                rule_name = %report.rule_name,
                matched_count = summary.matched_count,
                actions_executed = summary.actions_executed,
                message = %summary.message,
                "rule executed"
            ),
            (None, error) => warn!(
                worker_id,
                rule_id = %report.rule_id,
                rule_name = %report.rule_name,
                error = error.as_deref().unwrap_or("unknown error"),
                "rule execution failed"
            ),
        }
    }

    info!(worker_id, rules = reports.len(), "run-once finished");
    Ok(())
}

async fn build_stores(config: &WorkerConfig) -> AppResult<RuleStores> {
    let Some(database_url) = config.database_url.as_deref() else {
        let repository = Arc::new(InMemoryRuleRepository::new());
        return Ok(RuleStores {
            rules: repository.clone(),
            audit: repository,
        });
    };

    let pool = connect_and_migrate(database_url).await?;
    Ok(RuleStores {
        rules: Arc::new(PostgresRuleRepository::new(pool.clone())),
        audit: Arc::new(PostgresAuditLogRepository::new(pool)),
    })
}

fn build_guard(config: &WorkerConfig) -> AppResult<Arc<dyn ExecutionGuard>> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        return Ok(Arc::new(InProcessExecutionGuard::new()));
    };

    let client = redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    Ok(Arc::new(RedisExecutionGuard::new(
        client,
        RULE_LOCK_KEY_PREFIX,
        config.worker_id.as_str(),
        config.rule_lock_lease_seconds,
    )?))
}

async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

async fn seed_rules(rule_service: &RuleService, seed_path: &Path) -> AppResult<()> {
    if !rule_service.list_rules().await?.is_empty() {
        info!(seed_path = %seed_path.display(), "rule store not empty; skipping seed");
        return Ok(());
    }

    let contents = std::fs::read_to_string(seed_path).map_err(|error| {
        AppError::Validation(format!(
            "failed to read RULES_SEED_PATH '{}': {error}",
            seed_path.display()
        ))
    })?;
    let inputs = serde_json::from_str::<Vec<CreateRuleInput>>(&contents).map_err(|error| {
        AppError::Validation(format!(
            "RULES_SEED_PATH '{}' must hold a JSON array of rules: {error}",
            seed_path.display()
        ))
    })?;

    for input in inputs {
        let rule = rule_service.create_rule(input).await?;
        info!(rule_id = %rule.id(), rule_name = rule.name().as_str(), "seeded rule");
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
