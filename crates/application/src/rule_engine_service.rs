use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use peerwarden_core::{AppError, AppResult, RuleId};
use peerwarden_domain::RuleDefinition;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::rule_engine_ports::{
    ExecutionGuard, ExecutionPermit, RuleExecutionReport, RuleRepository, RuleRunSummary,
    TickSummary,
};
use crate::rule_runner::RuleRunner;

/// Guard scope shared by manual and scheduled batch runs.
pub const EXECUTE_ACTIVE_RULES_SCOPE: &str = "execute-active-rules";

/// How often a running batch renews its guard.
pub const DEFAULT_LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(60);

/// Entry point for executing stored rules.
#[derive(Clone)]
pub struct RuleEngineService {
    rule_repository: Arc<dyn RuleRepository>,
    runner: RuleRunner,
    guard: Arc<dyn ExecutionGuard>,
    lease_renew_interval: Duration,
}

impl RuleEngineService {
    /// Creates a rule engine service.
    #[must_use]
    pub fn new(
        rule_repository: Arc<dyn RuleRepository>,
        runner: RuleRunner,
        guard: Arc<dyn ExecutionGuard>,
    ) -> Self {
        Self {
            rule_repository,
            runner,
            guard,
            lease_renew_interval: DEFAULT_LEASE_RENEW_INTERVAL,
        }
    }

    /// Overrides how often a running batch renews its guard.
    ///
    /// Must stay below the guard's lease so the scope never lapses mid-batch.
    #[must_use]
    pub fn with_lease_renew_interval(mut self, interval: Duration) -> Self {
        self.lease_renew_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Runs one stored rule by identifier.
    pub async fn run_one(&self, rule_id: RuleId) -> AppResult<RuleRunSummary> {
        let rule = self
            .rule_repository
            .find_rule(rule_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rule '{rule_id}' does not exist")))?;

        self.runner.run(&rule).await
    }

    /// Runs every active rule once, oldest first.
    ///
    /// Returns a conflict error while another batch run holds the guard.
    pub async fn run_all_active(&self) -> AppResult<Vec<RuleExecutionReport>> {
        let Some(permit) = self.guard.try_acquire(EXECUTE_ACTIVE_RULES_SCOPE).await? else {
            return Err(AppError::Conflict(
                "active rule execution is already in progress".to_owned(),
            ));
        };

        let result = self.run_guarded(&permit).await;
        self.release(&permit).await;
        result
    }

    /// Runs one scheduler tick.
    ///
    /// Returns `None` when an overlapping batch run holds the guard. Errors are
    /// captured in the summary so the scheduler loop keeps going.
    pub async fn run_scheduled_tick(&self) -> Option<TickSummary> {
        let started_at = Utc::now();

        let permit = match self.guard.try_acquire(EXECUTE_ACTIVE_RULES_SCOPE).await {
            Ok(Some(permit)) => permit,
            Ok(None) => {
                warn!("previous rule execution still running; skipping scheduled tick");
                return None;
            }
            Err(error) => {
                error!(error = %error, "failed to acquire rule execution guard");
                return Some(TickSummary {
                    started_at,
                    finished_at: Utc::now(),
                    rules_executed: 0,
                    rules_failed: 0,
                    error: Some(error.to_string()),
                });
            }
        };

        let result = self.run_guarded(&permit).await;
        self.release(&permit).await;

        let summary = match result {
            Ok(reports) => {
                let rules_failed = reports
                    .iter()
                    .filter(|report| report.is_failure())
                    .count();
                TickSummary {
                    started_at,
                    finished_at: Utc::now(),
                    rules_executed: reports.len() - rules_failed,
                    rules_failed,
                    error: None,
                }
            }
            Err(error) => {
                error!(error = %error, "failed to list active rules for scheduled tick");
                TickSummary {
                    started_at,
                    finished_at: Utc::now(),
                    rules_executed: 0,
                    rules_failed: 0,
                    error: Some(error.to_string()),
                }
            }
        };

        info!(
            rules_executed = summary.rules_executed,
            rules_failed = summary.rules_failed,
            "scheduled rule tick finished"
        );
        Some(summary)
    }

    async fn run_guarded(&self, permit: &ExecutionPermit) -> AppResult<Vec<RuleExecutionReport>> {
        let batch = self.run_active_rules();
        tokio::pin!(batch);

        let mut heartbeat = tokio::time::interval(self.lease_renew_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut batch => return result,
                _ = heartbeat.tick() => self.renew(permit).await,
            }
        }
    }

    async fn run_active_rules(&self) -> AppResult<Vec<RuleExecutionReport>> {
        let records = self.rule_repository.list_active_rules().await?;

        let mut reports = Vec::with_capacity(records.len());
        for record in records {
            let report = match record.decoded {
                Ok(rule) => self.run_isolated(&rule).await,
                Err(error) => failed_report(record.rule_id, record.rule_name, &error),
            };
            reports.push(report);
        }

        Ok(reports)
    }

    async fn run_isolated(&self, rule: &RuleDefinition) -> RuleExecutionReport {
        match self.runner.run(rule).await {
            Ok(summary) => RuleExecutionReport {
                rule_id: rule.id(),
                rule_name: rule.name().as_str().to_owned(),
                summary: Some(summary),
                error: None,
            },
            Err(error) => failed_report(rule.id(), rule.name().as_str().to_owned(), &error),
        }
    }

    async fn renew(&self, permit: &ExecutionPermit) {
        match self.guard.renew(permit).await {
            Ok(true) => debug!(
                scope_key = permit.scope_key.as_str(),
                "renewed rule execution guard"
            ),
            Ok(false) => warn!(
                scope_key = permit.scope_key.as_str(),
                "rule execution guard lapsed before the batch finished"
            ),
            Err(error) => warn!(
                scope_key = permit.scope_key.as_str(),
                error = %error,
                "failed to renew rule execution guard"
            ),
        }
    }

    async fn release(&self, permit: &ExecutionPermit) {
        if let Err(error) = self.guard.release(permit).await {
            warn!(
                scope_key = permit.scope_key.as_str(),
                error = %error,
                "failed to release rule execution guard"
            );
        }
    }
}

fn failed_report(rule_id: RuleId, rule_name: String, error: &AppError) -> RuleExecutionReport {
    warn!(
        rule_id = %rule_id,
        rule_name = rule_name.as_str(),
        error = %error,
        "rule run failed"
    );

    RuleExecutionReport {
        rule_id,
        rule_name,
        summary: None,
        error: Some(error.to_string()),
    }
}
