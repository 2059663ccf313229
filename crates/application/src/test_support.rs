//! Shared in-memory fakes for service tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use peerwarden_core::{AppError, AppResult, RuleId};
use peerwarden_domain::{ConditionSet, Peer, RuleAction, RuleDefinition, RuleDefinitionInput};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::rule_engine_ports::{
    ActionOutcome, ExecutionGuard, ExecutionPermit, NewRuleAuditEntry, PeerActionDispatcher,
    PeerControl, PeerSource, RuleAuditEntry, RuleAuditPage, RuleAuditQuery, RuleAuditRepository,
    RuleRepository, StoredRule,
};

pub(crate) fn peer(value: Value) -> Peer {
    Peer::from_value(value).unwrap_or_default()
}

fn sample_peer(id: u64, pingtime: f64, inbound: bool) -> Peer {
    peer(json!({
        "id": id,
        "addr": format!("203.0.113.{id}:8333"),
        "pingtime": pingtime,
        "inbound": inbound,
    }))
}

pub(crate) fn sample_peers() -> Vec<Peer> {
    vec![
        sample_peer(1, 0.9, true),
        sample_peer(2, 0.1, true),
        sample_peer(3, 1.4, false),
        sample_peer(4, 2.2, true),
    ]
}

pub(crate) fn rule(
    name: &str,
    conditions: Value,
    action: RuleAction,
    is_active: bool,
) -> RuleDefinition {
    RuleDefinition::new(RuleDefinitionInput {
        name: name.to_owned(),
        description: None,
        conditions: ConditionSet::from_value(&conditions).unwrap_or_default(),
        action,
        is_active,
    })
    .unwrap_or_else(|_| unreachable!())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlCall {
    Ban {
        address: String,
        duration_seconds: u64,
    },
    Disconnect {
        peer_id: String,
    },
}

#[derive(Default)]
enum ControlMode {
    #[default]
    Succeed,
    Fail(String),
    Hang(Duration),
}

#[derive(Default)]
pub(crate) struct FakePeerControl {
    mode: ControlMode,
    calls: Mutex<Vec<ControlCall>>,
}

impl FakePeerControl {
    pub(crate) fn failing(message: &str) -> Self {
        Self {
            mode: ControlMode::Fail(message.to_owned()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn hanging(delay: Duration) -> Self {
        Self {
            mode: ControlMode::Hang(delay),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn calls(&self) -> Vec<ControlCall> {
        self.calls.lock().await.clone()
    }

    async fn respond(&self, call: ControlCall, message: String) -> AppResult<ActionOutcome> {
        self.calls.lock().await.push(call);

        match &self.mode {
            ControlMode::Succeed => Ok(ActionOutcome::succeeded(message)),
            ControlMode::Fail(error) => Err(AppError::Internal(error.clone())),
            ControlMode::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ActionOutcome::succeeded(message))
            }
        }
    }
}

#[async_trait]
impl PeerControl for FakePeerControl {
    async fn ban(&self, address: &str, duration_seconds: u64) -> AppResult<ActionOutcome> {
        self.respond(
            ControlCall::Ban {
                address: address.to_owned(),
                duration_seconds,
            },
            format!("Banned {address} for {duration_seconds} seconds"),
        )
        .await
    }

    async fn disconnect(&self, peer_id: &str) -> AppResult<ActionOutcome> {
        self.respond(
            ControlCall::Disconnect {
                peer_id: peer_id.to_owned(),
            },
            format!("Disconnected peer {peer_id}"),
        )
        .await
    }
}

/// Peer source that fails on selected 1-based call numbers.
#[derive(Default)]
pub(crate) struct FakePeerSource {
    peers: Vec<Peer>,
    failing_calls: HashSet<usize>,
    calls: AtomicUsize,
}

impl FakePeerSource {
    pub(crate) fn new(peers: Vec<Peer>) -> Self {
        Self {
            peers,
            failing_calls: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_on_call(mut self, call_number: usize) -> Self {
        self.failing_calls.insert(call_number);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerSource for FakePeerSource {
    async fn list_peers(&self) -> AppResult<Vec<Peer>> {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_calls.contains(&call_number) {
            return Err(AppError::Internal("getpeerinfo failed".to_owned()));
        }

        Ok(self.peers.clone())
    }
}

/// Dispatcher that succeeds except on selected 1-based dispatch numbers.
#[derive(Default)]
pub(crate) struct ScriptedDispatcher {
    failing_dispatches: HashSet<usize>,
    delay: Option<Duration>,
    dispatched: Mutex<Vec<Option<String>>>,
}

impl ScriptedDispatcher {
    pub(crate) fn failing_on(dispatch_number: usize) -> Self {
        Self {
            failing_dispatches: HashSet::from([dispatch_number]),
            delay: None,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            failing_dispatches: HashSet::new(),
            delay: Some(delay),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn dispatched_peer_ids(&self) -> Vec<Option<String>> {
        self.dispatched.lock().await.clone()
    }
}

#[async_trait]
impl PeerActionDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, peer: &Peer, action: &RuleAction) -> AppResult<ActionOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut dispatched = self.dispatched.lock().await;
        dispatched.push(peer.id());
        if self.failing_dispatches.contains(&dispatched.len()) {
            return Err(AppError::Internal("connection reset".to_owned()));
        }

        Ok(ActionOutcome::succeeded(format!(
            "{} applied to {}",
            action.action_type(),
            peer.id().unwrap_or_default()
        )))
    }
}

/// Rule and audit store sharing one lock scope, so deletes cascade.
#[derive(Default)]
pub(crate) struct FakeRuleStore {
    rules: Mutex<Vec<RuleDefinition>>,
    corrupt_rules: Mutex<Vec<(usize, RuleId, String)>>,
    audit_entries: Mutex<Vec<RuleAuditEntry>>,
    fail_audit_appends: AtomicBool,
    fail_listing: AtomicBool,
}

impl FakeRuleStore {
    pub(crate) fn fail_audit_appends(&self) {
        self.fail_audit_appends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn audit_entries(&self) -> Vec<RuleAuditEntry> {
        self.audit_entries.lock().await.clone()
    }

    pub(crate) async fn seed(&self, rule: RuleDefinition) -> RuleDefinition {
        self.insert_rule(rule).await.unwrap_or_else(|_| unreachable!())
    }

    /// Stores an active row whose actions no longer decode, after the rules seeded so far.
    pub(crate) async fn seed_corrupt(&self, name: &str) -> RuleId {
        let rule_id = RuleId::new();
        let position = self.rules.lock().await.len();
        self.corrupt_rules
            .lock()
            .await
            .push((position, rule_id, name.to_owned()));
        rule_id
    }
}

#[async_trait]
impl RuleRepository for FakeRuleStore {
    async fn insert_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition> {
        let mut rules = self.rules.lock().await;
        if rules.iter().any(|stored| stored.id() == rule.id()) {
            return Err(AppError::Conflict(format!(
                "rule '{}' already exists",
                rule.id()
            )));
        }

        rules.push(rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition> {
        let mut rules = self.rules.lock().await;
        let Some(stored) = rules.iter_mut().find(|stored| stored.id() == rule.id()) else {
            return Err(AppError::NotFound(format!(
                "rule '{}' does not exist",
                rule.id()
            )));
        };

        let updated = rule.with_timestamps(stored.created_at(), Utc::now());
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_rule(&self, rule_id: RuleId) -> AppResult<Option<RuleDefinition>> {
        Ok(self
            .rules
            .lock()
            .await
            .iter()
            .find(|rule| rule.id() == rule_id)
            .cloned())
    }

    async fn list_rules(&self) -> AppResult<Vec<RuleDefinition>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("rule store unavailable".to_owned()));
        }

        Ok(self.rules.lock().await.clone())
    }

    async fn list_active_rules(&self) -> AppResult<Vec<StoredRule>> {
        let rules = self.list_rules().await?;
        let corrupt_rules = self.corrupt_rules.lock().await;

        let mut keyed: Vec<((usize, u8), StoredRule)> = rules
            .into_iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_active())
            .map(|(index, rule)| ((index, 1), StoredRule::decoded(rule)))
            .collect();
        keyed.extend(corrupt_rules.iter().map(|(position, rule_id, name)| {
            let record = StoredRule {
                rule_id: *rule_id,
                rule_name: name.clone(),
                decoded: Err(AppError::Internal(format!(
                    "stored actions for rule '{rule_id}' are corrupt"
                ))),
            };
            ((*position, 0), record)
        }));
        keyed.sort_by_key(|(key, _)| *key);

        Ok(keyed.into_iter().map(|(_, record)| record).collect())
    }

    async fn delete_rule(&self, rule_id: RuleId) -> AppResult<()> {
        let mut rules = self.rules.lock().await;
        let before = rules.len();
        rules.retain(|rule| rule.id() != rule_id);
        if rules.len() == before {
            return Err(AppError::NotFound(format!(
                "rule '{rule_id}' does not exist"
            )));
        }

        self.audit_entries
            .lock()
            .await
            .retain(|entry| entry.rule_id != rule_id);
        Ok(())
    }
}

#[async_trait]
impl RuleAuditRepository for FakeRuleStore {
    async fn append_entry(&self, entry: NewRuleAuditEntry) -> AppResult<RuleAuditEntry> {
        if self.fail_audit_appends.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit table locked".to_owned()));
        }

        let stored = RuleAuditEntry::from_new(Uuid::new_v4(), entry);
        self.audit_entries.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_entries(&self, query: RuleAuditQuery) -> AppResult<RuleAuditPage> {
        let entries = self.audit_entries.lock().await;
        let matching: Vec<RuleAuditEntry> = entries
            .iter()
            .rev()
            .filter(|entry| query.rule_id.is_none_or(|rule_id| entry.rule_id == rule_id))
            .cloned()
            .collect();

        Ok(RuleAuditPage {
            total: u64::try_from(matching.len()).unwrap_or(u64::MAX),
            entries: matching
                .into_iter()
                .skip(query.effective_offset())
                .take(query.effective_limit())
                .collect(),
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeExecutionGuard {
    held: Mutex<HashSet<String>>,
    renewals: AtomicUsize,
}

impl FakeExecutionGuard {
    pub(crate) async fn hold(&self, scope_key: &str) {
        self.held.lock().await.insert(scope_key.to_owned());
    }

    pub(crate) async fn is_held(&self, scope_key: &str) -> bool {
        self.held.lock().await.contains(scope_key)
    }

    pub(crate) fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionGuard for FakeExecutionGuard {
    async fn try_acquire(&self, scope_key: &str) -> AppResult<Option<ExecutionPermit>> {
        if !self.held.lock().await.insert(scope_key.to_owned()) {
            return Ok(None);
        }

        Ok(Some(ExecutionPermit {
            scope_key: scope_key.to_owned(),
            token: Uuid::new_v4().to_string(),
        }))
    }

    async fn renew(&self, permit: &ExecutionPermit) -> AppResult<bool> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(self.held.lock().await.contains(&permit.scope_key))
    }

    async fn release(&self, permit: &ExecutionPermit) -> AppResult<()> {
        self.held.lock().await.remove(&permit.scope_key);
        Ok(())
    }
}
