//! Redis-backed single-flight lease for rule execution shared across workers.

use async_trait::async_trait;
use peerwarden_application::{ExecutionGuard, ExecutionPermit};
use peerwarden_core::{AppError, AppResult};
use redis::Script;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the rule execution guard.
///
/// The lease carries a TTL so a crashed holder cannot block execution forever.
/// Long batches keep it alive through `renew`.
#[derive(Clone)]
pub struct RedisExecutionGuard {
    client: redis::Client,
    key_prefix: String,
    holder_id: String,
    lease_seconds: u64,
}

impl RedisExecutionGuard {
    /// Creates one guard adapter.
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        holder_id: impl Into<String>,
        lease_seconds: u64,
    ) -> AppResult<Self> {
        let holder_id = holder_id.into();
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "rule execution lease holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "rule execution lease_seconds must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            holder_id,
            lease_seconds,
        })
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }
}

#[async_trait]
impl ExecutionGuard for RedisExecutionGuard {
    async fn try_acquire(&self, scope_key: &str) -> AppResult<Option<ExecutionPermit>> {
        if scope_key.trim().is_empty() {
            return Err(AppError::Validation(
                "rule execution lease scope_key must not be empty".to_owned(),
            ));
        }

        let key = self.key_for(scope_key);
        let token = format!("{}:{}", self.holder_id, uuid::Uuid::new_v4());

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(key.as_str())
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire rule execution lease: {error}"))
            })?;

        if acquired.is_none() {
            return Ok(None);
        }

        Ok(Some(ExecutionPermit {
            scope_key: scope_key.to_owned(),
            token,
        }))
    }

    async fn renew(&self, permit: &ExecutionPermit) -> AppResult<bool> {
        let key = self.key_for(permit.scope_key.as_str());
        let script = Script::new(RENEW_LEASE_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let renewed = script
            .key(key)
            .arg(permit.token.as_str())
            .arg(self.lease_seconds)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to renew rule execution lease: {error}"))
            })?;

        Ok(renewed > 0)
    }

    async fn release(&self, permit: &ExecutionPermit) -> AppResult<()> {
        let key = self.key_for(permit.scope_key.as_str());
        let script = Script::new(RELEASE_LEASE_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        script
            .key(key)
            .arg(permit.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release rule execution lease: {error}"))
            })?;

        Ok(())
    }
}
