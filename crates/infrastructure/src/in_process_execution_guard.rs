use std::collections::HashMap;

use async_trait::async_trait;
use peerwarden_application::{ExecutionGuard, ExecutionPermit};
use peerwarden_core::AppResult;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Single-flight guard for one worker process.
#[derive(Debug, Default)]
pub struct InProcessExecutionGuard {
    holders: Mutex<HashMap<String, String>>,
}

impl InProcessExecutionGuard {
    /// Creates a guard with no scope held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionGuard for InProcessExecutionGuard {
    async fn try_acquire(&self, scope_key: &str) -> AppResult<Option<ExecutionPermit>> {
        let mut holders = self.holders.lock().await;
        if holders.contains_key(scope_key) {
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        holders.insert(scope_key.to_owned(), token.clone());

        Ok(Some(ExecutionPermit {
            scope_key: scope_key.to_owned(),
            token,
        }))
    }

    async fn renew(&self, permit: &ExecutionPermit) -> AppResult<bool> {
        let holders = self.holders.lock().await;
        Ok(holders.get(permit.scope_key.as_str()) == Some(&permit.token))
    }

    async fn release(&self, permit: &ExecutionPermit) -> AppResult<()> {
        let mut holders = self.holders.lock().await;
        if holders.get(permit.scope_key.as_str()) == Some(&permit.token) {
            holders.remove(permit.scope_key.as_str());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use peerwarden_application::{ExecutionGuard, ExecutionPermit};

    use super::InProcessExecutionGuard;

    #[tokio::test]
    async fn scope_is_exclusive_until_released() {
        let guard = InProcessExecutionGuard::new();

        let permit = guard.try_acquire("execute-active-rules").await;
        assert!(permit.is_ok());
        let Some(permit) = permit.unwrap_or_default() else {
            unreachable!();
        };

        assert!(
            guard
                .try_acquire("execute-active-rules")
                .await
                .is_ok_and(|permit| permit.is_none())
        );
        assert!(
            guard
                .try_acquire("other-scope")
                .await
                .is_ok_and(|permit| permit.is_some())
        );

        assert!(guard.renew(&permit).await.is_ok_and(|renewed| renewed));
        assert!(guard.release(&permit).await.is_ok());
        assert!(guard.renew(&permit).await.is_ok_and(|renewed| !renewed));
        assert!(
            guard
                .try_acquire("execute-active-rules")
                .await
                .is_ok_and(|permit| permit.is_some())
        );
    }

    #[tokio::test]
    async fn stale_permit_does_not_release_new_holder() {
        let guard = InProcessExecutionGuard::new();
        let _held = guard.try_acquire("execute-active-rules").await;

        let stale = ExecutionPermit {
            scope_key: "execute-active-rules".to_owned(),
            token: "stale".to_owned(),
        };
        assert!(guard.release(&stale).await.is_ok());
        assert!(guard.renew(&stale).await.is_ok_and(|renewed| !renewed));

        assert!(
            guard
                .try_acquire("execute-active-rules")
                .await
                .is_ok_and(|permit| permit.is_none())
        );
    }
}
