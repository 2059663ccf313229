use async_trait::async_trait;
use peerwarden_core::AppResult;

/// Proof that the holder owns one single-flight scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPermit {
    /// Guarded scope key.
    pub scope_key: String,
    /// Holder-specific token used for compare-and-release.
    pub token: String,
}

/// Single-flight guard for rule execution.
#[async_trait]
pub trait ExecutionGuard: Send + Sync {
    /// Acquires the scope, returning `None` while another holder owns it.
    async fn try_acquire(&self, scope_key: &str) -> AppResult<Option<ExecutionPermit>>;

    /// Extends a held scope.
    ///
    /// Returns `false` once the permit no longer owns the scope.
    async fn renew(&self, permit: &ExecutionPermit) -> AppResult<bool>;

    /// Releases a previously acquired scope.
    async fn release(&self, permit: &ExecutionPermit) -> AppResult<()>;
}
