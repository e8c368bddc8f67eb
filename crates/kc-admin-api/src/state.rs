//! Audit API state.

use std::sync::Arc;

use kc_audit::{
    AuditBackend, AuditQueryService, Clock, RevertExecutor, RevertabilityChecker,
    UpstreamProvider,
};

use crate::policy::AccessPolicy;

/// Services shared by the audit handlers.
///
/// Generic over the store `S` and identity provider `U`; every field is
/// cheap to clone.
pub struct AuditState<S, U> {
    /// Paged log reads.
    pub queries: AuditQueryService<S>,
    /// Revertability rule.
    pub checker: RevertabilityChecker<S>,
    /// Compensating reverts.
    pub executor: RevertExecutor<S, U>,
    /// Access rules.
    pub policy: AccessPolicy,
}

// Manual Clone implementation that doesn't require S: Clone or U: Clone
impl<S, U> Clone for AuditState<S, U> {
    fn clone(&self) -> Self {
        Self {
            queries: self.queries.clone(),
            checker: self.checker.clone(),
            executor: self.executor.clone(),
            policy: self.policy,
        }
    }
}

impl<S, U> AuditState<S, U>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    /// Creates the state from a store, an identity provider and a clock.
    pub fn new(store: Arc<S>, upstream: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queries: AuditQueryService::new(Arc::clone(&store)),
            checker: RevertabilityChecker::new(Arc::clone(&store)),
            executor: RevertExecutor::new(store, upstream, clock),
            policy: AccessPolicy,
        }
    }
}
