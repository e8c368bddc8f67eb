//! Drift detection between the identity provider and the mirror.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kc_model::{EntityType, GroupSyncRecord, Snapshot, UserSyncRecord};
use kc_storage::MirrorStore;
use serde::Serialize;

use crate::canonical::Canonicalize;
use crate::checksum::ChecksumReconciler;
use crate::clock::Clock;
use crate::error::AuditResult;
use crate::upstream::UpstreamProvider;

/// Entity types compared by the reconciliation job.
pub const RECONCILED_TYPES: [EntityType; 2] = [EntityType::User, EntityType::Group];

/// Outcome of comparing one entity type in one realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Realm compared.
    pub realm: String,
    /// Entity type compared.
    pub entity_type: EntityType,
    /// Checksum of the identity provider listing.
    pub upstream_checksum: String,
    /// Checksum of the mirror listing.
    pub mirror_checksum: String,
    /// Entities listed by the identity provider.
    pub upstream_count: usize,
    /// Entities listed by the mirror.
    pub mirror_count: usize,
    /// True when both checksums agree.
    pub in_sync: bool,
    /// When the comparison ran.
    pub checked_at: DateTime<Utc>,
}

/// Compares identity provider and mirror listings by checksum.
pub struct ReconciliationJob<S, U> {
    mirror: Arc<S>,
    upstream: Arc<U>,
    clock: Arc<dyn Clock>,
}

impl<S, U> Clone for ReconciliationJob<S, U> {
    fn clone(&self) -> Self {
        Self {
            mirror: Arc::clone(&self.mirror),
            upstream: Arc::clone(&self.upstream),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: MirrorStore, U: UpstreamProvider> ReconciliationJob<S, U> {
    /// Creates a job.
    pub fn new(mirror: Arc<S>, upstream: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            mirror,
            upstream,
            clock,
        }
    }

    /// Compares users and groups in `realm`.
    ///
    /// # Errors
    ///
    /// Returns an error if either listing fails.
    pub async fn run(&self, realm: &str) -> AuditResult<Vec<ReconciliationReport>> {
        let mut reports = Vec::with_capacity(RECONCILED_TYPES.len());
        for entity_type in RECONCILED_TYPES {
            reports.push(self.compare(realm, entity_type).await?);
        }
        Ok(reports)
    }

    async fn compare(&self, realm: &str, entity_type: EntityType) -> AuditResult<ReconciliationReport> {
        let upstream: Vec<Snapshot> = self
            .upstream
            .list(realm, entity_type)
            .await?
            .into_iter()
            .map(|entity| entity.state)
            .collect();
        let mirror: Vec<Snapshot> = self
            .mirror
            .list_entities(entity_type, realm)
            .await?
            .into_iter()
            .map(|entity| entity.state)
            .collect();

        let (upstream_checksum, mirror_checksum) = match entity_type {
            EntityType::Group => (
                checksum_of(&upstream, GroupSyncRecord::from_snapshot),
                checksum_of(&mirror, GroupSyncRecord::from_snapshot),
            ),
            _ => (
                checksum_of(&upstream, UserSyncRecord::from_snapshot),
                checksum_of(&mirror, UserSyncRecord::from_snapshot),
            ),
        };

        let report = ReconciliationReport {
            realm: realm.to_string(),
            entity_type,
            in_sync: upstream_checksum == mirror_checksum,
            upstream_checksum,
            mirror_checksum,
            upstream_count: upstream.len(),
            mirror_count: mirror.len(),
            checked_at: self.clock.now(),
        };

        if report.in_sync {
            tracing::debug!(realm, %entity_type, count = report.upstream_count, "mirror in sync");
        } else {
            tracing::warn!(
                realm,
                %entity_type,
                upstream_count = report.upstream_count,
                mirror_count = report.mirror_count,
                upstream_checksum = %report.upstream_checksum,
                mirror_checksum = %report.mirror_checksum,
                "mirror drift detected"
            );
        }
        Ok(report)
    }
}

fn checksum_of<R: Canonicalize>(states: &[Snapshot], project: fn(&Snapshot) -> R) -> String {
    let records: Vec<R> = states.iter().map(project).collect();
    ChecksumReconciler::compute_checksum(&records)
}
