//! # kc-audit
//!
//! Admin change auditing and compensating reverts.
//!
//! Every admin mutation is written to the identity provider first, then the
//! local mirror write and an append-only change record are committed as one
//! unit. A recorded change can later be undone by a *compensating* revert:
//! the inverse change is applied and logged as a new record pointing back at
//! the original, which is flagged as reverted. History is never rewritten.
//!
//! ## Modules
//!
//! - [`canonical`] - Canonical string form of reconciliation records
//! - [`checksum`] - Order-independent SHA-384 checksums
//! - [`clock`] - Wall-clock source
//! - [`error`] - Audit error taxonomy
//! - [`mutation`] - Audited entity writes
//! - [`query`] - Paged log reads
//! - [`reconcile`] - Drift detection job
//! - [`recorder`] - Appending change records
//! - [`revert`] - Revertability rule and compensating reverts
//! - [`upstream`] - Identity provider contract and clients

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod canonical;
pub mod checksum;
pub mod clock;
pub mod error;
pub mod mutation;
pub mod query;
pub mod reconcile;
pub mod recorder;
pub mod revert;
pub mod upstream;

use kc_storage::{AuditStore, MirrorStore};

pub use canonical::Canonicalize;
pub use checksum::{ChecksumReconciler, EMPTY_CHECKSUM};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuditError, AuditResult};
pub use mutation::EntityMutationService;
pub use query::AuditQueryService;
pub use reconcile::{ReconciliationJob, ReconciliationReport};
pub use recorder::{diff, ActionDraft, AuditRecorder};
pub use revert::{validate_reason, RevertExecutor, RevertabilityChecker, MAX_REASON_LENGTH};
pub use upstream::{
    InMemoryUpstream, KeycloakAdminClient, UpstreamEntity, UpstreamError, UpstreamProvider,
};

/// A store that holds both the change log and the mirror.
///
/// Implemented for every type that implements both traits.
pub trait AuditBackend: AuditStore + MirrorStore + 'static {}

impl<T: AuditStore + MirrorStore + 'static> AuditBackend for T {}
