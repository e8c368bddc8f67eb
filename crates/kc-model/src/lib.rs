//! # kc-model
//!
//! Domain models for the admin audit log.
//!
//! This crate defines the change record and the value types that flow
//! through recording, querying, reverting and reconciliation.
//!
//! ## Modules
//!
//! - [`action`] - Change records, classification enums, actor, revert annotation
//! - [`snapshot`] - Schema-less entity state and its versioned codec
//! - [`sync`] - Comparable user and group views for drift detection
//! - [`page`] - Pagination request and result types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod action;
pub mod error;
pub mod page;
pub mod snapshot;
pub mod sync;

pub use action::{
    ActionType, Actor, AuditAction, EntityRef, EntityType, NewAuditAction, RevertAnnotation,
    RevertMark,
};
pub use error::ModelError;
pub use page::{Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use snapshot::{FieldValue, Snapshot};
pub use sync::{GroupSyncRecord, UserSyncRecord};
