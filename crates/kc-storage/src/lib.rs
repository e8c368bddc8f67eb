//! # kc-storage
//!
//! Storage abstraction traits for the admin audit log.
//!
//! This crate defines the storage interfaces that must be implemented by
//! concrete backends (SQL, in-memory).
//!
//! ## Traits
//!
//! - [`AuditStore`] - Append-only change log with atomic mirror writes
//! - [`MirrorStore`] - Read access to the local entity mirror
//!
//! [`InMemoryStore`] implements both behind a single lock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod audit;
pub mod error;
pub mod memory;
pub mod mirror;

pub use audit::{AuditScope, AuditStore};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use mirror::{MirrorEntity, MirrorStore, MirrorWrite};
