//! # kc-storage-sql
//!
//! SQLx-based storage implementation for the admin audit log.
//!
//! This crate provides `PostgreSQL` storage using `SQLx`. A single
//! [`PgStore`] implements both [`kc_storage::AuditStore`] and
//! [`kc_storage::MirrorStore`] so that mirror writes and log appends share
//! one transaction.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod audit;
mod convert;
mod entities;
mod error;
mod mirror;
pub mod pool;

pub use audit::PgStore;
pub use pool::{PoolConfig, create_pool, run_migrations};
