//! # kc-cli
//!
//! Command-line client for the Keycloak admin audit service.
//!
//! This crate provides command-line utilities for:
//! - Listing change records (own, per realm, global, per entity)
//! - Checking revertability and reverting a change with a reason
//! - Computing reconciliation checksums over exported listings
//! - Managing the local CLI configuration

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::future_not_send)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
