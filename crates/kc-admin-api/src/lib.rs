//! # kc-admin-api
//!
//! Admin REST API for browsing and reverting audited changes.
//!
//! ## Modules
//!
//! - [`auth`] - Bearer authentication middleware and permissions
//! - [`dto`] - Data Transfer Objects for API requests/responses
//! - [`error`] - Error types and HTTP error responses
//! - [`policy`] - Access rules for every audit endpoint
//! - [`router`] - Axum router and HTTP handlers
//! - [`state`] - Application state management
//!
//! ## Quick Start
//!
//! ```ignore
//! use kc_admin_api::{audit_router, AuditState, AuthState, StaticTokenValidator};
//! use std::sync::Arc;
//!
//! let state = AuditState::new(store, upstream, Arc::new(SystemClock));
//! let app = audit_router(AuthState::new(validator)).with_state(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ## API Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/admin/audit/actions/me` | Actions performed by the caller |
//! | GET | `/admin/audit/realms/{realm}/actions` | Actions in a realm |
//! | GET | `/admin/audit/actions` | Every action (master realm admins) |
//! | GET | `/admin/audit/entities/{entityType}/{entityId}/actions` | Entity history |
//! | GET | `/admin/audit/actions/{id}` | Single action |
//! | GET | `/admin/audit/actions/{id}/can-revert` | Whether a revert would be accepted |
//! | POST | `/admin/audit/actions/{id}/revert` | Revert an action |
//!
//! Listings accept `page` (default 0) and `size` (default 20, at most 200).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod auth;
pub mod dto;
pub mod error;
pub mod policy;
pub mod router;
pub mod state;

pub use auth::{
    auth_middleware, AdminAuth, AuthState, Permission, StaticTokenValidator, TokenValidator,
    MASTER_REALM,
};
pub use dto::{ActionRepresentation, PageParams, PageResponse, RevertRequest, RevertResponse};
pub use error::{AdminError, AdminResult, ErrorResponse};
pub use policy::{AccessPolicy, AuditOperation};
pub use router::audit_router;
pub use state::AuditState;
