//! Data Transfer Objects (DTOs) for the audit API.
//!
//! Wire types are camelCase JSON and kept separate from the domain model so
//! the API can evolve without touching storage.

pub mod audit;

pub use audit::{
    ActionRepresentation, PageParams, PageResponse, RevertRequest, RevertResponse,
};
