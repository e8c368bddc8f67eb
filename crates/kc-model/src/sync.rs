//! Comparable views of users and groups used for drift detection.
//!
//! These records carry only the fields that participate in reconciliation.
//! Both are read from a [`Snapshot`] so the identity provider listing and the
//! local mirror listing go through the same extraction.

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// Reconciliation view of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSyncRecord {
    /// Login name.
    pub user_name: Option<String>,
    /// Identifier in the originating directory.
    pub external_id: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Phone number.
    pub phone_number: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Whether the account is active.
    pub active: Option<bool>,
}

impl UserSyncRecord {
    /// Creates a record with only a user name.
    #[must_use]
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: Some(user_name.into()),
            ..Self::default()
        }
    }

    /// Reads the comparable fields out of a user snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let text = |key: &str| snapshot.text(key).map(str::to_string);
        Self {
            user_name: text("userName").or_else(|| text("username")),
            external_id: text("externalId"),
            given_name: text("givenName").or_else(|| text("firstName")),
            family_name: text("familyName").or_else(|| text("lastName")),
            display_name: text("displayName"),
            phone_number: text("phoneNumber"),
            title: text("title"),
            active: snapshot.flag("active").or_else(|| snapshot.flag("enabled")),
        }
    }
}

/// Reconciliation view of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSyncRecord {
    /// Display name.
    pub display_name: Option<String>,
    /// Identifier in the originating directory.
    pub external_id: Option<String>,
}

impl GroupSyncRecord {
    /// Reads the comparable fields out of a group snapshot.
    ///
    /// `displayName` falls back to `name`.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            display_name: snapshot
                .text("displayName")
                .or_else(|| snapshot.text("name"))
                .map(str::to_string),
            external_id: snapshot.text("externalId").map(str::to_string),
        }
    }
}
