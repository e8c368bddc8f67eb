//! Audit change records.
//!
//! An [`AuditAction`] documents one committed mutation of an entity: who did
//! it, what kind of change it was, and the entity state before and after.
//! Records are immutable apart from a one-time [`RevertAnnotation`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::snapshot::Snapshot;

/// Kind of mutation a record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Entity was created.
    Create,
    /// Entity was modified.
    Update,
    /// Entity was removed.
    Delete,
}

impl ActionType {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Returns the action that undoes this one.
    ///
    /// A create is undone by a delete, a delete by re-creating the entity,
    /// and an update by another update restoring the previous state.
    #[must_use]
    pub const fn compensation(self) -> Self {
        match self {
            Self::Create => Self::Delete,
            Self::Update => Self::Update,
            Self::Delete => Self::Create,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ModelError::unknown("action type", s)),
        }
    }
}

/// Kind of entity a record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// OIDC/SAML client.
    Client,
    /// Realm.
    Realm,
    /// Realm or client role.
    Role,
    /// Group.
    Group,
    /// Identity provider link.
    Idp,
    /// User.
    User,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Client,
        Self::Realm,
        Self::Role,
        Self::Group,
        Self::Idp,
        Self::User,
    ];

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Realm => "REALM",
            Self::Role => "ROLE",
            Self::Group => "GROUP",
            Self::Idp => "IDP",
            Self::User => "USER",
        }
    }

    /// Returns a human-readable label for messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Realm => "Realm",
            Self::Role => "Role",
            Self::Group => "Group",
            Self::Idp => "Identity provider",
            Self::User => "User",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Self::Client),
            "REALM" => Ok(Self::Realm),
            "ROLE" => Ok(Self::Role),
            "GROUP" => Ok(Self::Group),
            "IDP" | "IDENTITY-PROVIDER" | "IDENTITY_PROVIDER" => Ok(Self::Idp),
            "USER" => Ok(Self::User),
            _ => Err(ModelError::unknown("entity type", s)),
        }
    }
}

/// Who performed an action.
///
/// Profile fields are captured at action time; the actor's current profile
/// in the identity provider may since have changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Subject id in the identity provider.
    pub subject_id: String,
    /// Email at action time.
    pub email: Option<String>,
    /// Display name at action time.
    pub display_name: Option<String>,
    /// Token issuer the actor authenticated against.
    pub issuer: Option<String>,
}

impl Actor {
    /// Creates an actor with only a subject id.
    #[must_use]
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: None,
            display_name: None,
            issuer: None,
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

/// The entity a record is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Local mirror id.
    pub entity_id: Uuid,
    /// Id assigned by the identity provider, when known.
    pub idp_id: Option<String>,
    /// Human-readable name (username, client id, role name, ...).
    pub name: String,
    /// Owning realm name.
    pub realm_name: String,
    /// Owning realm id, when known.
    pub realm_id: Option<Uuid>,
}

impl EntityRef {
    /// Creates an entity reference.
    #[must_use]
    pub fn new(entity_id: Uuid, name: impl Into<String>, realm_name: impl Into<String>) -> Self {
        Self {
            entity_id,
            idp_id: None,
            name: name.into(),
            realm_name: realm_name.into(),
            realm_id: None,
        }
    }

    /// Sets the identity provider id.
    #[must_use]
    pub fn with_idp_id(mut self, idp_id: impl Into<String>) -> Self {
        self.idp_id = Some(idp_id.into());
        self
    }

    /// Sets the realm id.
    #[must_use]
    pub const fn with_realm_id(mut self, realm_id: Uuid) -> Self {
        self.realm_id = Some(realm_id);
        self
    }
}

/// Revert state of a record.
///
/// Moves from "not reverted" to "reverted" at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertAnnotation {
    /// Whether the action has been undone.
    pub reverted: bool,
    /// When the revert was committed.
    pub reverted_at: Option<DateTime<Utc>>,
    /// Subject id of the reverting actor.
    pub reverted_by: Option<String>,
    /// Operator-supplied reason.
    pub reason: Option<String>,
}

/// Conditional update applied to the original record when it is reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertMark {
    /// Record being marked.
    pub action_id: Uuid,
    /// Commit time of the revert.
    pub reverted_at: DateTime<Utc>,
    /// Subject id of the reverting actor.
    pub reverted_by: String,
    /// Operator-supplied reason.
    pub reason: String,
}

impl RevertMark {
    /// Returns the annotation this mark produces.
    #[must_use]
    pub fn annotation(&self) -> RevertAnnotation {
        RevertAnnotation {
            reverted: true,
            reverted_at: Some(self.reverted_at),
            reverted_by: Some(self.reverted_by.clone()),
            reason: Some(self.reason.clone()),
        }
    }
}

/// A persisted change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditAction {
    /// Unique id.
    pub id: Uuid,
    /// Store-assigned, strictly increasing ordering key.
    pub sequence: i64,
    /// Wall-clock creation time (display only).
    pub created_at: DateTime<Utc>,
    /// Who performed the action.
    pub actor: Actor,
    /// Kind of mutation.
    pub action_type: ActionType,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Entity the action applies to.
    pub entity: EntityRef,
    /// State before the mutation (absent for creates).
    pub before: Option<Snapshot>,
    /// State after the mutation (absent for deletes).
    pub after: Option<Snapshot>,
    /// Names of fields that differ between `before` and `after`.
    pub changed_fields: Vec<String>,
    /// Revert state.
    pub revert: RevertAnnotation,
    /// Action this record undoes, for compensating records.
    pub reverts_action_id: Option<Uuid>,
}

impl AuditAction {
    /// Checks if the action has been reverted.
    #[must_use]
    pub const fn is_reverted(&self) -> bool {
        self.revert.reverted
    }

    /// Checks if this record was written by a revert.
    #[must_use]
    pub const fn is_compensating(&self) -> bool {
        self.reverts_action_id.is_some()
    }
}

/// A change record that has not been persisted yet.
///
/// The store assigns the ordering sequence when it appends the record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditAction {
    /// Unique id.
    pub id: Uuid,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Who performed the action.
    pub actor: Actor,
    /// Kind of mutation.
    pub action_type: ActionType,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Entity the action applies to.
    pub entity: EntityRef,
    /// State before the mutation.
    pub before: Option<Snapshot>,
    /// State after the mutation.
    pub after: Option<Snapshot>,
    /// Names of changed fields.
    pub changed_fields: Vec<String>,
    /// Action this record undoes, for compensating records.
    pub reverts_action_id: Option<Uuid>,
}

impl NewAuditAction {
    /// Turns the draft into a persisted record with the given sequence.
    #[must_use]
    pub fn into_action(self, sequence: i64) -> AuditAction {
        AuditAction {
            id: self.id,
            sequence,
            created_at: self.created_at,
            actor: self.actor,
            action_type: self.action_type,
            entity_type: self.entity_type,
            entity: self.entity,
            before: self.before,
            after: self.after,
            changed_fields: self.changed_fields,
            revert: RevertAnnotation::default(),
            reverts_action_id: self.reverts_action_id,
        }
    }
}
