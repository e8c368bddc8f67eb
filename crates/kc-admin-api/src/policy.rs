//! Access rules for every audit endpoint.
//!
//! | Operation | Requirement |
//! |-----------|-------------|
//! | own actions | authenticated |
//! | realm actions | `view-events`, realm reachable |
//! | global actions | `realm-admin` in the master realm |
//! | entity history | `view-events` |
//! | single action, can-revert | own action, or `view-events` with realm reachable |
//! | revert | `manage-events` and the entity kind's manage role, realm reachable |

use kc_model::AuditAction;

use crate::auth::{AdminAuth, Permission, MASTER_REALM};
use crate::error::{AdminError, AdminResult};

/// Something a caller is trying to do.
#[derive(Debug, Clone, Copy)]
pub enum AuditOperation<'a> {
    /// List the caller's own actions.
    ViewOwn,
    /// List actions in a realm.
    ViewRealm(&'a str),
    /// List every action.
    ViewGlobal,
    /// List one entity's history.
    ViewEntity,
    /// Read one action.
    ViewAction(&'a AuditAction),
    /// Revert one action.
    Revert(&'a AuditAction),
}

/// Evaluates access for audit operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    /// Checks that `auth` may perform `operation`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` naming the missing requirement.
    pub fn authorize(&self, auth: &AdminAuth, operation: AuditOperation<'_>) -> AdminResult<()> {
        let allowed = match operation {
            AuditOperation::ViewOwn => Ok(()),
            AuditOperation::ViewRealm(realm) => {
                Self::require(auth, Permission::ViewEvents).and_then(|()| Self::reach(auth, realm))
            }
            AuditOperation::ViewGlobal => {
                if auth.realm == MASTER_REALM && auth.has_permission(Permission::RealmAdmin) {
                    Ok(())
                } else {
                    Err(AdminError::Forbidden(
                        "global audit access requires realm-admin in the master realm".to_string(),
                    ))
                }
            }
            AuditOperation::ViewEntity => Self::require(auth, Permission::ViewEvents),
            AuditOperation::ViewAction(action) => {
                if action.actor.subject_id == auth.subject_id {
                    Ok(())
                } else {
                    Self::require(auth, Permission::ViewEvents)
                        .and_then(|()| Self::reach(auth, &action.entity.realm_name))
                }
            }
            AuditOperation::Revert(action) => Self::require(auth, Permission::ManageEvents)
                .and_then(|()| Self::require(auth, Permission::manage(action.entity_type)))
                .and_then(|()| Self::reach(auth, &action.entity.realm_name)),
        };

        if let Err(err) = &allowed {
            tracing::info!(subject_id = %auth.subject_id, ?operation, reason = %err, "audit access denied");
        }
        allowed
    }

    fn require(auth: &AdminAuth, permission: Permission) -> AdminResult<()> {
        if auth.has_permission(permission) {
            Ok(())
        } else {
            Err(AdminError::Forbidden(format!(
                "Missing required permission: {}",
                permission.role_name()
            )))
        }
    }

    fn reach(auth: &AdminAuth, realm: &str) -> AdminResult<()> {
        if auth.can_access_realm(realm) {
            Ok(())
        } else {
            Err(AdminError::Forbidden(format!("No access to realm '{realm}'")))
        }
    }
}
