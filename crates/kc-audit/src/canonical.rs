//! Canonical string form of reconciliation records.
//!
//! Each record renders its comparable fields in a fixed order, joined with
//! `|`. Absent fields render as an empty segment and booleans as lowercase
//! `true` / `false`. The field order and rendering are part of the
//! reconciliation contract; both sides of a comparison must agree on them.
//!
//! | Record | Field order |
//! |--------|-------------|
//! | user | `userName\|externalId\|givenName\|familyName\|displayName\|phoneNumber\|title\|active` |
//! | group | `displayName\|externalId` |

use kc_model::{GroupSyncRecord, UserSyncRecord};

/// Segment separator.
pub const SEPARATOR: &str = "|";

/// Produces the canonical string form of a record.
pub trait Canonicalize {
    /// Renders the comparable fields in their documented order.
    fn canonicalize(&self) -> String;
}

fn text(value: Option<&str>) -> &str {
    value.unwrap_or_default()
}

const fn flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "true",
        Some(false) => "false",
        None => "",
    }
}

impl Canonicalize for UserSyncRecord {
    fn canonicalize(&self) -> String {
        [
            text(self.user_name.as_deref()),
            text(self.external_id.as_deref()),
            text(self.given_name.as_deref()),
            text(self.family_name.as_deref()),
            text(self.display_name.as_deref()),
            text(self.phone_number.as_deref()),
            text(self.title.as_deref()),
            flag(self.active),
        ]
        .join(SEPARATOR)
    }
}

impl Canonicalize for GroupSyncRecord {
    fn canonicalize(&self) -> String {
        [
            text(self.display_name.as_deref()),
            text(self.external_id.as_deref()),
        ]
        .join(SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_user() {
        let mut user = UserSyncRecord::new("test@example.com");
        user.active = Some(true);

        assert_eq!(user.canonicalize(), "test@example.com|||||||true");
    }

    #[test]
    fn full_user() {
        let user = UserSyncRecord {
            user_name: Some("test@example.com".into()),
            external_id: Some("ext-1".into()),
            given_name: Some("Test".into()),
            family_name: Some("User".into()),
            display_name: Some("Test User".into()),
            phone_number: Some("+1-555-0100".into()),
            title: Some("Engineer".into()),
            active: Some(false),
        };

        assert_eq!(
            user.canonicalize(),
            "test@example.com|ext-1|Test|User|Test User|+1-555-0100|Engineer|false"
        );
    }

    #[test]
    fn absent_fields_are_empty_not_null() {
        let user = UserSyncRecord::default();
        assert_eq!(user.canonicalize(), "|||||||");
        assert!(!user.canonicalize().contains("null"));
    }

    #[test]
    fn group() {
        let group = GroupSyncRecord {
            display_name: Some("Operators".into()),
            external_id: None,
        };
        assert_eq!(group.canonicalize(), "Operators|");
    }
}
