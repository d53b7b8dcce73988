//! Role capabilities as an 8-bit permission set.
//!
//! A role grants the bitwise OR of its permissions. Checks are subset tests, so
//! a composite such as `COMMENT | CHECK_DOWNLOAD` passes only when every bit in
//! it is held.

use bitflags::bitflags;

bitflags! {
    /// Permission bits as stored in `roles.permissions`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct Permission: u8 {
        /// Browse courses and download chapter assets
        const CHECK_DOWNLOAD    = 0x01;
        /// Post comments on chapters
        const COMMENT           = 0x02;
        /// Create, edit and delete categories, courses and chapters
        const MODERATE_COURSES  = 0x04;
        /// Approve and edit other users' comments
        const MODERATE_COMMENTS = 0x08;
        /// Freeze users
        const FREEZE            = 0x10;
        /// Read access statistics
        const QUERY_STATISTICS  = 0x20;
        /// Full administrative access
        const ADMINISTER        = 0x80;
    }
}

impl Permission {
    /// Every bit set, including the unnamed 0x40. This is what the
    /// administrator role carries and how it is found at registration time.
    pub const FULL: Self = Self::from_bits_retain(0xff);

    /// Rebuild from a stored integer, keeping bits that have no name.
    pub fn from_stored(bits: i64) -> Self {
        Self::from_bits_retain((bits & 0xff) as u8)
    }

    pub fn to_stored(self) -> i64 {
        i64::from(self.bits())
    }

    /// `(self & required) == required`
    pub fn can(self, required: Permission) -> bool {
        self.contains(required)
    }

    /// Adds `p`. Returns whether the set changed.
    pub fn grant(&mut self, p: Permission) -> bool {
        let before = *self;
        self.insert(p);
        before != *self
    }

    /// Removes `p`. Returns whether the set changed.
    pub fn revoke(&mut self, p: Permission) -> bool {
        let before = *self;
        self.remove(p);
        before != *self
    }

    /// Parse a single permission by its snake_case name.
    pub fn from_snake_name(name: &str) -> Option<Self> {
        match name {
            "check_download" => Some(Self::CHECK_DOWNLOAD),
            "comment" => Some(Self::COMMENT),
            "moderate_courses" => Some(Self::MODERATE_COURSES),
            "moderate_comments" => Some(Self::MODERATE_COMMENTS),
            "freeze" => Some(Self::FREEZE),
            "query_statistics" => Some(Self::QUERY_STATISTICS),
            "administer" => Some(Self::ADMINISTER),
            _ => None,
        }
    }
}

/// One entry of the fixed role catalog seeded at startup.
#[derive(Debug, Clone, Copy)]
pub struct RoleSeed {
    pub name: &'static str,
    pub permissions: Permission,
    pub is_default: bool,
}

/// Roles created on first start. Exactly one is the default.
pub const ROLE_CATALOG: [RoleSeed; 4] = [
    RoleSeed {
        name: "User",
        permissions: Permission::CHECK_DOWNLOAD.union(Permission::COMMENT),
        is_default: true,
    },
    RoleSeed {
        name: "Course Moderator",
        permissions: Permission::CHECK_DOWNLOAD
            .union(Permission::COMMENT)
            .union(Permission::MODERATE_COMMENTS)
            .union(Permission::MODERATE_COURSES),
        is_default: false,
    },
    RoleSeed {
        name: "School Leader",
        permissions: Permission::CHECK_DOWNLOAD
            .union(Permission::COMMENT)
            .union(Permission::QUERY_STATISTICS),
        is_default: false,
    },
    RoleSeed {
        name: "Administrator",
        permissions: Permission::FULL,
        is_default: false,
    },
];

/// An authenticated user as seen by the authorization guard.
#[derive(Debug, Clone)]
pub struct ActorUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub confirmed: bool,
    /// Per-user freeze override. When false the COMMENT bit is masked out
    /// regardless of what the role grants.
    pub can_comment: bool,
    pub role_id: i64,
    pub role_permissions: Permission,
}

impl ActorUser {
    /// Role permissions with the user's freeze override applied.
    pub fn effective_permissions(&self) -> Permission {
        let mut perms = self.role_permissions;
        if !self.can_comment {
            perms.remove(Permission::COMMENT);
        }
        perms
    }

    pub fn can(&self, p: Permission) -> bool {
        self.effective_permissions().can(p)
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMINISTER)
    }
}

/// Whoever issued the current request.
#[derive(Debug, Clone)]
pub enum Actor {
    Anonymous,
    User(ActorUser),
}

impl Actor {
    /// Anonymous actors can nothing.
    pub fn can(&self, p: Permission) -> bool {
        match self {
            Actor::Anonymous => false,
            Actor::User(user) => user.can(p),
        }
    }

    pub fn user(&self) -> Option<&ActorUser> {
        match self {
            Actor::Anonymous => None,
            Actor::User(user) => Some(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(perms: Permission, can_comment: bool) -> ActorUser {
        ActorUser {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            confirmed: true,
            can_comment,
            role_id: 1,
            role_permissions: perms,
        }
    }

    #[test]
    fn composite_role_checks_each_bit() {
        let role = Permission::COMMENT | Permission::CHECK_DOWNLOAD;
        assert!(role.can(Permission::COMMENT));
        assert!(role.can(Permission::CHECK_DOWNLOAD));
        assert!(role.can(Permission::COMMENT | Permission::CHECK_DOWNLOAD));
        assert!(!role.can(Permission::MODERATE_COURSES));
        assert!(!role.can(Permission::COMMENT | Permission::MODERATE_COURSES));
    }

    #[test]
    fn grant_and_revoke_are_idempotent() {
        let mut perms = Permission::CHECK_DOWNLOAD;
        assert!(perms.grant(Permission::COMMENT));
        assert!(!perms.grant(Permission::COMMENT));
        assert_eq!(perms, Permission::CHECK_DOWNLOAD | Permission::COMMENT);

        assert!(perms.revoke(Permission::COMMENT));
        assert!(!perms.revoke(Permission::COMMENT));
        assert_eq!(perms, Permission::CHECK_DOWNLOAD);
    }

    #[test]
    fn full_keeps_unnamed_bit_through_storage() {
        assert_eq!(Permission::FULL.to_stored(), 0xff);
        assert_eq!(Permission::from_stored(0xff), Permission::FULL);
        assert!(Permission::FULL.can(Permission::ADMINISTER | Permission::FREEZE));
    }

    #[test]
    fn catalog_has_exactly_one_default() {
        let defaults = ROLE_CATALOG.iter().filter(|r| r.is_default).count();
        assert_eq!(defaults, 1);
        assert!(ROLE_CATALOG.iter().any(|r| r.permissions == Permission::FULL));
    }

    #[test]
    fn anonymous_can_nothing() {
        assert!(!Actor::Anonymous.can(Permission::CHECK_DOWNLOAD));
        assert!(!Actor::Anonymous.can(Permission::empty().union(Permission::COMMENT)));
    }

    #[test]
    fn frozen_user_loses_comment_only() {
        let user = actor(Permission::CHECK_DOWNLOAD | Permission::COMMENT, false);
        assert!(user.can(Permission::CHECK_DOWNLOAD));
        assert!(!user.can(Permission::COMMENT));
        assert!(Actor::User(actor(Permission::COMMENT, true)).can(Permission::COMMENT));
    }

    #[test]
    fn names_parse() {
        assert_eq!(Permission::from_snake_name("freeze"), Some(Permission::FREEZE));
        assert_eq!(Permission::from_snake_name("FREEZE"), None);
    }
}
