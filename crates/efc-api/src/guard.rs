//! Authorization checks. Handlers call these before touching any state, so a
//! refused request never mutates anything.

use tracing::warn;

use efc_types::permissions::{Actor, ActorUser, Permission};

use crate::error::{ApiError, ApiResult};

/// Any signed-in user, confirmed or not.
pub fn require_user(actor: &Actor) -> ApiResult<&ActorUser> {
    actor.user().ok_or(ApiError::Unauthorized("sign in required"))
}

/// A confirmed user holding every bit in `required`.
pub fn require_permission(actor: &Actor, required: Permission) -> ApiResult<&ActorUser> {
    let Actor::User(user) = actor else {
        warn!("Anonymous request refused ({:?} required)", required);
        return Err(ApiError::Forbidden("permission denied"));
    };
    if !user.confirmed {
        warn!("Unconfirmed user '{}' refused ({:?} required)", user.username, required);
        return Err(ApiError::Forbidden("account not confirmed"));
    }
    if !user.can(required) {
        warn!("User '{}' lacks {:?}", user.username, required);
        return Err(ApiError::Forbidden("permission denied"));
    }
    Ok(user)
}

/// A confirmed administrator.
pub fn require_admin(actor: &Actor) -> ApiResult<&ActorUser> {
    require_permission(actor, Permission::ADMINISTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(perms: Permission, confirmed: bool) -> Actor {
        Actor::User(ActorUser {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            confirmed,
            can_comment: true,
            role_id: 1,
            role_permissions: perms,
        })
    }

    #[test]
    fn anonymous_is_refused_everywhere() {
        assert!(matches!(
            require_permission(&Actor::Anonymous, Permission::CHECK_DOWNLOAD),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(require_admin(&Actor::Anonymous), Err(ApiError::Forbidden(_))));
        assert!(matches!(require_user(&Actor::Anonymous), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn unconfirmed_is_refused() {
        let actor = user(Permission::FULL, false);
        assert!(require_user(&actor).is_ok());
        assert!(matches!(
            require_permission(&actor, Permission::CHECK_DOWNLOAD),
            Err(ApiError::Forbidden("account not confirmed"))
        ));
    }

    #[test]
    fn composite_requires_every_bit() {
        let actor = user(Permission::CHECK_DOWNLOAD | Permission::COMMENT, true);
        assert!(require_permission(&actor, Permission::COMMENT | Permission::CHECK_DOWNLOAD).is_ok());
        assert!(require_permission(&actor, Permission::COMMENT | Permission::MODERATE_COURSES).is_err());
        assert!(require_admin(&actor).is_err());
    }

    #[test]
    fn full_role_passes_admin() {
        assert!(require_admin(&user(Permission::FULL, true)).is_ok());
    }
}
