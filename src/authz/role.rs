use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::rbac::UserType;

use super::identity::Identity;

/// Effective role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Normal,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Normal => "normal",
        }
    }
}

/// Where a role came from. Security audits need to tell a
/// profile-declared admin apart from one recognized through pre-RBAC
/// signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    Profile,
    LegacyFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleResolution {
    pub role: Role,
    pub source: RoleSource,
}

impl RoleResolution {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn is_admin_user(&self) -> bool {
        matches!(self.role, Role::SuperAdmin | Role::Admin)
    }
}

/// Resolve the effective role for an account.
///
/// An active profile is authoritative and its user_type is returned
/// verbatim. Without one (missing or deactivated profile, treated
/// identically), the legacy signals decide: superuser flag or "Admin"
/// group membership yields `admin`, otherwise `normal`. The legacy path
/// never yields `super_admin`; an explicit active profile is the only
/// way to obtain it.
pub fn resolve_role(identity: &Identity) -> RoleResolution {
    if let Some(profile) = &identity.profile {
        if profile.is_active {
            let role = match profile.user_type {
                UserType::SuperAdmin => Role::SuperAdmin,
                UserType::Admin => Role::Admin,
                UserType::Normal => Role::Normal,
            };
            return RoleResolution {
                role,
                source: RoleSource::Profile,
            };
        }
    }

    let role = if identity.is_superuser || identity.in_admin_group {
        Role::Admin
    } else {
        Role::Normal
    };

    RoleResolution {
        role,
        source: RoleSource::LegacyFallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::identity::ProfileState;
    use uuid::Uuid;

    fn identity(
        is_superuser: bool,
        in_admin_group: bool,
        profile: Option<ProfileState>,
    ) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "tester".to_string(),
            is_superuser,
            in_admin_group,
            profile,
        }
    }

    #[test]
    fn active_profile_is_authoritative() {
        let id = identity(
            true, // even with the legacy flag set
            true,
            Some(ProfileState {
                user_type: UserType::Normal,
                is_active: true,
            }),
        );
        let res = resolve_role(&id);
        assert_eq!(res.role, Role::Normal);
        assert_eq!(res.source, RoleSource::Profile);
    }

    #[test]
    fn profile_super_admin_resolves_verbatim() {
        let id = identity(
            false,
            false,
            Some(ProfileState {
                user_type: UserType::SuperAdmin,
                is_active: true,
            }),
        );
        let res = resolve_role(&id);
        assert!(res.is_super_admin());
        assert!(res.is_admin_user());
    }

    #[test]
    fn legacy_superuser_without_profile_is_admin_not_super_admin() {
        let res = resolve_role(&identity(true, false, None));
        assert_eq!(res.role, Role::Admin);
        assert_eq!(res.source, RoleSource::LegacyFallback);
        assert!(!res.is_super_admin());
        assert!(res.is_admin_user());
    }

    #[test]
    fn legacy_group_membership_without_profile_is_admin() {
        let res = resolve_role(&identity(false, true, None));
        assert_eq!(res.role, Role::Admin);
        assert_eq!(res.source, RoleSource::LegacyFallback);
    }

    #[test]
    fn inactive_profile_falls_back_to_legacy_signals() {
        let id = identity(
            false,
            true,
            Some(ProfileState {
                user_type: UserType::SuperAdmin,
                is_active: false,
            }),
        );
        let res = resolve_role(&id);
        assert_eq!(res.role, Role::Admin);
        assert_eq!(res.source, RoleSource::LegacyFallback);
    }

    #[test]
    fn plain_account_resolves_to_normal() {
        let res = resolve_role(&identity(false, false, None));
        assert_eq!(res.role, Role::Normal);
        assert_eq!(res.source, RoleSource::LegacyFallback);
    }
}
