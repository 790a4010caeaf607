//! Role based authorization
//!
//! Every role or ownership question goes through [`authorize`]. Handlers
//! name a [`Capability`]; the policy matrix in [`Capability::requirement`]
//! says which roles grant it and whether the owner of the resource may act
//! regardless of role.

use crate::error::AgoraError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Author,
    Admin,
    Superadmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Author, Role::Admin, Role::Superadmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Author => "author",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn parse(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The roles held by one user. Membership only, no hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet(HashSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn any_of(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.0.contains(r))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Role names in a stable order, for display and JSON.
    pub fn names(&self) -> Vec<&'static str> {
        Role::ALL
            .into_iter()
            .filter(|r| self.contains(*r))
            .map(|r| r.as_str())
            .collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        RoleSet(iter.into_iter().collect())
    }
}

/// The authenticated caller as seen by the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub roles: RoleSet,
}

impl Identity {
    pub fn new(user_id: i32, roles: RoleSet) -> Self {
        Self { user_id, roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    pub fn owns(&self, owner_id: i32) -> bool {
        self.user_id == owner_id
    }

    /// Shorthand for [`authorize`] with this identity's roles.
    pub fn can(&self, capability: Capability, owner_id: Option<i32>) -> Verdict {
        authorize(&self.roles, &capability.requirement(), || {
            owner_id.map_or(false, |id| self.owns(id))
        })
    }
}

/// Named operations guarded by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateBlogPost,
    EditBlogPost,
    DeleteBlogPost,
    ConvertBlogPost,
    CreateThread,
    EditThread,
    DeleteThread,
    CreateComment,
    EditComment,
    DeleteComment,
    Vote,
    CreatePoll,
    ExtendPoll,
    DeletePoll,
    ConvertPoll,
    ManageUsers,
}

/// Which roles grant a capability, and whether ownership does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub any_of: &'static [Role],
    pub owner_allowed: bool,
    /// Any authenticated user qualifies.
    pub any_user: bool,
}

const STAFF: &[Role] = &[Role::Admin, Role::Superadmin];
const PUBLISHERS: &[Role] = &[Role::Author, Role::Admin, Role::Superadmin];

impl Capability {
    pub fn requirement(&self) -> Requirement {
        use Capability::*;
        match self {
            CreateThread | CreateComment | Vote => Requirement {
                any_of: &[],
                owner_allowed: false,
                any_user: true,
            },
            CreateBlogPost => Requirement {
                any_of: &[Role::Author],
                owner_allowed: false,
                any_user: false,
            },
            DeleteBlogPost => Requirement {
                any_of: PUBLISHERS,
                owner_allowed: false,
                any_user: false,
            },
            CreatePoll => Requirement {
                any_of: PUBLISHERS,
                owner_allowed: false,
                any_user: false,
            },
            EditBlogPost | ConvertBlogPost | EditThread | EditComment | DeleteComment
            | ExtendPoll | DeletePoll | ConvertPoll => Requirement {
                any_of: STAFF,
                owner_allowed: true,
                any_user: false,
            },
            DeleteThread | ManageUsers => Requirement {
                any_of: STAFF,
                owner_allowed: false,
                any_user: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied(String),
}

impl Verdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Verdict::Granted)
    }

    /// Turns a denial into a permission error.
    pub fn require(self) -> Result<(), AgoraError> {
        match self {
            Verdict::Granted => Ok(()),
            Verdict::Denied(reason) => Err(AgoraError::Permission(reason)),
        }
    }
}

/// The single authorization decision point.
///
/// `is_owner` is only evaluated when ownership could grant access.
pub fn authorize<F>(roles: &RoleSet, requirement: &Requirement, is_owner: F) -> Verdict
where
    F: FnOnce() -> bool,
{
    if requirement.any_user || roles.any_of(requirement.any_of) {
        return Verdict::Granted;
    }
    if requirement.owner_allowed && is_owner() {
        return Verdict::Granted;
    }

    let names: Vec<&str> = requirement.any_of.iter().map(|r| r.as_str()).collect();
    let mut reason = format!("requires role {}", names.join(" or "));
    if requirement.owner_allowed {
        reason.push_str(", or ownership");
    }
    Verdict::Denied(reason)
}

/// Checks that `actor` may change `target_current` roles into `requested`.
///
/// Staff may manage users; touching a superadmin account or granting or
/// revoking `superadmin` takes a superadmin.
pub fn authorize_role_change(
    actor: &Identity,
    target_current: &RoleSet,
    requested: &RoleSet,
) -> Verdict {
    if let Verdict::Denied(reason) = actor.can(Capability::ManageUsers, None) {
        return Verdict::Denied(reason);
    }

    let touches_superadmin = target_current.contains(Role::Superadmin)
        || requested.contains(Role::Superadmin);
    if touches_superadmin && !actor.has_role(Role::Superadmin) {
        return Verdict::Denied("only a superadmin may manage superadmin accounts".to_string());
    }

    Verdict::Granted
}
