use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::AuthenticatedUser;
use crate::error::{AppError, AppResult};

/// Closed set of application roles. The identifiers are the ones stored in the
/// application database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Instructor, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "instructor" => Ok(Role::Instructor),
            "student" => Ok(Role::Student),
            other => Err(AppError::validation("unknown_role".to_string(), format!("unknown role '{}'", other))),
        }
    }
}

/// Role membership of one user. A set: inserting twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self { Self(BTreeSet::new()) }

    /// Build from raw database identifiers. Unknown identifiers are skipped.
    pub fn from_idents<I, S>(idents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for ident in idents {
            match ident.as_ref().parse::<Role>() {
                Ok(r) => { set.insert(r); }
                Err(_) => tracing::debug!(role = ident.as_ref(), "ignoring unknown role identifier"),
            }
        }
        Self(set)
    }

    /// Strict variant for admin input: any unknown identifier is an error.
    pub fn parse_strict<S: AsRef<str>>(idents: &[S]) -> AppResult<Self> {
        let mut set = BTreeSet::new();
        for ident in idents {
            set.insert(ident.as_ref().parse::<Role>()?);
        }
        Ok(Self(set))
    }

    /// The one membership check every caller goes through.
    pub fn contains(&self, role: Role) -> bool { self.0.contains(&role) }

    pub fn insert(&mut self, role: Role) -> bool { self.0.insert(role) }
    pub fn remove(&mut self, role: Role) -> bool { self.0.remove(&role) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ { self.0.iter().copied() }

    pub fn to_idents(&self) -> Vec<String> {
        self.0.iter().map(|r| r.as_str().to_string()).collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `false` whenever the user is absent or roles are not yet resolved.
pub fn has_role(user: Option<&AuthenticatedUser>, roles: Option<&RoleSet>, role: Role) -> bool {
    match (user, roles) {
        (Some(_), Some(set)) => set.contains(role),
        _ => false,
    }
}

pub fn has_any_role(user: Option<&AuthenticatedUser>, roles: Option<&RoleSet>, wanted: &[Role]) -> bool {
    wanted.iter().any(|r| has_role(user, roles, *r))
}

/// Server-side view of a role lookup, which has to tell "we could not work out
/// who this is" apart from "we know who this is and they lack the role".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolution {
    Unresolvable,
    Resolved { user: AuthenticatedUser, roles: RoleSet },
}

impl RoleResolution {
    /// Unresolvable -> 401, resolved without the role -> 403. On success the
    /// resolved user and roles are handed back to the caller.
    pub fn require(self, role: Role) -> AppResult<(AuthenticatedUser, RoleSet)> {
        match self {
            RoleResolution::Unresolvable => Err(AppError::unauthenticated("invalid_session", "Unauthorized")),
            RoleResolution::Resolved { user, roles } if roles.contains(role) => Ok((user, roles)),
            RoleResolution::Resolved { .. } => Err(AppError::forbidden("forbidden", "Forbidden")),
        }
    }
}
