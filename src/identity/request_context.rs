use super::{AuthenticatedUser, RoleSet};

/// Identity resolved by the edge filter, attached to the request extensions
/// for the handlers behind it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: AuthenticatedUser,
    pub roles: RoleSet,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(user: AuthenticatedUser, roles: RoleSet) -> Self {
        Self { user, roles, request_id: uuid::Uuid::new_v4().to_string() }
    }
}
