use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::authorizer::{Role, RoleSet};
use crate::error::{AppError, AppResult};

/// User record in the application database. Only the role list is read here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Authoritative role source, kept separate from the identity provider.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn get_user_by_id(&self, id: &str) -> AppResult<UserRecord>;

    /// Replace a user's roles. Read-only directories refuse.
    async fn set_roles(&self, id: &str, roles: &RoleSet) -> AppResult<()> {
        let _ = (id, roles);
        Err(AppError::forbidden("read_only_directory", "role directory is read-only"))
    }
}

/// Role lookup as every caller sees it: any failure means "no roles".
pub async fn roles_for(directory: &dyn RoleDirectory, id: &str) -> RoleSet {
    match directory.get_user_by_id(id).await {
        Ok(rec) => RoleSet::from_idents(&rec.roles),
        Err(e) => {
            tracing::debug!(user_id = id, error = %e, "role lookup failed; treating as no roles");
            RoleSet::new()
        }
    }
}

/// In-memory directory used in local mode and tests.
#[derive(Default)]
pub struct MemoryRoleDirectory {
    records: RwLock<HashMap<String, RoleSet>>,
}

impl MemoryRoleDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn assign(&self, id: &str, role: Role) {
        self.records.write().entry(id.to_string()).or_default().insert(role);
    }

    pub fn revoke(&self, id: &str, role: Role) {
        if let Some(set) = self.records.write().get_mut(id) { set.remove(role); }
    }
}

#[async_trait]
impl RoleDirectory for MemoryRoleDirectory {
    async fn get_user_by_id(&self, id: &str) -> AppResult<UserRecord> {
        let map = self.records.read();
        let Some(set) = map.get(id) else {
            return Err(AppError::not_found("user_not_found".to_string(), format!("no user record for {}", id)));
        };
        Ok(UserRecord { id: id.to_string(), roles: set.to_idents() })
    }

    async fn set_roles(&self, id: &str, roles: &RoleSet) -> AppResult<()> {
        self.records.write().insert(id.to_string(), roles.clone());
        Ok(())
    }
}
