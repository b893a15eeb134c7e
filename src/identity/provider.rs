use std::collections::HashMap;
use std::time::Duration;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use tracing::info;

use super::principal::AuthenticatedUser;
use super::session::{Session, SessionManager};
use crate::error::{AppError, AppResult};

/// Account/session surface of the identity provider.
///
/// Every call may suspend on the network; none of them are cancellable.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, id: &str, email: &str, password: &str, name: &str) -> AppResult<AuthenticatedUser>;
    async fn create_session(&self, email: &str, password: &str) -> AppResult<Session>;
    /// Resolve the account owning `credential` (a session secret).
    async fn get_account(&self, credential: &str) -> AppResult<AuthenticatedUser>;
    async fn delete_session(&self, session: &Session) -> AppResult<()>;
}

/// Fresh account id, in the provider's "unique()" shape.
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal("salt_unavailable".to_string(), e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal("salt_encoding".to_string(), e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash_failed".to_string(), e.to_string()))?
        .to_string();
    Ok(phc)
}

pub(crate) fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

struct LocalAccount {
    user: AuthenticatedUser,
    password_hash: String,
}

/// In-process identity provider: Argon2 credentials plus a [`SessionManager`].
/// Backs the gateway's `local` mode and the test suites.
pub struct LocalIdentityProvider {
    // keyed by lowercased email
    accounts: RwLock<HashMap<String, LocalAccount>>,
    sessions: SessionManager,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self { Self::new(SessionManager::default()) }
}

impl LocalIdentityProvider {
    pub fn new(sessions: SessionManager) -> Self {
        Self { accounts: RwLock::new(HashMap::new()), sessions }
    }

    pub fn with_ttl(ttl: Duration) -> Self { Self::new(SessionManager::new(ttl)) }

    pub fn sessions(&self) -> &SessionManager { &self.sessions }

    pub fn mark_verified(&self, user_id: &str) -> bool {
        let mut map = self.accounts.write();
        match map.values_mut().find(|a| a.user.id == user_id) {
            Some(acc) => { acc.user.email_verified = true; true }
            None => false,
        }
    }

    fn find_by_id(&self, user_id: &str) -> Option<AuthenticatedUser> {
        self.accounts.read().values().find(|a| a.user.id == user_id).map(|a| a.user.clone())
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_account(&self, id: &str, email: &str, password: &str, name: &str) -> AppResult<AuthenticatedUser> {
        let key = email.trim().to_ascii_lowercase();
        {
            let map = self.accounts.read();
            if map.contains_key(&key) {
                return Err(AppError::validation("user_already_exists", "A user with the same email already exists"));
            }
            if map.values().any(|a| a.user.id == id) {
                return Err(AppError::validation("user_already_exists", "A user with the same id already exists"));
            }
        }
        let password_hash = hash_password(password)?;
        let user = AuthenticatedUser {
            id: id.to_string(),
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            email_verified: false,
        };
        let mut map = self.accounts.write();
        // re-check under the write lock; the hash above runs unlocked
        if map.contains_key(&key) {
            return Err(AppError::validation("user_already_exists", "A user with the same email already exists"));
        }
        map.insert(key, LocalAccount { user: user.clone(), password_hash });
        info!(user_id = %user.id, "account created");
        Ok(user)
    }

    async fn create_session(&self, email: &str, password: &str) -> AppResult<Session> {
        let key = email.trim().to_ascii_lowercase();
        let found = {
            let map = self.accounts.read();
            map.get(&key).map(|a| (a.user.id.clone(), a.password_hash.clone()))
        };
        let Some((user_id, phc)) = found else {
            return Err(invalid_credentials());
        };
        if !verify_password(&phc, password) {
            return Err(invalid_credentials());
        }
        self.sessions.issue(&user_id)
    }

    async fn get_account(&self, credential: &str) -> AppResult<AuthenticatedUser> {
        let Some(sess) = self.sessions.validate(credential) else {
            return Err(AppError::unauthenticated("session_invalid", "session is missing, expired or revoked"));
        };
        self.find_by_id(&sess.user_id)
            .ok_or_else(|| AppError::unauthenticated("user_not_found", "session owner no longer exists"))
    }

    async fn delete_session(&self, session: &Session) -> AppResult<()> {
        if self.sessions.logout(&session.secret) {
            Ok(())
        } else {
            Err(AppError::unauthenticated("session_not_found", "session is missing or already deleted"))
        }
    }
}

fn invalid_credentials() -> AppError {
    AppError::validation("invalid_credentials", "Invalid credentials. Please check the email and password.")
}
