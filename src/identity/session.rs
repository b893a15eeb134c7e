use std::collections::{HashMap, HashSet};
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::error::{AppError, AppResult};
use crate::tprintln;

pub type SessionToken = String;

/// Provider-issued credential. `secret` is what travels in the `jwt` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub secret: SessionToken,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Session restored from a bare credential (e.g. a cookie). The provider
    /// resolves the `current` alias against the credential it is sent with.
    pub fn current(secret: impl Into<SessionToken>) -> Self {
        Self {
            id: "current".to_string(),
            secret: secret.into(),
            user_id: String::new(),
            expires_at: DateTime::<Utc>::MAX_UTC,
        }
    }
}

#[derive(Debug, Default)]
struct SessionTables {
    by_token: HashMap<SessionToken, Session>,
    by_user: HashMap<String, HashSet<SessionToken>>,
}

impl SessionTables {
    fn forget(&mut self, token: &str) -> Option<Session> {
        let sess = self.by_token.remove(token)?;
        if let Some(set) = self.by_user.get_mut(&sess.user_id) {
            set.remove(token);
            if set.is_empty() { self.by_user.remove(&sess.user_id); }
        }
        Some(sess)
    }
}

fn gen_id() -> AppResult<String> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("entropy_unavailable".to_string(), e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// `now + ttl`, saturating at the latest representable instant.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Issues and tracks sessions for the local identity provider.
pub struct SessionManager {
    pub ttl: Duration,
    tables: RwLock<SessionTables>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, tables: RwLock::new(SessionTables::default()) }
    }

    pub fn issue(&self, user_id: &str) -> AppResult<Session> {
        let sess = Session {
            id: gen_id()?,
            secret: gen_id()?,
            user_id: user_id.to_string(),
            expires_at: expiry_after(Utc::now(), self.ttl),
        };
        {
            let mut t = self.tables.write();
            t.by_token.insert(sess.secret.clone(), sess.clone());
            t.by_user.entry(user_id.to_string()).or_default().insert(sess.secret.clone());
        }
        tprintln!("session.issue user={} sid={} ttl_secs={}", user_id, sess.id, self.ttl.as_secs());
        Ok(sess)
    }

    /// Live session for a credential; expired entries are dropped on sight.
    pub fn validate(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        let expired = {
            let t = self.tables.read();
            match t.by_token.get(token) {
                Some(s) if s.expires_at > now => return Some(s.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.tables.write().forget(token);
        }
        None
    }

    /// Ends one session. Returns false when the credential was unknown.
    pub fn logout(&self, token: &str) -> bool {
        self.tables.write().forget(token).is_some()
    }

    pub fn revoke_user(&self, user_id: &str) -> usize {
        let mut t = self.tables.write();
        let tokens = t.by_user.remove(user_id).unwrap_or_default();
        let mut count = 0usize;
        for tok in tokens {
            if t.by_token.remove(&tok).is_some() { count += 1; }
        }
        tprintln!("session.revoke user={} count={}", user_id, count);
        count
    }

    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.tables.read().by_token.values().filter(|s| s.expires_at > now).count()
    }

    /// Entries held in the tables, live or not yet swept.
    pub fn tracked_count(&self) -> usize {
        let t = self.tables.read();
        t.by_token.len() + t.by_user.values().map(HashSet::len).sum::<usize>()
    }
}
