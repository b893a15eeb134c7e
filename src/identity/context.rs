//! Per-client authentication state.
//!
//! `AuthContext` owns the `{user, roles, loading}` snapshot and is the only
//! writer of it. Consumers read clones through [`AuthContext::snapshot`] or
//! watch changes through [`AuthContext::subscribe`].
//!
//! Identity fetches are tagged with a ticket when issued. A completion is
//! applied only while its ticket is still the latest one, so overlapping
//! `refresh`/`logout` calls resolve as "last request wins" regardless of the
//! order in which responses land. Once the context is unmounted, late
//! completions are dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::authorizer::{self, Role, RoleSet};
use super::directory::{roles_for, RoleDirectory};
use super::principal::AuthenticatedUser;
use super::provider::{unique_id, IdentityProvider};
use super::session::Session;
use super::validation;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<AuthenticatedUser>,
    /// `None` until the role lookup for `user` has resolved.
    pub roles: Option<RoleSet>,
    pub loading: bool,
}

impl AuthSnapshot {
    fn initial() -> Self { Self { user: None, roles: None, loading: true } }

    pub fn is_authenticated(&self) -> bool { self.user.is_some() }

    pub fn has_role(&self, role: Role) -> bool {
        authorizer::has_role(self.user.as_ref(), self.roles.as_ref(), role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        authorizer::has_any_role(self.user.as_ref(), self.roles.as_ref(), roles)
    }
}

/// Mounted/unmounted flag shared with in-flight work.
#[derive(Debug, Clone, Default)]
pub struct Lifetime(Arc<AtomicBool>);

impl Lifetime {
    pub fn new() -> Self { Self::default() }
    pub fn end(&self) { self.0.store(true, Ordering::SeqCst); }
    pub fn is_live(&self) -> bool { !self.0.load(Ordering::SeqCst) }
}

struct AuthState {
    snapshot: AuthSnapshot,
    session: Option<Session>,
}

pub struct AuthContext {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn RoleDirectory>,
    state: RwLock<AuthState>,
    // latest ticket handed to a refresh or logout
    issued: AtomicU64,
    // bumped by every logout; a login that started before it must not install its session
    signouts: AtomicU64,
    mounted: AtomicBool,
    lifetime: Lifetime,
    tx: watch::Sender<AuthSnapshot>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn IdentityProvider>, directory: Arc<dyn RoleDirectory>) -> Self {
        let (tx, _rx) = watch::channel(AuthSnapshot::initial());
        Self {
            provider,
            directory,
            state: RwLock::new(AuthState { snapshot: AuthSnapshot::initial(), session: None }),
            issued: AtomicU64::new(0),
            signouts: AtomicU64::new(0),
            mounted: AtomicBool::new(false),
            lifetime: Lifetime::new(),
            tx,
        }
    }

    /// Context resuming a credential kept by the client (e.g. from a cookie).
    pub fn with_session(provider: Arc<dyn IdentityProvider>, directory: Arc<dyn RoleDirectory>, session: Session) -> Self {
        let ctx = Self::new(provider, directory);
        ctx.state.write().session = Some(session);
        ctx
    }

    /// Run the single identity check of the mount. Later calls return `None`.
    pub fn mount(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.mounted.swap(true, Ordering::SeqCst) {
            return None;
        }
        let me = Arc::clone(self);
        Some(tokio::spawn(async move { me.refresh().await }))
    }

    /// Results that land after this are discarded.
    pub fn unmount(&self) {
        self.lifetime.end();
    }

    pub fn lifetime(&self) -> Lifetime { self.lifetime.clone() }

    pub fn snapshot(&self) -> AuthSnapshot { self.state.read().snapshot.clone() }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> { self.tx.subscribe() }

    pub fn session(&self) -> Option<Session> { self.state.read().session.clone() }

    pub fn user(&self) -> Option<AuthenticatedUser> { self.state.read().snapshot.user.clone() }

    pub fn loading(&self) -> bool { self.state.read().snapshot.loading }

    pub fn has_role(&self, role: Role) -> bool { self.state.read().snapshot.has_role(role) }

    /// Issue a ticket and apply `f` in the same critical section.
    fn issue<R>(&self, f: impl FnOnce(&mut AuthState) -> R) -> (u64, R) {
        let mut st = self.state.write();
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let out = f(&mut st);
        self.tx.send_replace(st.snapshot.clone());
        (ticket, out)
    }

    /// Apply `f` only if `ticket` is still the latest and the context is live.
    fn commit(&self, ticket: u64, f: impl FnOnce(&mut AuthState)) -> bool {
        if !self.lifetime.is_live() {
            debug!(ticket, "auth context unmounted; dropping result");
            return false;
        }
        let mut st = self.state.write();
        if self.issued.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "stale identity result discarded");
            return false;
        }
        f(&mut st);
        self.tx.send_replace(st.snapshot.clone());
        true
    }

    /// Re-read the current account and its roles. Never fails: any error,
    /// including "no session", resolves to no user.
    pub async fn refresh(&self) {
        if !self.lifetime.is_live() {
            return;
        }
        let (ticket, credential) = self.issue(|st| {
            st.snapshot.loading = true;
            st.session.as_ref().map(|s| s.secret.clone())
        });

        let outcome = match credential {
            None => Err(AppError::unauthenticated("no_session", "no session")),
            Some(c) => match self.provider.get_account(&c).await {
                Ok(user) => {
                    let roles = roles_for(self.directory.as_ref(), &user.id).await;
                    Ok((user, roles))
                }
                Err(e) => Err(e),
            },
        };

        self.commit(ticket, |st| {
            match outcome {
                Ok((user, roles)) => {
                    st.snapshot.user = Some(user);
                    st.snapshot.roles = Some(roles);
                }
                Err(e) => {
                    if e.is_unauthenticated() {
                        // the credential is dead; stop presenting it
                        st.session = None;
                    } else {
                        warn!(error = %e, "identity check failed; treating as signed out");
                    }
                    st.snapshot.user = None;
                    st.snapshot.roles = None;
                }
            }
            st.snapshot.loading = false;
        });
    }

    /// Create a session, then refresh. Errors go back to the caller and leave
    /// the current user untouched.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<()> {
        validation::check_login(email, password)?;
        let epoch = self.signouts.load(Ordering::SeqCst);
        let session = match self.provider.create_session(email, password).await {
            Ok(s) => s,
            Err(e) => {
                info!(error = %e, "login rejected");
                return Err(e);
            }
        };

        let installed = {
            let mut st = self.state.write();
            if self.lifetime.is_live() && self.signouts.load(Ordering::SeqCst) == epoch {
                st.session = Some(session.clone());
                true
            } else {
                false
            }
        };
        if !installed {
            // a later logout (or unmount) wins; don't leave the fresh session behind
            if let Err(e) = self.provider.delete_session(&session).await {
                debug!(error = %e, "could not delete superseded session");
            }
            return Err(AppError::unauthenticated("login_superseded", "sign-in was superseded by a later sign-out"));
        }

        info!(user_id = %session.user_id, "login succeeded");
        self.refresh().await;
        Ok(())
    }

    /// Create the account, then log in with the same credentials. Account
    /// creation failure stops before any login attempt.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> AppResult<()> {
        validation::check_registration(email, password, name)?;
        let user = self.provider.create_account(&unique_id(), email, password, name).await?;
        info!(user_id = %user.id, "account registered");
        self.login(email, password).await
    }

    /// Delete the session and clear local state. The local clear happens
    /// whether or not the provider call succeeds; a failed deletion is still
    /// returned so the caller can tell the remote session may be alive.
    pub async fn logout(&self) -> AppResult<()> {
        self.signouts.fetch_add(1, Ordering::SeqCst);
        let (_ticket, session) = self.issue(|st| {
            st.snapshot.user = None;
            st.snapshot.roles = None;
            st.snapshot.loading = false;
            st.session.take()
        });
        let Some(session) = session else {
            return Ok(());
        };
        match self.provider.delete_session(&session).await {
            Ok(()) => {
                info!(user_id = %session.user_id, "logged out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "session deletion failed; local state already cleared");
                Err(e)
            }
        }
    }
}
