//! AuthContext lifecycle tests against a scripted identity provider.
//! The provider counts calls and can hold `get_account` or `create_session`
//! open so overlapping refresh/login/logout orderings can be driven
//! deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use lectern::error::{AppError, AppResult};
use lectern::identity::{
    AuthContext, AuthSnapshot, AuthenticatedUser, IdentityProvider, MemoryRoleDirectory, Role, Session,
};

#[derive(Default)]
struct ScriptedProvider {
    // account id -> user
    accounts: Mutex<HashMap<String, AuthenticatedUser>>,
    // email -> (password, account id)
    logins: Mutex<HashMap<String, (String, String)>>,
    // session secret -> account id
    sessions: Mutex<HashMap<String, String>>,
    issued: AtomicUsize,
    get_account_calls: AtomicUsize,
    create_account_calls: AtomicUsize,
    create_session_calls: AtomicUsize,
    delete_session_calls: AtomicUsize,
    reject_create_account: AtomicBool,
    fail_delete: AtomicBool,
    unavailable: AtomicBool,
    // next get_account signals `entered` and waits for `release`
    hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    // same, for the next create_session once its session exists
    login_hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl ScriptedProvider {
    fn seed(&self, id: &str, email: &str, password: &str, name: &str) {
        self.accounts.lock().insert(id.into(), user(id, email, name));
        self.logins.lock().insert(email.into(), (password.into(), id.into()));
    }

    fn session_for(&self, id: &str) -> Session {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let secret = format!("secret-{}", n);
        self.sessions.lock().insert(secret.clone(), id.into());
        Session { id: format!("sess-{}", n), secret, user_id: id.into(), expires_at: Utc::now() + TimeDelta::hours(1) }
    }

    fn rename(&self, id: &str, name: &str) {
        if let Some(u) = self.accounts.lock().get_mut(id) { u.name = name.into(); }
    }

    fn hold_next_lookup(&self) -> (Arc<Notify>, Arc<Notify>) {
        let pair = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        *self.hold.lock() = Some(pair.clone());
        pair
    }

    fn hold_next_login(&self) -> (Arc<Notify>, Arc<Notify>) {
        let pair = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        *self.login_hold.lock() = Some(pair.clone());
        pair
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn create_account(&self, id: &str, email: &str, password: &str, name: &str) -> AppResult<AuthenticatedUser> {
        self.create_account_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_create_account.load(Ordering::SeqCst) {
            return Err(AppError::validation("user_already_exists", "A user with the same email already exists"));
        }
        self.seed(id, email, password, name);
        Ok(user(id, email, name))
    }

    async fn create_session(&self, email: &str, password: &str) -> AppResult<Session> {
        self.create_session_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.logins.lock().get(email).cloned();
        let result = match found {
            Some((pw, id)) if pw == password => Ok(self.session_for(&id)),
            _ => Err(AppError::validation("invalid_credentials", "Invalid credentials")),
        };
        let hold = self.login_hold.lock().take();
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }
        result
    }

    async fn get_account(&self, credential: &str) -> AppResult<AuthenticatedUser> {
        self.get_account_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.unavailable.load(Ordering::SeqCst) {
            Err(AppError::unavailable("provider_down", "identity service unreachable"))
        } else {
            let id = self.sessions.lock().get(credential).cloned();
            id.and_then(|id| self.accounts.lock().get(&id).cloned())
                .ok_or_else(|| AppError::unauthenticated("session_invalid", "no such session"))
        };
        let hold = self.hold.lock().take();
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }
        result
    }

    async fn delete_session(&self, session: &Session) -> AppResult<()> {
        self.delete_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("provider_down", "identity service unreachable"));
        }
        self.sessions.lock().remove(&session.secret);
        Ok(())
    }
}

fn user(id: &str, email: &str, name: &str) -> AuthenticatedUser {
    AuthenticatedUser { id: id.into(), email: email.into(), name: name.into(), email_verified: true }
}

fn setup() -> (Arc<ScriptedProvider>, Arc<MemoryRoleDirectory>) {
    let provider = Arc::new(ScriptedProvider::default());
    provider.seed("u-ada", "ada@school.edu", "correct horse", "Ada");
    (provider, Arc::new(MemoryRoleDirectory::new()))
}

fn signed_in(provider: &Arc<ScriptedProvider>, directory: &Arc<MemoryRoleDirectory>) -> Arc<AuthContext> {
    let session = provider.session_for("u-ada");
    Arc::new(AuthContext::with_session(provider.clone(), directory.clone(), session))
}

#[tokio::test]
async fn mount_runs_one_identity_check() {
    let (provider, directory) = setup();
    directory.assign("u-ada", Role::Instructor);
    let ctx = signed_in(&provider, &directory);

    let initial = ctx.snapshot();
    assert!(initial.loading);
    assert!(initial.user.is_none());

    let handle = ctx.mount().expect("first mount spawns the check");
    assert!(ctx.mount().is_none());
    handle.await.unwrap();

    assert_eq!(provider.get_account_calls.load(Ordering::SeqCst), 1);
    let snap = ctx.snapshot();
    assert!(!snap.loading);
    assert_eq!(snap.user.map(|u| u.name), Some("Ada".to_string()));
    assert!(ctx.has_role(Role::Instructor));
    assert!(!ctx.has_role(Role::Admin));
}

#[tokio::test]
async fn mount_without_session_resolves_signed_out() {
    let (provider, directory) = setup();
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    ctx.mount().unwrap().await.unwrap();
    let snap = ctx.snapshot();
    assert!(!snap.loading);
    assert!(snap.user.is_none());
    assert!(!snap.has_role(Role::Student));
}

#[tokio::test]
async fn subscribers_see_loading_clear() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    let mut rx = ctx.subscribe();
    assert!(rx.borrow().loading);
    ctx.mount().unwrap().await.unwrap();
    rx.changed().await.unwrap();
    let snap = rx.borrow_and_update().clone();
    assert!(!snap.loading);
    assert!(snap.is_authenticated());
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let (provider, directory) = setup();
    directory.assign("u-ada", Role::Student);
    let ctx = signed_in(&provider, &directory);
    ctx.refresh().await;
    let first = ctx.snapshot();
    ctx.refresh().await;
    assert_eq!(ctx.snapshot(), first);
    assert_eq!(provider.get_account_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn login_installs_user_and_roles() {
    let (provider, directory) = setup();
    directory.assign("u-ada", Role::Admin);
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    ctx.login("ada@school.edu", "correct horse").await.unwrap();
    let snap = ctx.snapshot();
    assert!(!snap.loading);
    assert_eq!(snap.user.map(|u| u.id), Some("u-ada".to_string()));
    assert!(ctx.has_role(Role::Admin));
    assert!(ctx.session().is_some());
}

#[tokio::test]
async fn failed_login_leaves_current_user() {
    let (provider, directory) = setup();
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    ctx.login("ada@school.edu", "correct horse").await.unwrap();
    let before = ctx.snapshot();

    let err = ctx.login("ada@school.edu", "wrong password").await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.message(), "Invalid credentials");
    assert_eq!(ctx.snapshot(), before);
}

#[tokio::test]
async fn malformed_login_never_reaches_provider() {
    let (provider, directory) = setup();
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    assert!(ctx.login("not-an-email", "correct horse").await.is_err());
    assert!(ctx.login("ada@school.edu", "").await.is_err());
    assert_eq!(provider.create_session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn register_then_logs_in() {
    let (provider, directory) = setup();
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    ctx.register("grace@school.edu", "hopper1906", "Grace").await.unwrap();
    assert_eq!(provider.create_account_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.create_session_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.user().map(|u| u.email), Some("grace@school.edu".to_string()));
    // no role record yet
    assert!(!ctx.has_role(Role::Student));
}

#[tokio::test]
async fn failed_registration_skips_login() {
    let (provider, directory) = setup();
    provider.reject_create_account.store(true, Ordering::SeqCst);
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));

    let err = ctx.register("ada@school.edu", "correct horse", "Ada").await.unwrap_err();
    assert_eq!(err.code_str(), "user_already_exists");
    assert_eq!(provider.create_session_calls.load(Ordering::SeqCst), 0);
    assert!(ctx.user().is_none());

    // short password fails before the provider is contacted at all
    provider.reject_create_account.store(false, Ordering::SeqCst);
    assert!(ctx.register("new@school.edu", "short", "New").await.is_err());
    assert_eq!(provider.create_account_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logout_clears_state() {
    let (provider, directory) = setup();
    directory.assign("u-ada", Role::Admin);
    let ctx = signed_in(&provider, &directory);
    ctx.refresh().await;
    assert!(ctx.has_role(Role::Admin));

    ctx.logout().await.unwrap();
    assert_eq!(provider.delete_session_calls.load(Ordering::SeqCst), 1);
    let snap = ctx.snapshot();
    assert!(snap.user.is_none());
    assert!(!snap.loading);
    assert!(!ctx.has_role(Role::Admin));
    assert!(ctx.session().is_none());

    // nothing left to delete
    ctx.logout().await.unwrap();
    assert_eq!(provider.delete_session_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logout_clears_locally_when_deletion_fails() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    ctx.refresh().await;
    provider.fail_delete.store(true, Ordering::SeqCst);

    let err = ctx.logout().await.unwrap_err();
    assert_eq!(err.http_status(), 503);
    assert!(ctx.user().is_none());
    assert!(ctx.session().is_none());
    assert!(!ctx.loading());
}

#[tokio::test]
async fn provider_outage_resolves_signed_out_but_keeps_session() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    provider.unavailable.store(true, Ordering::SeqCst);
    ctx.refresh().await;
    assert!(ctx.user().is_none());
    assert!(!ctx.loading());
    assert!(ctx.session().is_some());

    provider.unavailable.store(false, Ordering::SeqCst);
    ctx.refresh().await;
    assert!(ctx.user().is_some());
}

#[tokio::test]
async fn dead_session_is_dropped_on_refresh() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    provider.sessions.lock().clear();
    ctx.refresh().await;
    assert!(ctx.user().is_none());
    assert!(ctx.session().is_none());
}

#[tokio::test]
async fn older_refresh_result_is_discarded() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    let (entered, release) = provider.hold_next_lookup();

    let slow = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.refresh().await }
    });
    entered.notified().await;

    // the held lookup already read "Ada"; the newer one sees the rename
    provider.rename("u-ada", "Ada Lovelace");
    ctx.refresh().await;
    assert_eq!(ctx.user().map(|u| u.name), Some("Ada Lovelace".to_string()));

    release.notify_one();
    slow.await.unwrap();
    assert_eq!(ctx.user().map(|u| u.name), Some("Ada Lovelace".to_string()));
    assert!(!ctx.loading());
}

#[tokio::test]
async fn logout_wins_over_inflight_refresh() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    let (entered, release) = provider.hold_next_lookup();

    let slow = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.refresh().await }
    });
    entered.notified().await;
    ctx.logout().await.unwrap();

    release.notify_one();
    slow.await.unwrap();
    let snap = ctx.snapshot();
    assert!(snap.user.is_none());
    assert!(!snap.loading);
}

#[tokio::test]
async fn logout_overtakes_inflight_login() {
    let (provider, directory) = setup();
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    let (entered, release) = provider.hold_next_login();

    let pending = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.login("ada@school.edu", "correct horse").await }
    });
    entered.notified().await;
    // the provider already holds the new session; nothing local to delete yet
    assert_eq!(provider.sessions.lock().len(), 1);
    ctx.logout().await.unwrap();
    assert_eq!(provider.delete_session_calls.load(Ordering::SeqCst), 0);

    release.notify_one();
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.code_str(), "login_superseded");
    assert!(ctx.session().is_none());
    assert!(ctx.user().is_none());
    assert_eq!(provider.get_account_calls.load(Ordering::SeqCst), 0);
    // the orphaned session was deleted on the provider
    assert_eq!(provider.delete_session_calls.load(Ordering::SeqCst), 1);
    assert!(provider.sessions.lock().is_empty());
}

#[tokio::test]
async fn unmount_discards_late_results() {
    let (provider, directory) = setup();
    let ctx = signed_in(&provider, &directory);
    let (entered, release) = provider.hold_next_lookup();

    let handle = ctx.mount().unwrap();
    entered.notified().await;
    ctx.unmount();
    release.notify_one();
    handle.await.unwrap();

    let snap = ctx.snapshot();
    assert!(snap.user.is_none());
    assert!(snap.loading);
    assert!(!ctx.lifetime().is_live());

    // no further provider traffic once unmounted
    ctx.refresh().await;
    assert_eq!(provider.get_account_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn login_after_unmount_does_not_install_session() {
    let (provider, directory) = setup();
    let ctx = Arc::new(AuthContext::new(provider.clone(), directory));
    ctx.unmount();
    let err = ctx.login("ada@school.edu", "correct horse").await.unwrap_err();
    assert!(err.is_unauthenticated());
    assert!(ctx.session().is_none());
    // the orphaned session is cleaned up
    assert_eq!(provider.delete_session_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn snapshot_without_user_has_no_roles() {
    let snap = AuthSnapshot { user: None, roles: Some(Role::ALL.iter().copied().collect()), loading: false };
    for role in Role::ALL {
        assert!(!snap.has_role(role));
    }
}
