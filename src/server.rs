//!
//! lectern HTTP gateway
//! ---------------------
//! Axum front for the session lifecycle.
//!
//! Responsibilities:
//! - Register/login/logout/me endpoints forwarding to the identity provider,
//!   carrying the session credential in the `jwt` cookie.
//! - The edge filter in front of the administrative prefixes.
//! - Role administration and the institution registry behind that filter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{GatewayConfig, ProviderMode};
use crate::error::{AppError, AppResult};
use crate::identity::{
    roles_for, unique_id, validation, HostedEndpoint, HttpIdentityProvider, HttpRoleDirectory, IdentityProvider,
    LocalIdentityProvider, MemoryRoleDirectory, Role, RoleDirectory, Session,
};

pub mod admin;
pub mod gate;

use gate::{parse_cookie, EdgeFilter, SESSION_COOKIE};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn IdentityProvider>,
    pub directory: Arc<dyn RoleDirectory>,
    pub filter: EdgeFilter,
    pub institutions: Arc<RwLock<Vec<admin::Institution>>>,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(provider: Arc<dyn IdentityProvider>, directory: Arc<dyn RoleDirectory>, guarded_prefixes: &[String]) -> Self {
        let filter = EdgeFilter::new(guarded_prefixes, provider.clone(), directory.clone());
        Self {
            provider,
            directory,
            filter,
            institutions: Arc::new(RwLock::new(Vec::new())),
            cookie_secure: true,
        }
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }
}

/// Build the provider and directory the configuration asks for. In local mode
/// the bootstrap admin, if configured, is created and granted `admin`.
pub async fn build_state(config: &GatewayConfig) -> anyhow::Result<AppState> {
    config.check()?;
    let (provider, directory): (Arc<dyn IdentityProvider>, Arc<dyn RoleDirectory>) = match config.provider {
        ProviderMode::Local => {
            let provider = Arc::new(LocalIdentityProvider::with_ttl(Duration::from_secs(config.session_ttl_secs)));
            let directory = Arc::new(MemoryRoleDirectory::new());
            if let Some((email, password)) = &config.bootstrap_admin {
                let id = unique_id();
                provider
                    .create_account(&id, email, password, "Administrator")
                    .await
                    .with_context(|| format!("While creating bootstrap admin {}", email))?;
                provider.mark_verified(&id);
                directory.assign(&id, Role::Admin);
                info!(target: "startup", email = %email, "bootstrap admin provisioned");
            }
            (provider, directory)
        }
        ProviderMode::Hosted => {
            // check() guarantees these are present
            let endpoint = HostedEndpoint::new(
                config.endpoint.clone().unwrap_or_default(),
                config.project_id.clone().unwrap_or_default(),
            )
            .with_timeout(Duration::from_secs(config.request_timeout_secs));
            let provider = Arc::new(HttpIdentityProvider::new(endpoint.clone())?);
            let directory = Arc::new(HttpRoleDirectory::new(
                endpoint,
                config.api_key.clone().unwrap_or_default(),
                config.database_id.clone().unwrap_or_default(),
                config.collection_id.clone().unwrap_or_default(),
            )?);
            (provider, directory)
        }
    };
    Ok(AppState::new(provider, directory, &config.guarded_prefixes).with_cookie_secure(config.cookie_secure))
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(|| async { "lectern ok" }))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/admin/users/{id}/roles", get(admin::get_roles).put(admin::put_roles))
        .route("/api/institutions", get(admin::list_institutions).post(admin::create_institution));
    gate::protect(routes, state.filter.clone()).with_state(state)
}

/// Start the gateway on the configured port.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "lectern starting: http_port={}, provider={:?}, guarded_prefixes={:?}, cookie_secure={}",
        config.http_port, config.provider, config.guarded_prefixes, config.cookie_secure
    );
    let state = build_state(&config).await.context("While building gateway state")?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginPayload { email: String, password: String }

#[derive(Debug, Deserialize)]
struct RegisterPayload { email: String, password: String, name: String }

fn session_cookie(secret: &str, secure: bool) -> AppResult<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly{}; SameSite=Strict; Path=/", SESSION_COOKIE, secret, secure))
        .map_err(|_| AppError::internal("invalid_session_secret", "session credential is not a valid cookie value"))
}

fn clear_session_cookie(secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly{}; SameSite=Strict; Path=/",
        SESSION_COOKIE, secure
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("jwt=deleted; Path=/"))
}

/// Issue a session and answer with the account plus the session cookie.
async fn start_session(state: &AppState, email: &str, password: &str, status: StatusCode) -> AppResult<Response> {
    let session = state.provider.create_session(email, password).await?;
    let issued = match state.provider.get_account(&session.secret).await {
        Ok(user) => session_cookie(&session.secret, state.cookie_secure).map(|cookie| (user, cookie)),
        Err(e) => Err(e),
    };
    let (user, cookie) = match issued {
        Ok(v) => v,
        Err(e) => {
            // the client never receives this credential
            if let Err(del) = state.provider.delete_session(&session).await {
                warn!(error = %del, "could not delete unusable session");
            }
            return Err(e);
        }
    };
    let mut headers = HeaderMap::new();
    headers.insert("Set-Cookie", cookie);
    info!(user_id = %user.id, "session started");
    Ok((status, headers, Json(user)).into_response())
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> AppResult<Response> {
    validation::check_login(&payload.email, &payload.password)?;
    start_session(&state, &payload.email, &payload.password, StatusCode::OK).await
}

async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> AppResult<Response> {
    validation::check_registration(&payload.email, &payload.password, &payload.name)?;
    let user = state.provider.create_account(&unique_id(), &payload.email, &payload.password, &payload.name).await?;
    info!(user_id = %user.id, "account registered");
    start_session(&state, &payload.email, &payload.password, StatusCode::CREATED).await
}

/// Always clears the cookie. A failed remote deletion is reported in the body.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie(state.cookie_secure));
    let Some(secret) = parse_cookie(&headers, SESSION_COOKIE) else {
        return (StatusCode::OK, h, Json(serde_json::json!({"status": "ok"})));
    };
    match state.provider.delete_session(&Session::current(secret)).await {
        Ok(()) => (StatusCode::OK, h, Json(serde_json::json!({"status": "ok"}))),
        Err(e) => {
            warn!(error = %e, "logout: remote session deletion failed");
            (StatusCode::OK, h, Json(serde_json::json!({"status": "ok", "warning": e.message()})))
        }
    }
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let Some(secret) = parse_cookie(&headers, SESSION_COOKIE) else {
        return Err(AppError::unauthenticated("missing_session", "Unauthorized"));
    };
    let user = state.provider.get_account(&secret).await?;
    let roles = roles_for(state.directory.as_ref(), &user.id).await;
    Ok(Json(serde_json::json!({"user": user, "roles": roles})))
}
