//! Edge request filter for the administrative APIs.
//!
//! Client-side guards are advisory; this filter re-checks every request under
//! a guarded prefix: session cookie, then account, then the authoritative role
//! lookup. Nothing is cached between requests so role changes apply to the
//! next request without touching the session.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::identity::{roles_for, IdentityProvider, RequestContext, Role, RoleDirectory, RoleResolution};

pub const SESSION_COOKIE: &str = "jwt";

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(axum::http::header::COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

#[derive(Clone)]
pub struct EdgeFilter {
    prefixes: Arc<Vec<String>>,
    cookie_name: String,
    required: Role,
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn RoleDirectory>,
}

impl EdgeFilter {
    pub fn new(prefixes: &[String], provider: Arc<dyn IdentityProvider>, directory: Arc<dyn RoleDirectory>) -> Self {
        let prefixes = prefixes.iter().map(|p| p.trim_end_matches('/').to_string()).filter(|p| !p.is_empty()).collect();
        Self {
            prefixes: Arc::new(prefixes),
            cookie_name: SESSION_COOKIE.to_string(),
            required: Role::Admin,
            provider,
            directory,
        }
    }

    pub fn with_required_role(mut self, role: Role) -> Self {
        self.required = role;
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Segment-wise prefix match: `/api/admin` guards `/api/admin` and
    /// `/api/admin/x`, not `/api/administrators`.
    pub fn guards(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| {
            path.strip_prefix(p.as_str()).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Steps 1-3 of the filter. Any failure is final for this request.
    pub async fn authorize(&self, headers: &HeaderMap) -> AppResult<RequestContext> {
        let Some(credential) = parse_cookie(headers, &self.cookie_name) else {
            return Err(AppError::unauthenticated("missing_session", "Unauthorized"));
        };
        let resolution = match self.provider.get_account(&credential).await {
            Ok(user) => {
                let roles = roles_for(self.directory.as_ref(), &user.id).await;
                RoleResolution::Resolved { user, roles }
            }
            Err(e) => {
                debug!(error = %e, "edge filter: session did not resolve");
                RoleResolution::Unresolvable
            }
        };
        let (user, roles) = resolution.require(self.required)?;
        Ok(RequestContext::new(user, roles))
    }
}

pub async fn edge_filter(State(filter): State<EdgeFilter>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if !filter.guards(&path) {
        return next.run(req).await;
    }
    match filter.authorize(req.headers()).await {
        Ok(ctx) => {
            debug!(path = %path, user_id = %ctx.user.id, request_id = %ctx.request_id, "edge filter: allowed");
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            debug!(path = %path, status = e.http_status(), reason = e.code_str(), "edge filter: denied");
            e.into_response()
        }
    }
}

/// Put `filter` in front of every route of `router`.
pub fn protect<S>(router: Router<S>, filter: EdgeFilter) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(filter, edge_filter))
}
