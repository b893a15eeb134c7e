//! Clients for the hosted backend: the account/session REST surface of the
//! identity service and the document endpoint holding role assignments.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::authorizer::RoleSet;
use super::directory::{RoleDirectory, UserRecord};
use super::principal::AuthenticatedUser;
use super::provider::IdentityProvider;
use super::session::Session;
use crate::error::{AppError, AppResult};

pub const PROJECT_HEADER: &str = "x-project-id";
pub const SESSION_HEADER: &str = "x-session-token";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URL plus project of the hosted backend.
#[derive(Debug, Clone)]
pub struct HostedEndpoint {
    pub base: String,
    pub project_id: String,
    /// Upper bound on any single call, connect through body.
    pub timeout: Duration,
}

impl HostedEndpoint {
    pub fn new(base: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self { base: base.into(), project_id: project_id.into(), timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> AppResult<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    fn headers(&self) -> AppResult<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(PROJECT_HEADER, header_value(&self.project_id)?);
        Ok(h)
    }
}

fn header_value(v: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(v).map_err(|_| AppError::validation("invalid_header_value", "value cannot be sent as an HTTP header"))
}

#[derive(Debug, Deserialize)]
struct AccountWire {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "emailVerification", default)]
    email_verification: bool,
}

impl From<AccountWire> for AuthenticatedUser {
    fn from(w: AccountWire) -> Self {
        AuthenticatedUser { id: w.id, email: w.email, name: w.name, email_verified: w.email_verification }
    }
}

#[derive(Debug, Deserialize)]
struct SessionWire {
    #[serde(rename = "$id")]
    id: String,
    #[serde(rename = "userId", default)]
    user_id: String,
    #[serde(default)]
    expire: Option<String>,
    #[serde(default)]
    secret: String,
}

#[derive(Debug, Deserialize)]
struct ErrorWire {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Translate a non-success response into the error taxonomy, keeping the
/// provider's own message so the UI can show it verbatim.
async fn error_from(resp: Response) -> AppError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorWire>(&text) {
        Ok(e) if !e.message.is_empty() => {
            let code = if e.kind.is_empty() { format!("http_{}", status.as_u16()) } else { e.kind };
            (code, e.message)
        }
        _ => (format!("http_{}", status.as_u16()), if text.is_empty() { status.to_string() } else { text }),
    };
    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthenticated { code, message },
        StatusCode::FORBIDDEN => AppError::Forbidden { code, message },
        StatusCode::NOT_FOUND => AppError::NotFound { code, message },
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::ValidationFailure { code, message }
        }
        _ => AppError::ProviderUnavailable { code, message },
    }
}

/// First `name=value` pair of the response's Set-Cookie headers.
fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    for val in headers.get_all(SET_COOKIE).iter() {
        if let Ok(s) = val.to_str() {
            let nv = s.split(';').next().unwrap_or("").trim();
            if let Some((_, v)) = nv.split_once('=') {
                if !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

pub struct HttpIdentityProvider {
    endpoint: HostedEndpoint,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(endpoint: HostedEndpoint) -> AppResult<Self> {
        let client = endpoint.client()?;
        Ok(Self { endpoint, client })
    }

    fn session_headers(&self, credential: &str) -> AppResult<HeaderMap> {
        let mut h = self.endpoint.headers()?;
        h.insert(SESSION_HEADER, header_value(credential)?);
        Ok(h)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(&self, id: &str, email: &str, password: &str, name: &str) -> AppResult<AuthenticatedUser> {
        let resp = self.client
            .post(self.endpoint.url("/account"))
            .headers(self.endpoint.headers()?)
            .json(&serde_json::json!({"userId": id, "email": email, "password": password, "name": name}))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let wire: AccountWire = resp.json().await?;
        Ok(wire.into())
    }

    async fn create_session(&self, email: &str, password: &str) -> AppResult<Session> {
        let resp = self.client
            .post(self.endpoint.url("/account/sessions/email"))
            .headers(self.endpoint.headers()?)
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await?;
        if !resp.status().is_success() {
            // a 401 here is bad credentials, not a missing session
            return Err(match error_from(resp).await {
                AppError::Unauthenticated { code, message } => AppError::ValidationFailure { code, message },
                other => other,
            });
        }
        let cookie_secret = session_cookie_value(resp.headers());
        let wire: SessionWire = resp.json().await?;
        let secret = if wire.secret.is_empty() { cookie_secret.unwrap_or_default() } else { wire.secret };
        if secret.is_empty() {
            return Err(AppError::unavailable("session_secret_missing", "provider did not return a session credential"));
        }
        let expires_at = wire.expire
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!(session_id = %wire.id, "hosted session created");
        Ok(Session { id: wire.id, secret, user_id: wire.user_id, expires_at })
    }

    async fn get_account(&self, credential: &str) -> AppResult<AuthenticatedUser> {
        let resp = self.client
            .get(self.endpoint.url("/account"))
            .headers(self.session_headers(credential)?)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let wire: AccountWire = resp.json().await?;
        Ok(wire.into())
    }

    async fn delete_session(&self, session: &Session) -> AppResult<()> {
        let path = format!("/account/sessions/{}", urlencoding::encode(&session.id));
        let resp = self.client
            .delete(self.endpoint.url(&path))
            .headers(self.session_headers(&session.secret)?)
            .send()
            .await?;
        if !resp.status().is_success() {
            let err = error_from(resp).await;
            warn!(session_id = %session.id, error = %err, "hosted session deletion failed");
            return Err(err);
        }
        Ok(())
    }
}

/// Role directory backed by a document collection of the hosted database.
pub struct HttpRoleDirectory {
    endpoint: HostedEndpoint,
    api_key: String,
    database_id: String,
    collection_id: String,
    client: reqwest::Client,
}

impl HttpRoleDirectory {
    pub fn new(endpoint: HostedEndpoint, api_key: impl Into<String>, database_id: impl Into<String>, collection_id: impl Into<String>) -> AppResult<Self> {
        let client = endpoint.client()?;
        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            database_id: database_id.into(),
            collection_id: collection_id.into(),
            client,
        })
    }

    fn document_url(&self, id: &str) -> String {
        self.endpoint.url(&format!(
            "/databases/{}/collections/{}/documents/{}",
            urlencoding::encode(&self.database_id),
            urlencoding::encode(&self.collection_id),
            urlencoding::encode(id)
        ))
    }

    fn headers(&self) -> AppResult<HeaderMap> {
        let mut h = self.endpoint.headers()?;
        h.insert(API_KEY_HEADER, header_value(&self.api_key)?);
        Ok(h)
    }
}

#[derive(Debug, Deserialize)]
struct DocumentWire {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    roles: Vec<String>,
}

#[async_trait]
impl RoleDirectory for HttpRoleDirectory {
    async fn get_user_by_id(&self, id: &str) -> AppResult<UserRecord> {
        let resp = self.client.get(self.document_url(id)).headers(self.headers()?).send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let doc: DocumentWire = resp.json().await?;
        Ok(UserRecord { id: doc.id, roles: doc.roles })
    }

    async fn set_roles(&self, id: &str, roles: &RoleSet) -> AppResult<()> {
        let resp = self.client
            .patch(self.document_url(id))
            .headers(self.headers()?)
            .json(&serde_json::json!({"data": {"roles": roles.to_idents()}}))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }
}
