//! Handlers mounted behind the edge filter: role administration and the
//! institution registry. They can rely on a `RequestContext` extension.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{roles_for, unique_id, RequestContext, RoleSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RolesPayload { pub roles: Vec<String> }

#[derive(Debug, Deserialize)]
pub struct InstitutionPayload { pub name: String }

pub async fn get_roles(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let roles = roles_for(state.directory.as_ref(), &id).await;
    Json(serde_json::json!({"id": id, "roles": roles}))
}

pub async fn put_roles(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(payload): Json<RolesPayload>,
) -> AppResult<impl IntoResponse> {
    let roles = RoleSet::parse_strict(&payload.roles)?;
    state.directory.set_roles(&id, &roles).await?;
    info!(actor = %ctx.user.id, target_user = %id, roles = ?roles.to_idents(), "roles replaced");
    Ok(Json(serde_json::json!({"id": id, "roles": roles})))
}

pub async fn list_institutions(State(state): State<AppState>) -> impl IntoResponse {
    let list = state.institutions.read().await.clone();
    Json(list)
}

pub async fn create_institution(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<InstitutionPayload>,
) -> AppResult<impl IntoResponse> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("missing_name", "institution name is required"));
    }
    let inst = Institution {
        id: unique_id(),
        name: name.to_string(),
        created_by: ctx.user.id.clone(),
        created_at: Utc::now(),
    };
    state.institutions.write().await.push(inst.clone());
    info!(institution = %inst.id, actor = %ctx.user.id, "institution created");
    Ok((StatusCode::CREATED, Json(inst)))
}
