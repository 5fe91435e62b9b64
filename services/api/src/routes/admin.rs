//! Super-admin console routes, mounted under `/api/admin`

use auth::middleware::{AuthUser, auth_middleware, require_admin};
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{delete, get, put},
};
use common::tier::{PlanTier, TierEvent};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::admin::{AdminUserSummary, UpdateStatusRequest, UpdateTierRequest};
use crate::state::AppState;

/// Every route requires a valid token and a live super-admin account.
/// Layers run bottom-up: the token check happens before the admin lookup.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", delete(delete_user))
        .route("/users/:id/tier", put(update_tier))
        .route("/users/:id/status", put(update_status))
        .route_layer(from_fn_with_state(state.auth.users.clone(), require_admin))
        .route_layer(from_fn_with_state(
            state.auth.jwt_service.clone(),
            auth_middleware,
        ))
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<AdminUserSummary>>> {
    Ok(Json(state.admin_repository.list_users().await?))
}

pub async fn update_tier(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTierRequest>,
) -> ApiResult<Json<Value>> {
    let tier = payload
        .plan_tier
        .parse::<PlanTier>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if id == caller.id && tier != PlanTier::AdmServer {
        return Err(ApiError::BadRequest(
            "You cannot remove your own admin access".to_string(),
        ));
    }

    let user = state
        .users()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let plan_tier = state
        .users()
        .apply_tier_event(&user, TierEvent::AdminOverride(tier))
        .await?;

    Ok(Json(json!({ "id": id, "planTier": plan_tier })))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Value>> {
    let is_active = payload
        .is_active
        .ok_or_else(|| ApiError::BadRequest("isActive must be a boolean".to_string()))?;

    if id == caller.id && !is_active {
        return Err(ApiError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    if !state.users().set_active(id, is_active).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    Ok(Json(json!({ "id": id, "isActive": is_active })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if id == caller.id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    if !state.admin_repository.delete_user(id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!("Admin {} deleted user {}", caller.username, id);
    Ok(Json(json!({ "message": "User deleted" })))
}
