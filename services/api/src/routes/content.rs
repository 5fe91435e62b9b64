//! Page content routes, mounted under `/api/content`

use auth::middleware::{AuthUser, auth_middleware, bearer_claims, client_ip};
use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    middleware::from_fn_with_state,
    routing::get,
};
use common::content::ContentDocument;
use common::database::unix_timestamp;
use std::net::SocketAddr;
use tracing::{debug, error, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::page::{MyPage, PageQuery, PageRecord, PublicPage, UpdatePageRequest};
use crate::repositories::visit::hash_ip;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/my-page", get(get_my_page).put(update_my_page))
        .route_layer(from_fn_with_state(
            state.auth.jwt_service.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/:slug", get(get_public_page))
        .merge(protected)
}

fn decode_stored(page: &PageRecord) -> ApiResult<ContentDocument> {
    ContentDocument::from_stored(&page.content).map_err(|e| {
        error!("Stored content for page {} is unreadable: {}", page.slug, e);
        ApiError::InternalServerError
    })
}

/// Public page by slug, gated for the owner's current tier
pub async fn get_public_page(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PublicPage>> {
    let found = state
        .page_repository
        .find_with_owner(&slug)
        .await?
        .filter(|found| found.page.is_published)
        .ok_or_else(|| ApiError::NotFound("Page not found".to_string()))?;

    if !found.owner_active {
        return Err(ApiError::Forbidden(
            "This page is currently unavailable".to_string(),
        ));
    }

    let content = decode_stored(&found.page)?;

    if query.track {
        let is_admin_hit = bearer_claims(&headers, &state.auth.jwt_service)
            .is_some_and(|claims| claims.id == found.page.user_id);
        let ip_hash = hash_ip(&client_ip(&headers, addr, state.config.trust_proxy));

        match state
            .visit_repository
            .record(&found.page.slug, &ip_hash, is_admin_hit, unix_timestamp())
            .await
        {
            Ok(recorded) => debug!(slug = %found.page.slug, recorded, is_admin_hit, "Visit tracked"),
            Err(e) => warn!("Failed to record visit for {}: {}", found.page.slug, e),
        }
    }

    Ok(Json(PublicPage {
        slug: found.page.slug,
        plan_tier: found.owner_tier,
        content: content.gated_for(found.owner_tier),
    }))
}

async fn load_my_page(state: &AppState, user_id: i64) -> ApiResult<MyPage> {
    let user = state
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let page = state
        .page_repository
        .find_by_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Page not found".to_string()))?;

    Ok(MyPage {
        content: decode_stored(&page)?,
        slug: page.slug,
        is_published: page.is_published,
        plan_tier: user.plan_tier,
        updated_at: page.updated_at,
    })
}

/// The caller's own page, ungated
pub async fn get_my_page(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MyPage>> {
    Ok(Json(load_my_page(&state, auth_user.id).await?))
}

/// Replace the caller's page content
pub async fn update_my_page(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<UpdatePageRequest>,
) -> ApiResult<Json<MyPage>> {
    let value = payload
        .content
        .ok_or_else(|| ApiError::BadRequest("Content is required".to_string()))?;
    let document =
        ContentDocument::decode(value).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let stored = document.to_stored().map_err(|e| {
        error!("Failed to encode content: {}", e);
        ApiError::InternalServerError
    })?;

    let updated = state
        .page_repository
        .update_content(auth_user.id, &stored, payload.is_published)
        .await?;
    if !updated {
        return Err(ApiError::NotFound("Page not found".to_string()));
    }

    Ok(Json(load_my_page(&state, auth_user.id).await?))
}
