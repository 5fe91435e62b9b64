//! Visit statistics for the caller's page, mounted under `/api/stats`

use auth::middleware::{AuthUser, auth_middleware};
use axum::{
    Extension, Json, Router, extract::State, middleware::from_fn_with_state, routing::get,
};
use common::database::unix_timestamp;

use crate::error::{ApiError, ApiResult};
use crate::models::stats::PageStats;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_stats))
        .route_layer(from_fn_with_state(
            state.auth.jwt_service.clone(),
            auth_middleware,
        ))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PageStats>> {
    let slug = state
        .users()
        .page_slug(auth_user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Page not found".to_string()))?;

    let stats = state
        .visit_repository
        .stats(&slug, unix_timestamp())
        .await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::test_support::{app, bearer, insert_user, send, temp_upload_dir, test_pool, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use common::database::unix_timestamp;
    use common::tier::PlanTier;

    #[tokio::test]
    async fn test_stats_for_own_page() {
        let state = test_state(test_pool().await, AppConfig::for_tests(&temp_upload_dir()));
        let owner = insert_user(&state.db_pool, "venue", PlanTier::Basic).await;
        let other = insert_user(&state.db_pool, "other", PlanTier::Basic).await;
        let now = unix_timestamp();

        state.visit_repository.record("venue", "a", false, now - 60).await.unwrap();
        state.visit_repository.record("venue", "b", false, now - 3 * 86_400).await.unwrap();
        state.visit_repository.record("venue", "owner", true, now).await.unwrap();
        state.visit_repository.record("other", "a", false, now).await.unwrap();

        let request = Request::builder()
            .uri("/api/stats")
            .header(header::AUTHORIZATION, bearer(&state, &owner))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(state.clone()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["slug"], "venue");
        assert_eq!(body["total"], 2);
        assert_eq!(body["last24h"], 1);
        assert_eq!(body["last7d"], 2);
        assert_eq!(body["daily"].as_array().unwrap().len(), 30);
        assert_eq!(body["recent"].as_array().unwrap().len(), 2);

        let request = Request::builder()
            .uri("/api/stats")
            .header(header::AUTHORIZATION, bearer(&state, &other))
            .body(Body::empty())
            .unwrap();
        let (_, body) = send(app(state), request).await;
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_stats_require_token() {
        let state = test_state(test_pool().await, AppConfig::for_tests(&temp_upload_dir()));
        let request = Request::builder().uri("/api/stats").body(Body::empty()).unwrap();
        let (status, _) = send(app(state), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
