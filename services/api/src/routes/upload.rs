//! Image upload, mounted under `/api/upload`

use auth::middleware::auth_middleware;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::post,
};
use serde_json::{Value, json};
use std::path::Path;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(upload_image))
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .route_layer(from_fn_with_state(
            state.auth.jwt_service.clone(),
            auth_middleware,
        ))
}

/// Identify a supported image format from its leading bytes
pub fn detect_image_extension(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File is too large".to_string())
    } else {
        ApiError::BadRequest(format!("Invalid upload: {}", e.body_text()))
    }
}

/// Store one image from the `image` field and return its public URL
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("image") {
            image = Some(field.bytes().await.map_err(multipart_error)?);
            break;
        }
    }

    let bytes = image.ok_or_else(|| ApiError::BadRequest("No image uploaded".to_string()))?;

    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "File is too large (max {} bytes)",
            state.config.max_upload_bytes
        )));
    }

    let extension = detect_image_extension(&bytes).ok_or_else(|| {
        ApiError::BadRequest("Only JPEG, PNG, GIF and WebP images are allowed".to_string())
    })?;

    let file_name = format!(
        "{}-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        &uuid::Uuid::new_v4().simple().to_string()[..8],
        extension
    );
    let upload_dir = Path::new(&state.config.upload_dir);

    tokio::fs::create_dir_all(upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory: {}", e);
        ApiError::InternalServerError
    })?;
    tokio::fs::write(upload_dir.join(&file_name), &bytes)
        .await
        .map_err(|e| {
            error!("Failed to store upload {}: {}", file_name, e);
            ApiError::InternalServerError
        })?;

    info!("Stored upload {} ({} bytes)", file_name, bytes.len());

    Ok(Json(json!({ "url": format!("/uploads/{}", file_name) })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::test_support::{app, bearer, insert_user, send, temp_upload_dir, test_pool, test_state};
    use axum::body::Body;
    use axum::http::{Request, header};
    use common::tier::PlanTier;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-LANDING-BOUNDARY";
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"file.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::AUTHORIZATION, token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_detect_image_extension() {
        assert_eq!(detect_image_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(detect_image_extension(PNG), Some("png"));
        assert_eq!(detect_image_extension(b"GIF89a...."), Some("gif"));
        assert_eq!(detect_image_extension(b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
        assert_eq!(detect_image_extension(b"<svg></svg>"), None);
        assert_eq!(detect_image_extension(b""), None);
    }

    #[tokio::test]
    async fn test_upload_stores_image_and_serves_it() {
        let upload_dir = temp_upload_dir();
        let state = test_state(test_pool().await, AppConfig::for_tests(&upload_dir));
        let user = insert_user(&state.db_pool, "artist", PlanTier::Static).await;
        let token = bearer(&state, &user);

        let (status, body) = send(
            app(state.clone()),
            upload_request(&token, multipart_body("image", PNG)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let url = body["url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".png"));

        let stored = std::fs::read(Path::new(&upload_dir).join(&url["/uploads/".len()..])).unwrap();
        assert_eq!(stored, PNG);

        let response = app(state)
            .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        std::fs::remove_dir_all(&upload_dir).ok();
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images_and_oversized_files() {
        let upload_dir = temp_upload_dir();
        let mut config = AppConfig::for_tests(&upload_dir);
        config.max_upload_bytes = 16;
        let state = test_state(test_pool().await, config);
        let user = insert_user(&state.db_pool, "artist", PlanTier::Static).await;
        let token = bearer(&state, &user);

        let (status, _) = send(
            app(state.clone()),
            upload_request(&token, multipart_body("image", b"#!/bin/sh\necho hi\n")),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, _) = send(
            app(state.clone()),
            upload_request(&token, multipart_body("image", b"plain text")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app(state.clone()),
            upload_request(&token, multipart_body("file", PNG)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app(state), upload_request("Bearer nope", multipart_body("image", PNG))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        std::fs::remove_dir_all(&upload_dir).ok();
    }
}
