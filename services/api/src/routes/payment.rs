//! Billing routes, mounted under `/api/payment`

use auth::middleware::{AuthUser, auth_middleware};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware::from_fn_with_state,
    routing::post,
};
use common::database::unix_timestamp;
use common::tier::TierEvent;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::billing::{StripeClient, StripeEvent, WebhookError, verify_signature};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/create-portal-session", post(create_portal_session))
        .route_layer(from_fn_with_state(
            state.auth.jwt_service.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/webhook", post(webhook))
        .merge(protected)
}

fn billing(state: &AppState) -> ApiResult<&StripeClient> {
    state
        .billing
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing is not configured".to_string()))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let billing = billing(&state)?;
    let user = state
        .users()
        .find_by_id(auth_user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let url = billing
        .create_checkout_session(user.id, &user.email, user.stripe_customer_id.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to create checkout session: {:#}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(json!({ "url": url })))
}

pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let billing = billing(&state)?;
    let user = state
        .users()
        .find_by_id(auth_user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let customer_id = user
        .stripe_customer_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("No billing account found".to_string()))?;

    let url = billing
        .create_portal_session(customer_id)
        .await
        .map_err(|e| {
            error!("Failed to create portal session: {:#}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(json!({ "url": url })))
}

/// Signed event callback from Stripe
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing is not configured".to_string()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(WebhookError::MissingSignature.to_string()))?;

    verify_signature(&body, signature, secret, unix_timestamp()).map_err(|e| {
        warn!("Rejected webhook: {}", e);
        ApiError::BadRequest(e.to_string())
    })?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid event payload: {}", e)))?;

    info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");
    handle_event(&state, &event).await?;

    Ok(Json(json!({ "received": true })))
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

async fn handle_event(state: &AppState, event: &StripeEvent) -> ApiResult<()> {
    let object = &event.data.object;
    let users = state.users();

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let by_reference = match str_field(object, "client_reference_id")
                .and_then(|id| id.parse::<i64>().ok())
            {
                Some(id) => users.find_by_id(id).await?,
                None => None,
            };
            let user = match by_reference {
                Some(user) => Some(user),
                None => match object
                    .get("customer_details")
                    .and_then(|details| str_field(details, "email"))
                {
                    Some(email) => users.find_by_email(&email.to_lowercase()).await?,
                    None => None,
                },
            };
            let Some(user) = user else {
                warn!("Checkout {} matches no user", event.id);
                return Ok(());
            };

            users
                .start_subscription(
                    user.id,
                    str_field(object, "customer"),
                    str_field(object, "subscription"),
                )
                .await?;
            users
                .apply_tier_event(&user, TierEvent::CheckoutCompleted)
                .await?;
        }
        "customer.subscription.updated" => {
            let Some(user) = subscription_owner(state, object).await? else {
                return Ok(());
            };
            users
                .update_subscription(
                    user.id,
                    None,
                    None,
                    str_field(object, "status"),
                    object.get("current_period_end").and_then(Value::as_i64),
                )
                .await?;
        }
        "customer.subscription.deleted" => {
            let Some(user) = subscription_owner(state, object).await? else {
                return Ok(());
            };
            users
                .update_subscription(user.id, None, None, Some("canceled"), None)
                .await?;
            users
                .apply_tier_event(&user, TierEvent::SubscriptionCancelled)
                .await?;
        }
        other => {
            info!("Ignoring webhook event type {}", other);
        }
    }

    Ok(())
}

async fn subscription_owner(
    state: &AppState,
    subscription: &Value,
) -> ApiResult<Option<auth::models::User>> {
    let Some(subscription_id) = str_field(subscription, "id") else {
        return Ok(None);
    };

    let user = state
        .users()
        .find_by_subscription_id(subscription_id)
        .await?;
    if user.is_none() {
        warn!("Subscription {} matches no user", subscription_id);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use crate::billing::sign;
    use auth::repositories::user::hash_password;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use crate::test_support::{app, bearer, insert_user, send, temp_upload_dir, test_pool, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use common::database::unix_timestamp;
    use common::tier::PlanTier;
    use serde_json::{Value, json};

    const SECRET: &str = "whsec_test";

    async fn setup() -> AppState {
        let mut config = AppConfig::for_tests(&temp_upload_dir());
        config.stripe_webhook_secret = Some(SECRET.to_string());
        test_state(test_pool().await, config)
    }

    async fn deliver(state: &AppState, event: Value, signature: Option<String>) -> StatusCode {
        let body = event.to_string();
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/payment/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        let (status, _) = send(app(state.clone()), builder.body(Body::from(body)).unwrap()).await;
        status
    }

    async fn deliver_signed(state: &AppState, event: Value) -> StatusCode {
        let signature = sign(event.to_string().as_bytes(), SECRET, unix_timestamp());
        deliver(state, event, Some(signature)).await
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let state = setup().await;
        let user = insert_user(&state.db_pool, "buyer", PlanTier::Static).await;

        let status = deliver_signed(
            &state,
            json!({
                "id": "evt_1",
                "type": "checkout.session.completed",
                "data": { "object": {
                    "client_reference_id": user.id.to_string(),
                    "customer": "cus_1",
                    "subscription": "sub_1"
                }}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.users().find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_tier, PlanTier::Premium);
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(stored.subscription_status.as_deref(), Some("active"));

        let status = deliver_signed(
            &state,
            json!({
                "id": "evt_2",
                "type": "customer.subscription.updated",
                "data": { "object": {
                    "id": "sub_1",
                    "status": "past_due",
                    "current_period_end": 1_900_000_000
                }}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let stored = state.users().find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.subscription_status.as_deref(), Some("past_due"));
        assert_eq!(stored.subscription_expires_at, Some(1_900_000_000));

        let status = deliver_signed(
            &state,
            json!({
                "id": "evt_3",
                "type": "customer.subscription.deleted",
                "data": { "object": { "id": "sub_1" } }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.users().find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_tier, PlanTier::Basic);
        assert_eq!(stored.subscription_status.as_deref(), Some("canceled"));
    }

    #[tokio::test]
    async fn test_resubscribe_survives_next_login() {
        let state = setup().await;
        let user = insert_user(&state.db_pool, "lapsed", PlanTier::Premium).await;
        let password_hash = hash_password("password1").unwrap();
        state
            .users()
            .update_password(user.id, &password_hash)
            .await
            .unwrap();
        state
            .users()
            .update_subscription(user.id, Some("cus_1"), Some("sub_1"), Some("active"), Some(1000))
            .await
            .unwrap();

        assert_eq!(login(&state, "lapsed").await, "static");

        let status = deliver_signed(
            &state,
            json!({
                "id": "evt_1",
                "type": "checkout.session.completed",
                "data": { "object": {
                    "client_reference_id": user.id.to_string(),
                    "customer": "cus_1",
                    "subscription": "sub_2"
                }}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.users().find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_tier, PlanTier::Premium);
        assert_eq!(stored.subscription_expires_at, None);
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_2"));

        assert_eq!(login(&state, "lapsed").await, "premium");
    }

    async fn login(state: &AppState, username: &str) -> String {
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": "password1" }).to_string(),
            ))
            .unwrap();
        let (status, body) = send(app(state.clone()), request).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["user"]["planTier"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_checkout_never_changes_admin_tier() {
        let state = setup().await;
        let admin = insert_user(&state.db_pool, "root", PlanTier::AdmServer).await;

        let status = deliver_signed(
            &state,
            json!({
                "id": "evt_1",
                "type": "checkout.session.completed",
                "data": { "object": { "client_reference_id": admin.id.to_string() } }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.users().find_by_id(admin.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_tier, PlanTier::AdmServer);
    }

    #[tokio::test]
    async fn test_unsigned_or_tampered_webhooks_are_rejected() {
        let state = setup().await;
        let user = insert_user(&state.db_pool, "buyer", PlanTier::Static).await;
        let event = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "client_reference_id": user.id.to_string() } }
        });

        assert_eq!(deliver(&state, event.clone(), None).await, StatusCode::BAD_REQUEST);

        let signature = sign(b"{}", SECRET, unix_timestamp());
        assert_eq!(
            deliver(&state, event.clone(), Some(signature)).await,
            StatusCode::BAD_REQUEST
        );

        let stale = sign(event.to_string().as_bytes(), SECRET, unix_timestamp() - 3_600);
        assert_eq!(deliver(&state, event, Some(stale)).await, StatusCode::BAD_REQUEST);

        let stored = state.users().find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_tier, PlanTier::Static);
    }

    #[tokio::test]
    async fn test_unknown_events_are_acknowledged() {
        let state = setup().await;
        let status = deliver_signed(
            &state,
            json!({ "id": "evt_9", "type": "invoice.paid", "data": { "object": {} } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_billing_not_configured() {
        let state = test_state(test_pool().await, AppConfig::for_tests(&temp_upload_dir()));
        let user = insert_user(&state.db_pool, "buyer", PlanTier::Static).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/payment/create-checkout-session")
            .header(header::AUTHORIZATION, bearer(&state, &user))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(state.clone()), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let status = deliver(
            &state,
            json!({ "id": "evt_1", "type": "ping", "data": { "object": {} } }),
            Some("t=1,v1=00".to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
