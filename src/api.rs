//! HTTP API handlers for TrunkLink.
//!
//! The service exposes the subscription surface and a manual broadcast
//! endpoint:
//!
//! - `POST /subscribe` - Register a push destination, optionally with a location
//! - `POST /notify` - Broadcast a notification to all destinations
//! - `POST /update-location` - Update a subscriber's last-known location
//! - `GET /` - Service banner with subscriber count
//! - `GET /status` - Monitoring status
//! - `GET /health` - Health check

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::dispatch::Dispatcher;
use crate::model::{GeoPoint, NotificationPayload, PushSubscription, Subscriber};
use crate::registry::Registry;
use crate::state::AlertStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<Mutex<AlertStore>>,
    pub started_at: Instant,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/subscribe", post(subscribe))
        .route("/notify", post(notify))
        .route("/update-location", post(update_location))
        .route("/status", get(status))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request body for POST /subscribe.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub subscription: Option<PushSubscription>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(rename = "userInfo", default = "default_user_info")]
    pub user_info: Value,
}

fn default_user_info() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "subscriberCount")]
    pub subscriber_count: i64,
}

/// Request body for POST /notify.
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub message: String,
    pub total: usize,
    pub successful: usize,
}

/// Request body for POST /update-location.
#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(rename = "subscriptionEndpoint")]
    pub subscription_endpoint: String,
    pub location: GeoPoint,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ErrorBody {
    fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// GET / - Service banner.
#[instrument(skip(state))]
pub async fn service_info(State(state): State<AppState>) -> Response {
    match state.registry.count().await {
        Ok(subscribers) => Json(serde_json::json!({
            "status": "running",
            "subscribers": subscribers,
            "message": "TrunkLink Push Service with Proximity Monitoring"
        }))
        .into_response(),
        Err(error) => {
            warn!(%error, "failed to count subscribers");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /subscribe - Register a push destination.
///
/// The subscription object is required; location and contact metadata are
/// optional. Re-subscribing an existing endpoint replaces the old record.
#[instrument(skip(state, request))]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Response {
    let Some(subscription) = request.subscription else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Subscription object is required")),
        )
            .into_response();
    };

    let subscriber = Subscriber {
        subscription,
        location: request.location,
        contact: request.user_info,
        subscribed_at: Utc::now(),
    };

    if let Err(error) = state.registry.upsert(&subscriber).await {
        warn!(%error, "failed to store subscriber");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match state.registry.count().await {
        Ok(subscriber_count) => {
            info!(
                subscriber_count,
                has_location = subscriber.location.is_some(),
                "new subscriber added"
            );
            (
                StatusCode::CREATED,
                Json(SubscribeResponse {
                    success: true,
                    message: "Subscribed successfully".to_string(),
                    subscriber_count,
                }),
            )
                .into_response()
        }
        Err(error) => {
            warn!(%error, "failed to count subscribers");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /notify - Broadcast a notification to all destinations.
#[instrument(skip(state, request))]
pub async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Response {
    let (Some(title), Some(body)) = (request.title, request.body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Title and body are required")),
        )
            .into_response();
    };

    let subscribers = match state.registry.all().await {
        Ok(subscribers) => subscribers,
        Err(error) => {
            warn!(%error, "failed to load subscribers");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(title = %title, destinations = subscribers.len(), "manual notification");

    let payload = NotificationPayload {
        title,
        body,
        data: None,
    };
    let destinations = subscribers
        .iter()
        .map(|s| s.endpoint().to_string())
        .collect();

    let outcome = state.dispatcher.broadcast(&payload, destinations).await;

    Json(NotifyResponse {
        message: "Notifications sent".to_string(),
        total: outcome.attempted,
        successful: outcome.delivered,
    })
    .into_response()
}

/// POST /update-location - Update a subscriber's last-known location.
#[instrument(skip(state, request))]
pub async fn update_location(
    State(state): State<AppState>,
    Json(request): Json<UpdateLocationRequest>,
) -> Response {
    match state
        .registry
        .update_location(&request.subscription_endpoint, request.location)
        .await
    {
        Ok(true) => {
            info!("subscriber location updated");
            Json(serde_json::json!({
                "success": true,
                "message": "Location updated"
            }))
            .into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("Subscriber not found")),
        )
            .into_response(),
        Err(error) => {
            warn!(%error, "failed to update location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /status - Monitoring status.
#[instrument(skip(state))]
pub async fn status(State(state): State<AppState>) -> Response {
    let subscribers = match state.registry.count().await {
        Ok(count) => count,
        Err(error) => {
            warn!(%error, "failed to count subscribers");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cooldowns = state.store.lock().await.cooldown_count();

    Json(serde_json::json!({
        "subscribers": subscribers,
        "monitoring": "active",
        "cooldowns": cooldowns,
        "uptime": state.started_at.elapsed().as_secs()
    }))
    .into_response()
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
