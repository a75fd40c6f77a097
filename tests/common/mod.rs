#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use movieo_sync::MovieoClient;
use movieo_sync::global::config::{ApiConfig, RetryConfig};

pub const TOKEN: &str = "secret-token";

/// In-memory stand-in for the Movieo backend
#[derive(Default)]
pub struct Backend {
    pub customizations: Mutex<HashMap<String, Value>>,
    pub achievements: Mutex<Value>,
    /// Bodies of every accepted PUT, in arrival order
    pub saved: Mutex<Vec<(String, Value)>>,
    pub single_fetches: Mutex<Vec<(String, Option<String>)>>,
    pub checks: Mutex<Vec<Option<String>>>,
    /// Number of 429 answers to give before serving achievements
    pub throttle: Mutex<u32>,
    pub requests: Mutex<u32>,
}

pub type Shared = Arc<Backend>;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn authorized(backend: &Backend, headers: &HeaderMap) -> bool {
    *backend.requests.lock().unwrap() += 1;
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

/// Uploaded paths are served from the CDN host
fn canonical(value: &Value) -> Value {
    match value.as_str() {
        Some(path) if path.starts_with('/') => json!(format!("https://cdn.movieo.test{}", path)),
        _ => value.clone(),
    }
}

async fn list_customizations(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&backend, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let data = backend.customizations.lock().unwrap().clone();
    Json(json!({ "success": true, "data": data })).into_response()
}

async fn get_customization(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&backend, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    backend
        .single_fetches
        .lock()
        .unwrap()
        .push((id.clone(), query.get("type").cloned()));

    match backend.customizations.lock().unwrap().get(&id) {
        Some(entry) => Json(json!({ "success": true, "data": entry })).into_response(),
        None => error(StatusCode::NOT_FOUND, "Customization not found"),
    }
}

async fn put_customization(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&backend, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if body.get("type").and_then(Value::as_str).is_none() {
        return error(StatusCode::BAD_REQUEST, "Media type is required");
    }
    if body.to_string().contains("rejected") {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Image could not be processed");
    }

    backend.saved.lock().unwrap().push((id.clone(), body.clone()));

    let mut entry = serde_json::Map::new();
    for field in ["customBackground", "customPoster"] {
        if let Some(value) = body.get(field) {
            entry.insert(field.to_string(), canonical(value));
        }
    }
    let entry = Value::Object(entry);
    backend.customizations.lock().unwrap().insert(id, entry.clone());

    // bare body, unlike the list endpoint
    Json(entry).into_response()
}

async fn get_achievements(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&backend, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    {
        let mut throttle = backend.throttle.lock().unwrap();
        if *throttle > 0 {
            *throttle -= 1;
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "0")],
                Json(json!({ "success": false, "message": "Slow down" })),
            )
                .into_response();
        }
    }
    Json(backend.achievements.lock().unwrap().clone()).into_response()
}

async fn check_all(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&backend, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    backend.checks.lock().unwrap().push(None);
    Json(json!({ "success": true, "message": "Achievements checked" })).into_response()
}

async fn check_category(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(category): Path<String>,
) -> Response {
    if !authorized(&backend, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    backend.checks.lock().unwrap().push(Some(category));
    Json(json!({ "success": true })).into_response()
}

/// Serve `backend` on an ephemeral port and return its base URL
pub async fn spawn(backend: Shared) -> String {
    let router = Router::new()
        .route("/api/customization", get(list_customizations))
        .route("/api/customization/{id}", get(get_customization).put(put_customization))
        .route("/api/achievements", get(get_achievements))
        .route("/api/achievements/check", post(check_all))
        .route("/api/achievements/check/{category}", post(check_category))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}/api", addr)
}

pub fn client(base_url: &str, token: Option<&str>) -> MovieoClient {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        token: token.map(str::to_string),
        timeout_seconds: 5,
        user_agent: "movieo-sync-tests".to_string(),
        rate_limit: 1000.0,
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    };
    MovieoClient::new(&config).unwrap()
}
