//! REST API
//!
//! A subset of the Home Assistant REST API: status, service listing,
//! service calls, the panel list, the AI Automation Creator's options flow,
//! and the static paths integrations register with the frontend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ha_ai_automation::LoadedEntry;
use ha_components::{FrontendRegistry, Panel};
use ha_core::{Context, SupportsResponse};
use ha_service_registry::{ServiceError, ServiceRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Cache lifetime for static paths registered with caching
const CACHE_CONTROL: &str = "public, max-age=2678400";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ServiceRegistry>,
    pub frontend: Arc<FrontendRegistry>,
    /// The AI Automation Creator, when it is set up
    pub integration: Option<Arc<LoadedEntry>>,
}

/// API status response
#[derive(Serialize)]
pub struct ApiStatus {
    pub message: &'static str,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// One domain in `GET /api/services`
#[derive(Debug, Serialize)]
pub struct DomainServices {
    pub domain: String,
    pub services: BTreeMap<String, ServiceInfo>,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseInfo>,
}

#[derive(Debug, Serialize)]
pub struct ResponseInfo {
    pub optional: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    /// Present (with any value) to ask for the service response
    pub return_response: Option<String>,
}

/// Response of a service call made with `return_response`
#[derive(Debug, Serialize)]
pub struct ServiceCallResponse {
    pub changed_states: Vec<Value>,
    pub service_response: Value,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/", get(api_status))
        .route("/api/services", get(get_services))
        .route("/api/services/:domain/:service", post(call_service))
        .route("/api/panels", get(get_panels))
        .route(
            "/api/config/config_entries/options/:handler",
            get(show_options_flow).post(submit_options_flow),
        )
        .fallback(serve_static_path)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` completes
pub async fn start_server(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ==================== Handlers ====================

/// GET /api/ - Returns API status
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
    })
}

/// GET /api/services - Returns available services
async fn get_services(State(state): State<AppState>) -> Json<Vec<DomainServices>> {
    let mut domains: Vec<DomainServices> = state
        .services
        .all_services()
        .into_iter()
        .map(|(domain, descriptions)| DomainServices {
            domain,
            services: descriptions
                .into_iter()
                .map(|desc| {
                    let response = match desc.supports_response {
                        SupportsResponse::None => None,
                        SupportsResponse::Optional => Some(ResponseInfo { optional: true }),
                        SupportsResponse::Only => Some(ResponseInfo { optional: false }),
                    };
                    let fields = desc
                        .schema
                        .as_ref()
                        .and_then(|schema| schema.get("properties"))
                        .cloned();
                    (
                        desc.service,
                        ServiceInfo {
                            name: desc.name.unwrap_or_default(),
                            description: desc.description.unwrap_or_default(),
                            fields,
                            response,
                        },
                    )
                })
                .collect(),
        })
        .collect();
    domains.sort_by(|a, b| a.domain.cmp(&b.domain));
    Json(domains)
}

fn service_error_response(error: ServiceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match error {
        ServiceError::NotFound { .. }
        | ServiceError::InvalidData(_)
        | ServiceError::ResponseNotSupported => StatusCode::BAD_REQUEST,
        ServiceError::CallFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            message: format!("Service call failed: {}", error),
        }),
    )
}

/// POST /api/services/{domain}/{service} - Calls a service
async fn call_service(
    State(state): State<AppState>,
    Path((domain, service)): Path<(String, String)>,
    Query(query): Query<ServiceQuery>,
    body: Bytes,
) -> Response {
    let service_data: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(data) => data,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        message: format!("Data should be valid JSON: {}", e),
                    }),
                )
                    .into_response()
            }
        }
    };

    let return_response = query.return_response.is_some();
    debug!("HTTP call {}.{} (return_response: {})", domain, service, return_response);

    match state
        .services
        .call(&domain, &service, service_data, Context::new(), return_response)
        .await
    {
        Ok(response) if return_response => Json(ServiceCallResponse {
            changed_states: Vec::new(),
            service_response: response.unwrap_or(Value::Null),
        })
        .into_response(),
        Ok(_) => Json(Vec::<Value>::new()).into_response(),
        Err(e) => service_error_response(e).into_response(),
    }
}

/// GET /api/panels - Registered panels keyed by URL path
async fn get_panels(State(state): State<AppState>) -> Json<HashMap<String, Panel>> {
    Json(
        state
            .frontend
            .panels()
            .into_iter()
            .map(|panel| (panel.url_path.clone(), panel))
            .collect(),
    )
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

async fn run_options_flow(state: &AppState, handler: &str, user_input: Option<Value>) -> Response {
    if handler != ha_ai_automation::DOMAIN {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Invalid handler specified: {}", handler),
        );
    }
    let Some(entry) = &state.integration else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Integration is not set up");
    };

    match entry.options_flow(user_input).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            error!("Options flow for {} failed: {}", handler, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/config/config_entries/options/{handler} - Shows the options form
async fn show_options_flow(State(state): State<AppState>, Path(handler): Path<String>) -> Response {
    info!("HTTP GET options flow for handler: {}", handler);
    run_options_flow(&state, &handler, None).await
}

/// POST /api/config/config_entries/options/{handler} - Submits the options form
async fn submit_options_flow(
    State(state): State<AppState>,
    Path(handler): Path<String>,
    Json(user_input): Json<Value>,
) -> Response {
    info!("HTTP POST options flow for handler: {}", handler);
    run_options_flow(&state, &handler, Some(user_input)).await
}

/// Everything else: static paths registered by integrations
async fn serve_static_path(State(state): State<AppState>, request: Request) -> Response {
    let Some(entry) = state.frontend.static_path(request.uri().path()) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                message: "Not found".to_string(),
            }),
        )
            .into_response();
    };

    let mut response = match ServeFile::new(&entry.path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(infallible) => match infallible {},
    };
    if entry.cache_headers && response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    }
    response
}
