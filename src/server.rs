use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::{Method, StatusCode};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, ResponseError, error, get, middleware, web};
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::completion::CompletionClient;
use crate::config::GatewayConfig;
use crate::error::{ApiError, GatewayError};
use crate::gateway::Gateway;
use crate::logging::{self, LoggingConfig};
use crate::session::{DEFAULT_SESSION_ID, SessionStore, is_valid_session_id};

pub const SESSION_ID_HEADER: &str = "X-Session-Id";
const SESSION_ID_FIELD: &str = "session_id";

#[derive(Debug)]
pub struct AppState {
    gateway: Gateway,
    config: GatewayConfig,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> reqwest::Result<Self> {
        let completion = CompletionClient::new(config.upstream.clone())?;
        let sessions = SessionStore::new(config.session.clone());
        Ok(Self {
            gateway: Gateway::new(sessions, completion),
            config,
        })
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Session id from the `X-Session-Id` header, else the body's `session_id`
/// field, else the shared default session.
fn resolve_session_id(req: &HttpRequest, body: &Value) -> Result<String, ApiError> {
    let candidate = match req.headers().get(SESSION_ID_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::bad_request("Invalid session id"))?
                .to_string(),
        ),
        None => match body.get(SESSION_ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(_) => return Err(ApiError::bad_request("Invalid session id")),
        },
    };

    match candidate {
        Some(id) if is_valid_session_id(&id) => Ok(id),
        Some(_) => Err(ApiError::bad_request("Invalid session id")),
        None => Ok(DEFAULT_SESSION_ID.to_string()),
    }
}

// Custom error handler for JSON payload errors.
fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    error!("JSON payload error: {:?}", err);
    match &err {
        error::JsonPayloadError::OverflowKnownLength { length, limit } => {
            ApiError::payload_too_large(format!(
                "Payload too large: {} bytes exceeds limit of {} bytes",
                length, limit
            ))
            .into()
        }
        error::JsonPayloadError::Overflow { limit } => {
            ApiError::payload_too_large(format!("Payload exceeds limit of {} bytes", limit)).into()
        }
        _ => ApiError::bad_request(format!("Invalid JSON payload: {}", err)).into(),
    }
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

async fn chat(
    req: HttpRequest,
    body: web::Json<Value>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let config = state.config();
    let session_id = resolve_session_id(&req, &body)?;
    let text = body.get(config.request_field.as_str()).and_then(Value::as_str);

    match state.gateway().chat(&session_id, text).await {
        Ok(completion) => {
            let mut payload = Map::new();
            payload.insert(
                config.response_field.clone(),
                Value::String(completion.into_text()),
            );
            Ok(HttpResponse::Ok()
                .insert_header((SESSION_ID_HEADER, session_id))
                .json(payload))
        }
        Err(err) => {
            let message = match &err {
                GatewayError::InvalidRequest(_) => config.profile.missing_input_message(),
                GatewayError::Upstream(_) => config.profile.upstream_failure_message(),
            };
            Ok(HttpResponse::build(err.status_code())
                .insert_header((SESSION_ID_HEADER, session_id))
                .json(json!({ "error": message })))
        }
    }
}

async fn delete_session(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    if state.gateway().sessions().remove(&session_id) {
        info!(session_id = %session_id, "Conversation cleared");
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::not_found("Session not found"))
    }
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn method_not_allowed() -> HttpResponse {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").error_response()
}

async fn fallback(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        HttpResponse::NoContent().finish()
    } else {
        ApiError::not_found("Not found").error_response()
    }
}

fn cors_headers(origin: &str) -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", origin.to_string()))
        .add(("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS"))
        .add((
            "Access-Control-Allow-Headers",
            format!("Content-Type, {}", SESSION_ID_HEADER),
        ))
        .add(("Access-Control-Expose-Headers", SESSION_ID_HEADER))
}

/// Builds the application for `state`; shared by the server and tests.
pub fn create_app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let config = state.config();
    let json_config = web::JsonConfig::default()
        .limit(config.max_payload_size)
        .error_handler(json_error_handler);
    let cors = cors_headers(&config.cors_allow_origin);
    let route = config.route.clone();

    App::new()
        .wrap(cors)
        .wrap(middleware::Logger::default())
        .app_data(json_config)
        .app_data(state)
        .service(health)
        .service(
            web::resource(route)
                .route(web::post().to(chat))
                .route(web::method(Method::OPTIONS).to(preflight))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/sessions/{session_id}")
                .route(web::delete().to(delete_session))
                .route(web::method(Method::OPTIONS).to(preflight))
                .default_service(web::to(method_not_allowed)),
        )
        .default_service(web::to(fallback))
}

/// Drops idle conversations on a fixed interval.
pub async fn periodic_eviction(sessions: SessionStore) {
    let mut ticker = tokio::time::interval(sessions.config().eviction_interval);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let evicted = sessions.evict_idle();
        if evicted > 0 {
            info!(
                evicted,
                remaining = sessions.len(),
                "Evicted idle conversations"
            );
        }
    }
}

pub async fn startup(config: GatewayConfig) -> std::io::Result<()> {
    let _log_guard = logging::init_logging(LoggingConfig {
        level: logging::parse_level(&config.log_level),
        json_format: config.log_json,
        log_dir: config.log_dir.clone(),
        ..LoggingConfig::default()
    });

    info!(
        "Starting {:?} gateway on {}:{}",
        config.profile, config.host, config.port
    );
    info!(
        "Route: POST {} ({} -> {})",
        config.route, config.request_field, config.response_field
    );
    info!(
        "Upstream: {} model={} timeout={:?}",
        config.upstream.endpoint, config.upstream.model, config.upstream.timeout
    );
    info!(
        "Window size: {} turns, session TTL: {:?}, max sessions: {}",
        config.session.window_size, config.session.ttl, config.session.max_sessions
    );

    let app_state = AppState::new(config.clone()).map_err(std::io::Error::other)?;
    let app_state = web::Data::new(app_state);

    tokio::spawn(periodic_eviction(app_state.gateway().sessions().clone()));

    HttpServer::new(move || create_app(app_state.clone()))
        .bind((config.host.clone(), config.port))?
        .run()
        .await
}
