use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{
    ApiActivationResponse, ApiFlagsRequest, ApiNavigateRequest, ApiRevertResponse,
    ApiStatusResponse,
};
use demo_metrics::activation::Activation;
use demo_metrics::config::EngineConfig;
use demo_metrics::{
    Engine, HttpUpstream, InterceptionController, OutboundRequest, OutboundResponse, OutboundSlot,
    RevertHandle, Upstream,
};

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    slot: Arc<OutboundSlot>,
    controller: Arc<InterceptionController>,
    activation: Arc<Activation>,
    revert: RevertHandle,
    backend: String,
}

pub async fn serve(args: crate::ServeArgs) -> Result<(), String> {
    let (config, config_path) = EngineConfig::load(args.config.clone())?;
    if args.write_config {
        let path = config_path.ok_or_else(|| "no config path to write to".to_string())?;
        config.write(&path)?;
        info!(path = %path.display(), "configuration written");
        return Ok(());
    }

    let backend = config.upstream.base_url.trim_end_matches('/').to_string();
    let flags = config.flags;
    let pages = config.pages.clone();

    let http: Arc<dyn Upstream> = Arc::new(HttpUpstream::from_config(&config.upstream)?);
    let slot = Arc::new(OutboundSlot::new(http));
    let engine = Arc::new(Engine::load(config).await?);
    let controller = Arc::new(InterceptionController::new(slot.clone(), engine.clone()));
    let activation = Arc::new(Activation::new(controller.clone(), flags, &pages)?);
    activation.evaluate().await;

    let state = AppState {
        engine,
        slot,
        revert: controller.revert_handle(),
        controller,
        activation,
        backend: backend.clone(),
    };

    let app = Router::new()
        .route("/_demo/health", get(health))
        .route("/_demo/status", get(status_handler))
        .route("/_demo/navigate", post(navigate_handler))
        .route("/_demo/flags", put(flags_handler))
        .route("/_demo/revert", post(revert_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|err| format!("invalid bind address: {}", err))?;
    info!(%addr, backend = %backend, "demo proxy listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        format!("failed to bind server: {}", err)
    })?, app)
    .await
    .map_err(|err| format!("server error: {}", err))?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn status_handler(State(state): State<AppState>) -> Json<ApiStatusResponse> {
    let domains = state.controller.active_domains().await;
    Json(ApiStatusResponse {
        installed: state.controller.is_installed(),
        active_domains: crate::api::domain_labels(&domains),
        flags: state.activation.flags().await,
        page_url: state.activation.page_url().await,
        stored_entities: state.engine.store().len().await,
        upstream: state.slot.current().await.describe(),
        backend: state.backend.clone(),
    })
}

async fn navigate_handler(
    State(state): State<AppState>,
    Json(request): Json<ApiNavigateRequest>,
) -> Result<Json<ApiActivationResponse>, (StatusCode, String)> {
    let url = request.into_url().map_err(|err| (StatusCode::BAD_REQUEST, err))?;
    let domains = state.activation.navigate(&url).await;
    Ok(Json(ApiActivationResponse::new(
        state.controller.is_installed(),
        &domains,
    )))
}

async fn flags_handler(
    State(state): State<AppState>,
    Json(request): Json<ApiFlagsRequest>,
) -> Json<ApiActivationResponse> {
    let flags = request.apply(state.activation.flags().await);
    let domains = state.activation.update_flags(flags).await;
    Json(ApiActivationResponse::new(
        state.controller.is_installed(),
        &domains,
    ))
}

async fn revert_handler(State(state): State<AppState>) -> Json<ApiRevertResponse> {
    Json(ApiRevertResponse {
        reverted: state.revert.revert().await,
    })
}

async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("failed to read request body: {}", err))
                .into_response()
        }
    };
    let path = parts
        .uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");

    let outbound = OutboundRequest {
        method: parts.method.clone(),
        url: format!("{}{}", state.backend, path),
        headers: parts.headers.clone(),
        body: body.to_vec(),
    };

    match state.slot.send(outbound).await {
        Ok(response) => into_response(response),
        Err(err) => {
            warn!(path, "upstream unavailable: {}", err);
            (StatusCode::BAD_GATEWAY, err).into_response()
        }
    }
}

fn into_response(outbound: OutboundResponse) -> Response {
    let mut response = Response::new(Body::from(outbound.body));
    *response.status_mut() = outbound.status;
    *response.headers_mut() = outbound.headers;
    response
}
