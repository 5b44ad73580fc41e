pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod session;
pub mod state;
pub mod ws_handler;

pub use middleware::scanner_guard;
pub use state::AppState;
pub use ws_handler::ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method, StatusCode,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use rest::ApiDoc;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Three 4 MiB photos as base64 plus the rest of the JSON body.
const BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Builds the full application router: REST endpoints, the session socket,
/// Swagger UI, and the middleware stack. The scanner guard is the outermost
/// layer, so it sees every request first.
pub fn router(app_state: Arc<AppState>) -> Router {
    let allow_origin = match &app_state.config.allowed_origin {
        Some(origin) => AllowOrigin::exact(origin.clone()),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let api_router = Router::new()
        .route("/api/poem", post(rest::generate_poem_handler))
        .route("/api/poem/revise", post(rest::customize_poem_handler))
        .route("/api/speech", post(rest::text_to_speech_handler))
        .route("/api/image", post(rest::generate_image_handler))
        .route("/api/video", post(rest::generate_video_handler))
        .route("/api/voices", get(rest::list_voices_handler))
        .route("/api/voices/test", post(rest::test_voice_handler))
        .route("/api/voices/probe", post(rest::probe_voices_handler))
        .route("/health", get(rest::health_handler))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(scanner_guard))
}
