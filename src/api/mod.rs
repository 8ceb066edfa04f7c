//! HTTP layer: router composition and the OpenAPI document.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Path the OpenAPI JSON document is served from.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// OpenAPI description of the gateway's HTTP surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "shopper-gateway", description = "Real-time WebSocket bridge to the message broker"),
    paths(handlers::system::health_handler, crate::ws::handler::ws_handler),
    components(schemas(handlers::HealthResponse)),
    tags(
        (name = "System", description = "Service status"),
        (name = "Realtime", description = "WebSocket event stream"),
    )
)]
pub struct ApiDoc;

/// Builds the route table without state or middleware.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .merge(handlers::system::routes())
        .route("/ws", get(ws_handler))
        .merge(docs_routes())
}

/// Builds the complete application: routes, middleware, and state.
pub fn build_app(state: AppState) -> Router {
    build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(feature = "swagger-ui")]
fn docs_routes() -> Router<AppState> {
    Router::new()
        .merge(utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_routes() -> Router<AppState> {
    use axum::Json;

    Router::new().route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_health_and_ws() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/ws"));
    }
}
