//! Day0 case record service: a search DSL over stored case documents plus
//! the HTTP API and CLI built on it.

pub mod config;
pub mod database;
pub mod export;
pub mod model;
pub mod openapi;
pub mod request_logging;
pub mod search;
pub mod validation;

use config::AppConfig;
use database::Database;
use poem::{middleware::Cors, EndpointExt, Route};
use poem_openapi::OpenApiService;
use request_logging::RequestLogging;
use std::sync::Arc;

/// HTTP application: API under `/api`, Swagger UI under `/docs`.
pub fn build_app(db: Arc<Database>, config: Arc<AppConfig>) -> impl poem::Endpoint {
    let api_service = OpenApiService::new(
        openapi::create_combined_api(),
        "Day0 Case API",
        env!("CARGO_PKG_VERSION"),
    )
    .server("/api");
    let docs = api_service.swagger_ui();
    let spec = api_service.spec_endpoint();

    Route::new()
        .nest("/api", api_service)
        .nest("/docs", docs)
        .at("/openapi.json", spec)
        .data(db)
        .data(config)
        .with(Cors::new())
        .with(RequestLogging)
}
