use super::common::{ApiTags, HealthResponse};
use crate::config::AppConfig;
use poem::web::Data;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;

pub struct SystemApi;

#[OpenApi]
impl SystemApi {
    /// Health check endpoint
    ///
    /// Returns the health status of the API server
    #[oai(path = "/health", method = "get", tag = "ApiTags::System")]
    async fn health(&self, config: Data<&Arc<AppConfig>>) -> Json<HealthResponse> {
        Json(HealthResponse {
            success: true,
            message: "Day0 case service is running".to_string(),
            environment: config.environment.clone(),
        })
    }
}
