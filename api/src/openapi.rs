pub mod cases;
pub mod common;
pub mod system;

pub use cases::CasesApi;
pub use system::SystemApi;

use poem_openapi::OpenApi;

/// Combines all API modules into a single OpenAPI document
pub fn create_combined_api() -> impl OpenApi {
    (SystemApi, CasesApi)
}
