// Shared HTTP response types for JSON error payloads.

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
