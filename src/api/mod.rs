pub mod handlers;
pub mod types;

use std::sync::Arc;
use axum::{routing::{get, post}, Router};

pub use handlers::{
    AppState, create_signature, get_signature, health, list_case_signatures, mark_signed,
    open_form, provider_webhook, signed_document,
};

/// Create the signing router
/// - API: /api/signatures, /api/cases/:case_id/signatures
/// - Signer entry: /sign/:token
/// - Provider callback: /webhooks/form-provider
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/signatures", post(create_signature))
        .route("/api/signatures/:token", get(get_signature))
        .route("/api/signatures/:token/signed", post(mark_signed))
        .route("/api/signatures/:token/document", get(signed_document))
        .route("/api/cases/:case_id/signatures", get(list_case_signatures))
        .route("/sign/:token", get(open_form))
        .route("/webhooks/form-provider", post(provider_webhook))
        .route("/health", get(health))
}
