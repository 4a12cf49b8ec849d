use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Unsupported document type: {0}")]
    UnsupportedDocumentType(String),

    #[error("Signature token not found: {0}")]
    TokenNotFound(String),

    #[error("Signature token already finalized: {0}")]
    TokenAlreadyFinalized(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidWebhookPayload(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Form provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::UnsupportedDocumentType(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::TokenNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::TokenAlreadyFinalized(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::InvalidWebhookPayload(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ServerError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
