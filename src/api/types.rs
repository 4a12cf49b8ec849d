//! Request and response bodies for the signing API.

use serde::{Deserialize, Serialize};

use crate::signing::{CaseData, SignatureToken};

// ============================================================================
// Request Types
// ============================================================================

/// POST /api/signatures request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSignatureRequest {
    pub case_id: String,
    pub client_email: String,
    /// Parsed separately so unknown types map to `UnsupportedDocumentType`
    pub document_type: String,
    #[serde(default)]
    pub form_data: CaseData,
}

// ============================================================================
// Response Types
// ============================================================================

/// Result of issuing a token
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    /// Prefilled provider URL
    pub form_link: String,
    /// Link sent to the signer; records access before redirecting
    pub signing_url: String,
    pub expires_at: i64,
}

/// A stored token plus its validity at response time
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    #[serde(flatten)]
    pub record: SignatureToken,
    pub valid: bool,
}

impl TokenView {
    pub fn at(record: SignatureToken, now: i64) -> Self {
        let valid = record.is_valid_at(now);
        Self { record, valid }
    }
}

/// Webhook acknowledgement
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WebhookAck {
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            status: "ignored",
            document_type: None,
            reason: Some(reason.into()),
        }
    }
}
