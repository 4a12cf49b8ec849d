//! Form provider webhook payloads.

use serde_json::{Map, Value};

use crate::error::{Result, ServerError};

/// A validated submission callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub form_id: String,
    pub submission_id: String,
    /// Token echoed back by the prefilled hidden field, when present
    pub signature_token: Option<String>,
}

const FORM_ID_KEYS: &[&str] = &["form_id", "formID"];
const SUBMISSION_ID_KEYS: &[&str] = &["submission_id", "submissionID"];
const TOKEN_KEYS: &[&str] = &["signature_token", "signatureToken"];

/// Parse and validate a webhook body.
///
/// Both identifiers must be present and non-blank; the error names the first
/// one missing.
pub fn parse_webhook(body: &[u8]) -> Result<WebhookPayload> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ServerError::InvalidWebhookPayload(format!("malformed JSON: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(ServerError::InvalidWebhookPayload(
            "expected a JSON object".to_string(),
        ));
    };

    let form_id = identifier(&object, FORM_ID_KEYS)
        .ok_or_else(|| ServerError::InvalidWebhookPayload("missing form_id".to_string()))?;
    let submission_id = identifier(&object, SUBMISSION_ID_KEYS)
        .ok_or_else(|| ServerError::InvalidWebhookPayload("missing submission_id".to_string()))?;

    let signature_token = identifier(&object, TOKEN_KEYS).or_else(|| token_from_raw_request(&object));

    Ok(WebhookPayload {
        form_id,
        submission_id,
        signature_token,
    })
}

/// First non-blank string or number under any of `keys`
fn identifier(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Submitted answers arrive as a JSON string under `rawRequest`, keyed by the
/// provider's `q<id>_<name>` field names.
fn token_from_raw_request(object: &Map<String, Value>) -> Option<String> {
    let raw = object.get("rawRequest")?.as_str()?;
    let Ok(Value::Object(answers)) = serde_json::from_str::<Value>(raw) else {
        return None;
    };

    identifier(&answers, TOKEN_KEYS).or_else(|| {
        answers.iter().find_map(|(key, value)| {
            if !key.ends_with("_signature_token") {
                return None;
            }
            value
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    })
}
