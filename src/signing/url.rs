//! Prefilled provider form URLs.

use super::{CaseData, DocumentType, MappedFields};
use crate::config::ProviderConfig;
use crate::error::{Result, ServerError};

/// Query parameter carrying the signature token
pub const TOKEN_PARAM: &str = "signature_token";
/// Query parameter carrying the raw case number
pub const CASE_NUMBER_PARAM: &str = "case_number";

/// Case-data keys the raw case number may be stored under
const CASE_NUMBER_KEYS: &[&str] = &["caseNumber", "case_number", "caseRef", "caseId"];

/// Build the prefilled form URL for a document.
///
/// The token is always the first parameter and cannot be overridden by a
/// mapped field. Values are percent-encoded with spaces as `%20`.
pub fn build_form_url(
    config: &ProviderConfig,
    document_type: DocumentType,
    fields: &MappedFields,
    token: &str,
    case_number: Option<&str>,
) -> Result<String> {
    let form_id = config
        .form_id(document_type)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::UnsupportedDocumentType(document_type.to_string()))?;

    let mut url = format!(
        "{}/{}?{}={}",
        config.form_base_url.trim_end_matches('/'),
        form_id,
        TOKEN_PARAM,
        urlencoding::encode(token)
    );

    for (key, value) in fields.iter() {
        if key == TOKEN_PARAM || key == CASE_NUMBER_PARAM {
            continue;
        }
        push_param(&mut url, key, value);
    }

    if let Some(case_number) = case_number.map(str::trim).filter(|c| !c.is_empty()) {
        push_param(&mut url, CASE_NUMBER_PARAM, case_number);
    }

    Ok(url)
}

/// Pull the raw case number out of a case record, if present
pub fn case_number(case_data: &CaseData) -> Option<String> {
    CASE_NUMBER_KEYS.iter().find_map(|key| match case_data.get(*key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn push_param(url: &mut String, key: &str, value: &str) {
    url.push('&');
    url.push_str(&urlencoding::encode(key));
    url.push('=');
    url.push_str(&urlencoding::encode(value));
}
