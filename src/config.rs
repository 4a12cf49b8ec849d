//! Server configuration.
//!
//! Everything is read from the environment once at startup. Each struct has a
//! `Default` that works for a local run.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::signing::{document_type_from_form_id, DocumentType};

/// Default validity window of a signature token
pub const DEFAULT_TOKEN_TTL_HOURS: u64 = 72;

/// Form provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Host serving the fillable forms (prefill URLs are built against it)
    pub form_base_url: String,
    /// REST API root used for schema and PDF retrieval
    pub api_base_url: String,
    /// API key; schema fetch and PDF retrieval are disabled without it
    pub api_key: Option<String>,
    /// Per-document-type form id overrides
    pub form_ids: HashMap<DocumentType, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            form_base_url: "https://form.jotform.com".to_string(),
            api_base_url: "https://api.jotform.com".to_string(),
            api_key: None,
            form_ids: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("FORM_PROVIDER_BASE_URL") {
            config.form_base_url = url;
        }
        if let Ok(url) = std::env::var("FORM_PROVIDER_API_URL") {
            config.api_base_url = url;
        }
        config.api_key = std::env::var("FORM_PROVIDER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        for doc in DocumentType::ALL {
            if let Ok(form_id) = std::env::var(format!("FORM_ID_{}", doc.env_suffix())) {
                config = config.with_form_id(doc, form_id);
            }
        }

        config
    }

    /// Override the form id for one document type
    pub fn with_form_id(mut self, doc: DocumentType, form_id: impl Into<String>) -> Self {
        self.form_ids.insert(doc, form_id.into());
        self
    }

    /// Form id for a document type: explicit override first, then the built-in table
    pub fn form_id(&self, doc: DocumentType) -> Option<String> {
        self.form_ids
            .get(&doc)
            .cloned()
            .or_else(|| doc.default_form_id().map(str::to_string))
    }

    /// Reverse lookup honouring overrides
    pub fn document_type_for_form(&self, form_id: &str) -> Option<DocumentType> {
        let form_id = form_id.trim();
        self.form_ids
            .iter()
            .find(|(_, id)| id.as_str() == form_id)
            .map(|(doc, _)| *doc)
            .or_else(|| document_type_from_form_id(form_id))
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    /// Keep tokens in memory instead of SQLite (lost on restart)
    pub in_memory: bool,
    pub bind_addr: SocketAddr,
    /// Public base URL of this service, used for signer-facing links
    pub public_url: String,
    pub token_ttl: Duration,
    pub provider: ProviderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir()
                .join("claim-signing")
                .join("claim-signing.db"),
            in_memory: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_url: "http://127.0.0.1:8080".to_string(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_HOURS * 60 * 60),
            provider: ProviderConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CLAIM_SIGNING_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        config.in_memory = matches!(
            std::env::var("CLAIM_SIGNING_IN_MEMORY").as_deref(),
            Ok("1") | Ok("true")
        );

        if let Ok(addr) = std::env::var("CLAIM_SIGNING_BIND") {
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(_) => tracing::warn!("Ignoring invalid CLAIM_SIGNING_BIND: {}", addr),
            }
        }

        if let Ok(url) = std::env::var("CLAIM_SIGNING_PUBLIC_URL") {
            config.public_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(hours) = std::env::var("CLAIM_SIGNING_TOKEN_TTL_HOURS") {
            match parse_ttl_hours(&hours) {
                Some(ttl) => config.token_ttl = ttl,
                None => tracing::warn!("Ignoring invalid CLAIM_SIGNING_TOKEN_TTL_HOURS: {}", hours),
            }
        }

        config.provider = ProviderConfig::from_env();
        config
    }

    /// Signer-facing link for a token; opening it marks the token accessed
    pub fn signing_url(&self, token: &str) -> String {
        format!("{}/sign/{}", self.public_url, token)
    }
}

/// Positive whole hours whose length in seconds fits a unix timestamp
fn parse_ttl_hours(hours: &str) -> Option<Duration> {
    let secs = hours
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|h| *h > 0)?
        .checked_mul(60 * 60)
        .filter(|s| i64::try_from(*s).is_ok())?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl_hours() {
        assert_eq!(parse_ttl_hours("24"), Some(Duration::from_secs(24 * 3600)));
        assert_eq!(parse_ttl_hours(" 1 "), Some(Duration::from_secs(3600)));
        assert_eq!(parse_ttl_hours("0"), None);
        assert_eq!(parse_ttl_hours("-3"), None);
        assert_eq!(parse_ttl_hours("soon"), None);
        assert_eq!(parse_ttl_hours(&u64::MAX.to_string()), None);
        assert_eq!(parse_ttl_hours(&(u64::MAX / 3600).to_string()), None);
    }

    #[test]
    fn test_default_ttl_is_72_hours() {
        let config = ServerConfig::default();
        assert_eq!(config.token_ttl, Duration::from_secs(72 * 3600));
        assert_eq!(config.signing_url("abc"), "http://127.0.0.1:8080/sign/abc");
    }

    #[test]
    fn test_form_id_override() {
        let config = ProviderConfig::default().with_form_id(DocumentType::Claims, "111");
        assert_eq!(config.form_id(DocumentType::Claims).as_deref(), Some("111"));
        assert_eq!(
            config.form_id(DocumentType::NotAtFaultRental).as_deref(),
            Some("233241680987464")
        );
        assert_eq!(config.document_type_for_form("111"), Some(DocumentType::Claims));
        assert_eq!(
            config.document_type_for_form("233241680987464"),
            Some(DocumentType::NotAtFaultRental)
        );
        assert_eq!(config.document_type_for_form("999"), None);
    }
}
