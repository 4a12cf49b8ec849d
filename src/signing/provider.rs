//! Form provider HTTP API.
//!
//! Used for two things only: fetching the live question list of a form so the
//! mapper can check its field names, and downloading the signed PDF of a
//! completed submission.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use super::{FormQuestion, FormSchema};
use crate::config::ProviderConfig;
use crate::error::{Result, ServerError};

#[async_trait]
pub trait FormProvider: Send + Sync {
    /// Question definitions of a form
    async fn questions(&self, form_id: &str) -> Result<FormSchema>;

    /// Rendered PDF of a submission
    async fn submission_pdf(&self, form_id: &str, submission_id: &str) -> Result<Bytes>;
}

/// Jotform REST client
pub struct JotformClient {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
}

impl JotformClient {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a client when an API key is configured
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        config
            .api_key
            .as_ref()
            .map(|key| Self::new(config.api_base_url.clone(), key.clone()))
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ServerError::Provider(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ServerError::Provider(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl FormProvider for JotformClient {
    async fn questions(&self, form_id: &str) -> Result<FormSchema> {
        let url = format!("{}/form/{}/questions", self.api_base_url, form_id);
        let body: Value = self
            .get(&url, &[("apiKey", self.api_key.as_str())])
            .await?
            .json()
            .await
            .map_err(|e| ServerError::Provider(format!("invalid questions response: {}", e)))?;

        parse_questions(&body)
    }

    async fn submission_pdf(&self, form_id: &str, submission_id: &str) -> Result<Bytes> {
        let url = format!("{}/generatePDF", self.api_base_url);
        let query = [
            ("formid", form_id),
            ("submissionid", submission_id),
            ("apikey", self.api_key.as_str()),
            ("download", "1"),
        ];

        self.get(&url, &query)
            .await?
            .bytes()
            .await
            .map_err(|e| ServerError::Provider(format!("failed to read PDF: {}", e)))
    }
}

/// Parse a `/form/{id}/questions` response body.
///
/// Questions come keyed by id under `content`; they are returned in numeric
/// id order. Layout-only controls without a name are dropped.
pub fn parse_questions(body: &Value) -> Result<FormSchema> {
    let content = body
        .get("content")
        .and_then(Value::as_object)
        .ok_or_else(|| ServerError::Provider("questions response has no content".to_string()))?;

    let mut questions: Vec<FormQuestion> = content
        .iter()
        .filter_map(|(key, question)| {
            let name = question.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let qid = question
                .get("qid")
                .and_then(|q| match q {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| key.clone());
            let text = question
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let control = question
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            Some(FormQuestion {
                qid,
                name: name.to_string(),
                text,
                control,
            })
        })
        .collect();

    questions.sort_by_key(|q| q.qid.parse::<u64>().unwrap_or(u64::MAX));

    Ok(FormSchema { questions })
}
