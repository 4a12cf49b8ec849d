//! Signing API handlers and shared application state.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};

use super::types::*;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::signing::{
    build_form_url, case_number, map_fields, mapping_table, parse_webhook, DocumentType, FormProvider,
    JotformClient, MappedFields, NewSignatureToken, SignatureToken, TokenLifecycle, TokenStatus, TokenStore,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub tokens: TokenLifecycle,
    /// Provider API client, present when an API key is configured
    pub provider: Option<Arc<dyn FormProvider>>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn TokenStore>) -> Self {
        let provider = JotformClient::from_config(&config.provider)
            .map(|client| Arc::new(client) as Arc<dyn FormProvider>);
        if provider.is_none() {
            tracing::info!("No form provider API key set; mapping without live schemas");
        }

        Self {
            config,
            tokens: TokenLifecycle::new(store),
            provider,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn FormProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Issue a token for a document and record its prefilled form link.
    ///
    /// Fails with `UnsupportedDocumentType` before anything is stored when the
    /// document type has no mapping table or form id.
    pub async fn issue(&self, data: NewSignatureToken) -> Result<IssuedToken> {
        let document_type = data.document_type;
        let table = mapping_table(document_type)?;
        let form_id = self
            .config
            .provider
            .form_id(document_type)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ServerError::UnsupportedDocumentType(document_type.to_string()))?;

        let schema = match &self.provider {
            Some(provider) => match provider.questions(&form_id).await {
                Ok(schema) => Some(schema),
                Err(e) => {
                    tracing::warn!(
                        "Schema fetch for form {} failed, using static mapping: {}",
                        form_id,
                        e
                    );
                    None
                }
            },
            None => None,
        };

        let fields = table.map(&data.form_data, schema.as_ref());
        let reference = case_number(&data.form_data).unwrap_or_else(|| data.case_id.clone());

        let case_id = data.case_id.clone();
        let token = self.tokens.issue(data).await?;
        let (link, record) = match self.attach_link(&token, document_type, &fields, &reference).await {
            Ok(linked) => linked,
            Err(e) => {
                tracing::warn!(
                    "Token {}… for case {} stored without a form link: {}",
                    token.get(..8).unwrap_or(token.as_str()),
                    case_id,
                    e
                );
                return Err(e);
            }
        };

        Ok(IssuedToken {
            signing_url: self.config.signing_url(&token),
            token,
            form_link: link,
            expires_at: record.expires_at,
        })
    }

    async fn attach_link(
        &self,
        token: &str,
        document_type: DocumentType,
        fields: &MappedFields,
        reference: &str,
    ) -> Result<(String, SignatureToken)> {
        let link = build_form_url(&self.config.provider, document_type, fields, token, Some(reference))?;
        let record = self.tokens.set_form_link(token, link.clone()).await?;
        Ok((link, record))
    }

    /// Stored form link, rebuilt from the issuance snapshot if it was never
    /// written
    async fn form_link_for(&self, record: &SignatureToken) -> Result<String> {
        if let Some(link) = &record.form_link {
            return Ok(link.clone());
        }

        let fields = map_fields(record.document_type, &record.form_data, None)?;
        let reference = case_number(&record.form_data).unwrap_or_else(|| record.case_id.clone());
        let link = build_form_url(
            &self.config.provider,
            record.document_type,
            &fields,
            &record.token,
            Some(reference.as_str()),
        )?;
        self.tokens.set_form_link(&record.token, link.clone()).await?;
        Ok(link)
    }
}

/// JSON response helper
fn json_response<T: serde::Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

/// POST /api/signatures - Issue a signature token
pub async fn create_signature(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSignatureRequest>,
) -> Response {
    let document_type: DocumentType = match req.document_type.parse() {
        Ok(doc) => doc,
        Err(e) => return e.into_response(),
    };

    if req.case_id.trim().is_empty() {
        return ServerError::InvalidRequest("caseId is required".to_string()).into_response();
    }
    if req.client_email.trim().is_empty() {
        return ServerError::InvalidRequest("clientEmail is required".to_string()).into_response();
    }

    let data = NewSignatureToken {
        case_id: req.case_id.trim().to_string(),
        client_email: req.client_email.trim().to_string(),
        document_type,
        form_data: req.form_data,
    };

    match state.issue(data).await {
        Ok(issued) => json_response(StatusCode::CREATED, issued),
        Err(e) => e.into_response(),
    }
}

/// GET /api/signatures/:token - Look up a token
pub async fn get_signature(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.tokens.lookup(&token).await {
        Ok(record) => json_response(StatusCode::OK, TokenView::at(record, state.tokens.now())),
        Err(e) => e.into_response(),
    }
}

/// GET /api/cases/:case_id/signatures - Token history for a case
pub async fn list_case_signatures(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Response {
    let now = state.tokens.now();
    match state.tokens.store().get_all_for_case(&case_id).await {
        Ok(records) => {
            let views: Vec<TokenView> = records
                .into_iter()
                .map(|record| TokenView::at(record, now))
                .collect();
            json_response(StatusCode::OK, views)
        }
        Err(e) => e.into_response(),
    }
}

/// POST /api/signatures/:token/signed - Record a captured signature
pub async fn mark_signed(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.tokens.mark_signed(&token).await {
        Ok(record) => json_response(StatusCode::OK, TokenView::at(record, state.tokens.now())),
        Err(e) => e.into_response(),
    }
}

/// GET /api/signatures/:token/document - Signed PDF from the provider
pub async fn signed_document(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    let record = match state.tokens.lookup(&token).await {
        Ok(record) => record,
        Err(e) => return e.into_response(),
    };

    let submission_id = match (&record.status, &record.external_submission_id) {
        (TokenStatus::Completed, Some(id)) => id.clone(),
        _ => {
            return ServerError::InvalidRequest(format!(
                "document for token is {}, not completed",
                record.status
            ))
            .into_response()
        }
    };

    let Some(provider) = &state.provider else {
        return ServerError::InvalidRequest("form provider API is not configured".to_string())
            .into_response();
    };

    let Some(form_id) = state.config.provider.form_id(record.document_type) else {
        return ServerError::UnsupportedDocumentType(record.document_type.to_string())
            .into_response();
    };

    match provider.submission_pdf(&form_id, &submission_id).await {
        Ok(pdf) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!(
                        "attachment; filename=\"{}-{}.pdf\"",
                        record.document_type, record.case_id
                    ),
                ),
            ],
            pdf,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /sign/:token - Signer entry point: record access, then redirect to the form
pub async fn open_form(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    let record = match state.tokens.access(&token).await {
        Ok(record) => record,
        Err(e) => return e.into_response(),
    };

    match state.form_link_for(&record).await {
        Ok(link) => Redirect::to(&link).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /webhooks/form-provider - Submission callback from the form provider
pub async fn provider_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload = match parse_webhook(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Rejected webhook: {}", e);
            return e.into_response();
        }
    };

    let Some(document_type) = state.config.provider.document_type_for_form(&payload.form_id) else {
        tracing::warn!(
            "Webhook for unknown form {} (submission {})",
            payload.form_id,
            payload.submission_id
        );
        return json_response(StatusCode::ACCEPTED, WebhookAck::ignored("unknown form"));
    };

    let Some(token) = payload.signature_token.as_deref() else {
        tracing::warn!(
            "Webhook for {} submission {} carries no signature token",
            document_type,
            payload.submission_id
        );
        return json_response(StatusCode::ACCEPTED, WebhookAck::ignored("no signature token"));
    };

    match state.tokens.store().get_by_token(token).await {
        Ok(Some(record)) if record.document_type != document_type => {
            return ServerError::InvalidWebhookPayload(format!(
                "form {} is a {} form but the token was issued for {}",
                payload.form_id, document_type, record.document_type
            ))
            .into_response();
        }
        Ok(_) => {}
        Err(e) => return e.into_response(),
    }

    match state.tokens.complete(token, &payload.submission_id).await {
        Ok(_) => json_response(
            StatusCode::OK,
            WebhookAck {
                status: "completed",
                document_type: Some(document_type.to_string()),
                reason: None,
            },
        ),
        Err(e) => e.into_response(),
    }
}

/// GET /health - Health check
pub async fn health() -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION")
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{FormQuestion, FormSchema, MemoryTokenStore, TokenUpdate, TOKEN_LEN};
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeProvider {
        schema: Option<FormSchema>,
    }

    #[async_trait]
    impl FormProvider for FakeProvider {
        async fn questions(&self, _form_id: &str) -> Result<FormSchema> {
            self.schema
                .clone()
                .ok_or_else(|| ServerError::Provider("unavailable".to_string()))
        }

        async fn submission_pdf(&self, _form_id: &str, submission_id: &str) -> Result<Bytes> {
            Ok(Bytes::from(format!("%PDF-{}", submission_id)))
        }
    }

    /// Memory store whose updates fail
    struct ReadOnlyStore(MemoryTokenStore);

    #[async_trait]
    impl TokenStore for ReadOnlyStore {
        async fn create(&self, data: NewSignatureToken, now: i64) -> Result<String> {
            self.0.create(data, now).await
        }

        async fn get_by_token(&self, token: &str) -> Result<Option<SignatureToken>> {
            self.0.get_by_token(token).await
        }

        async fn get_by_id(&self, id: i32) -> Result<Option<SignatureToken>> {
            self.0.get_by_id(id).await
        }

        async fn get_all_for_case(&self, case_id: &str) -> Result<Vec<SignatureToken>> {
            self.0.get_all_for_case(case_id).await
        }

        async fn update(&self, _id: i32, _update: TokenUpdate, _now: i64) -> Result<SignatureToken> {
            Err(ServerError::Internal("read only".to_string()))
        }
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            ServerConfig::default(),
            Arc::new(MemoryTokenStore::new()),
        ))
    }

    fn claims_request() -> NewSignatureToken {
        NewSignatureToken {
            case_id: "C1".to_string(),
            client_email: "a@b.com".to_string(),
            document_type: DocumentType::Claims,
            form_data: json!({
                "clientName": "John Smith",
                "clientEmail": "a@b.com",
                "caseNumber": "MB-1042",
            })
            .as_object()
            .unwrap()
            .clone(),
        }
    }

    #[tokio::test]
    async fn test_issue_records_form_link() {
        let state = state();
        let issued = state.issue(claims_request()).await.unwrap();

        assert_eq!(issued.token.len(), TOKEN_LEN);
        assert_eq!(
            issued.signing_url,
            format!("http://127.0.0.1:8080/sign/{}", issued.token)
        );
        assert!(issued
            .form_link
            .starts_with(&format!("https://form.jotform.com/232543267390861?signature_token={}", issued.token)));
        assert!(issued.form_link.contains("nafEmail=a%40b.com"));
        assert!(issued.form_link.ends_with("&case_number=MB-1042"));

        let record = state.tokens.lookup(&issued.token).await.unwrap();
        assert_eq!(record.form_link.as_deref(), Some(issued.form_link.as_str()));
        assert_eq!(record.status, TokenStatus::Pending);
        assert_eq!(record.expires_at, issued.expires_at);
    }

    #[tokio::test]
    async fn test_issue_link_failure_leaves_pending_token() {
        let store = Arc::new(ReadOnlyStore(MemoryTokenStore::new()));
        let state = AppState::new(ServerConfig::default(), store.clone());

        let err = state.issue(claims_request()).await.unwrap_err();
        assert!(matches!(err, ServerError::Internal(_)));

        let stored = store.get_all_for_case("C1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TokenStatus::Pending);
        assert_eq!(stored[0].form_link, None);
    }

    #[tokio::test]
    async fn test_issue_falls_back_to_case_id() {
        let state = state();
        let mut data = claims_request();
        data.form_data.remove("caseNumber");
        let issued = state.issue(data).await.unwrap();
        assert!(issued.form_link.ends_with("&case_number=C1"));
    }

    #[tokio::test]
    async fn test_issue_uses_live_schema() {
        let schema = FormSchema {
            questions: vec![FormQuestion {
                qid: "7".to_string(),
                name: "emailAddress".to_string(),
                text: "Client Email".to_string(),
                control: "control_email".to_string(),
            }],
        };
        let state = AppState::new(ServerConfig::default(), Arc::new(MemoryTokenStore::new()))
            .with_provider(Arc::new(FakeProvider { schema: Some(schema) }));

        let issued = state.issue(claims_request()).await.unwrap();
        assert!(issued.form_link.contains("emailAddress=a%40b.com"));
        assert!(!issued.form_link.contains("nafEmail"));
        // Name field is absent from the live form
        assert!(!issued.form_link.contains("nafName"));
    }

    #[tokio::test]
    async fn test_issue_survives_schema_failure() {
        let state = AppState::new(ServerConfig::default(), Arc::new(MemoryTokenStore::new()))
            .with_provider(Arc::new(FakeProvider { schema: None }));

        let issued = state.issue(claims_request()).await.unwrap();
        assert!(issued.form_link.contains("nafEmail=a%40b.com"));
    }

    #[tokio::test]
    async fn test_issue_rejects_unconfigured_form() {
        let mut config = ServerConfig::default();
        config.provider = config.provider.with_form_id(DocumentType::Claims, " ");
        let store = Arc::new(MemoryTokenStore::new());
        let state = AppState::new(config, store.clone());

        let err = state.issue(claims_request()).await.unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedDocumentType(_)));
        assert!(store.get_all_for_case("C1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_signature_rejects_unknown_type() {
        let req = CreateSignatureRequest {
            case_id: "C1".to_string(),
            client_email: "a@b.com".to_string(),
            document_type: "hire-purchase".to_string(),
            form_data: Default::default(),
        };
        let response = create_signature(State(state()), Json(req)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_open_form_marks_access_and_redirects() {
        let state = state();
        let issued = state.issue(claims_request()).await.unwrap();

        let response = open_form(State(state.clone()), Path(issued.token.clone())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
            issued.form_link
        );

        let record = state.tokens.lookup(&issued.token).await.unwrap();
        assert_eq!(record.status, TokenStatus::Accessed);

        let response = open_form(State(state), Path("unknown".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_open_form_rebuilds_missing_link() {
        let state = state();
        let token = state.tokens.issue(claims_request()).await.unwrap();

        let response = open_form(State(state.clone()), Path(token.clone())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let record = state.tokens.lookup(&token).await.unwrap();
        let link = record.form_link.unwrap();
        assert!(link.contains(&format!("signature_token={}", token)));
    }

    #[tokio::test]
    async fn test_webhook_completes_token() {
        let state = state();
        let mut data = claims_request();
        data.document_type = DocumentType::NotAtFaultRental;
        let issued = state.issue(data).await.unwrap();

        let body = json!({
            "form_id": "233241680987464",
            "submission_id": "999",
            "signature_token": issued.token,
        });
        let response =
            provider_webhook(State(state.clone()), Bytes::from(body.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let record = state.tokens.lookup(&issued.token).await.unwrap();
        assert_eq!(record.status, TokenStatus::Completed);
        assert_eq!(record.external_submission_id.as_deref(), Some("999"));

        // Duplicate delivery is accepted
        let response = provider_webhook(State(state.clone()), Bytes::from(body.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let again = state.tokens.lookup(&issued.token).await.unwrap();
        assert_eq!(again.completed_at, record.completed_at);

        // A second submission for the same token conflicts
        let other = json!({
            "form_id": "233241680987464",
            "submission_id": "1000",
            "signature_token": issued.token,
        });
        let response = provider_webhook(State(state.clone()), Bytes::from(other.to_string())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let after = state.tokens.lookup(&issued.token).await.unwrap();
        assert_eq!(after.external_submission_id.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn test_webhook_rejects_invalid_payloads() {
        let state = state();

        let response = provider_webhook(
            State(state.clone()),
            Bytes::from_static(br#"{"form_id":"233241680987464"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            provider_webhook(State(state.clone()), Bytes::from_static(b"form_id=1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_ignores_unknown_forms() {
        let state = state();
        let response = provider_webhook(
            State(state),
            Bytes::from_static(br#"{"form_id":"1","submission_id":"2","signature_token":"x"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_webhook_document_type_mismatch() {
        let state = state();
        let issued = state.issue(claims_request()).await.unwrap();

        let body = json!({
            "form_id": "233241680987464",
            "submission_id": "999",
            "signature_token": issued.token,
        });
        let response = provider_webhook(State(state.clone()), Bytes::from(body.to_string())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let record = state.tokens.lookup(&issued.token).await.unwrap();
        assert_eq!(record.status, TokenStatus::Pending);
    }

    #[tokio::test]
    async fn test_webhook_for_unknown_token() {
        let state = state();
        let body = json!({
            "form_id": "233241680987464",
            "submission_id": "999",
            "signature_token": "0".repeat(TOKEN_LEN),
        });
        let response = provider_webhook(State(state), Bytes::from(body.to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_signed_document() {
        let state = Arc::new(
            AppState::new(ServerConfig::default(), Arc::new(MemoryTokenStore::new()))
                .with_provider(Arc::new(FakeProvider { schema: None })),
        );
        let issued = state.issue(claims_request()).await.unwrap();

        let response = signed_document(State(state.clone()), Path(issued.token.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        state.tokens.complete(&issued.token, "777").await.unwrap();
        let response = signed_document(State(state.clone()), Path(issued.token.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"%PDF-777");
    }
}
