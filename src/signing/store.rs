//! Signature token persistence.
//!
//! The store is a plain key-value layer: it generates tokens, computes the
//! deadline and merges updates, but it does not know the state machine. That
//! lives in [`super::lifecycle`]. Concurrent updates to the same record are
//! last-writer-wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use super::token::{generate_token, NewSignatureToken, SignatureToken, TokenStatus, TokenUpdate};
use crate::config::DEFAULT_TOKEN_TTL_HOURS;
use crate::db::entities::signature_token;
use crate::error::{Result, ServerError};

/// Persistence for signature tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store a new `pending` token issued at `now`; returns the token string
    async fn create(&self, data: NewSignatureToken, now: i64) -> Result<String>;

    /// Exact-match lookup by token string
    async fn get_by_token(&self, token: &str) -> Result<Option<SignatureToken>>;

    /// Lookup by record id
    async fn get_by_id(&self, id: i32) -> Result<Option<SignatureToken>>;

    /// Every token issued for a case, newest first
    async fn get_all_for_case(&self, case_id: &str) -> Result<Vec<SignatureToken>>;

    /// Merge `update` into the record and refresh `updated_at`
    async fn update(&self, id: i32, update: TokenUpdate, now: i64) -> Result<SignatureToken>;
}

fn default_validity() -> Duration {
    Duration::from_secs(DEFAULT_TOKEN_TTL_HOURS * 60 * 60)
}

fn deadline(now: i64, validity: Duration) -> i64 {
    let secs = i64::try_from(validity.as_secs()).unwrap_or(i64::MAX);
    now.saturating_add(secs)
}

/// In-memory token store
pub struct MemoryTokenStore {
    inner: RwLock<MemoryInner>,
    validity: Duration,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i32,
    tokens: HashMap<i32, SignatureToken>,
    by_token: HashMap<String, i32>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_validity(default_validity())
    }

    pub fn with_validity(validity: Duration) -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
            validity,
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, data: NewSignatureToken, now: i64) -> Result<String> {
        let mut inner = self.inner.write();

        let mut token = generate_token();
        while inner.by_token.contains_key(&token) {
            token = generate_token();
        }

        inner.next_id += 1;
        let id = inner.next_id;

        let record = SignatureToken {
            id,
            token: token.clone(),
            case_id: data.case_id,
            client_email: data.client_email,
            document_type: data.document_type,
            form_data: data.form_data,
            form_link: None,
            status: TokenStatus::Pending,
            expires_at: deadline(now, self.validity),
            signed_at: None,
            completed_at: None,
            external_submission_id: None,
            created_at: now,
            updated_at: now,
        };

        inner.by_token.insert(token.clone(), id);
        inner.tokens.insert(id, record);

        Ok(token)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<SignatureToken>> {
        let inner = self.inner.read();
        Ok(inner
            .by_token
            .get(token)
            .and_then(|id| inner.tokens.get(id))
            .cloned())
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<SignatureToken>> {
        Ok(self.inner.read().tokens.get(&id).cloned())
    }

    async fn get_all_for_case(&self, case_id: &str) -> Result<Vec<SignatureToken>> {
        let inner = self.inner.read();
        let mut tokens: Vec<SignatureToken> = inner
            .tokens
            .values()
            .filter(|t| t.case_id == case_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tokens)
    }

    async fn update(&self, id: i32, update: TokenUpdate, now: i64) -> Result<SignatureToken> {
        let mut inner = self.inner.write();
        let record = inner
            .tokens
            .get_mut(&id)
            .ok_or_else(|| ServerError::TokenNotFound(format!("id {}", id)))?;
        update.apply(record, now);
        Ok(record.clone())
    }
}

/// SQLite-backed token store
pub struct DbTokenStore {
    db: Arc<DatabaseConnection>,
    validity: Duration,
}

impl DbTokenStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::with_validity(db, default_validity())
    }

    pub fn with_validity(db: Arc<DatabaseConnection>, validity: Duration) -> Self {
        Self { db, validity }
    }
}

impl TryFrom<signature_token::Model> for SignatureToken {
    type Error = ServerError;

    fn try_from(model: signature_token::Model) -> Result<Self> {
        let form_data = serde_json::from_str(&model.form_data).map_err(|e| {
            ServerError::Internal(format!("corrupt form data on token {}: {}", model.id, e))
        })?;

        Ok(SignatureToken {
            id: model.id,
            token: model.token,
            case_id: model.case_id,
            client_email: model.client_email,
            document_type: model.document_type.parse()?,
            form_data,
            form_link: model.form_link,
            status: model.status.parse()?,
            expires_at: model.expires_at,
            signed_at: model.signed_at,
            completed_at: model.completed_at,
            external_submission_id: model.external_submission_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn create(&self, data: NewSignatureToken, now: i64) -> Result<String> {
        let form_data = serde_json::to_string(&data.form_data)
            .map_err(|e| ServerError::Internal(format!("failed to encode form data: {}", e)))?;

        let mut token = generate_token();
        while signature_token::Entity::find()
            .filter(signature_token::Column::Token.eq(token.as_str()))
            .one(self.db.as_ref())
            .await?
            .is_some()
        {
            token = generate_token();
        }

        let model = signature_token::ActiveModel {
            token: Set(token.clone()),
            case_id: Set(data.case_id),
            client_email: Set(data.client_email),
            document_type: Set(data.document_type.as_str().to_string()),
            form_data: Set(form_data),
            form_link: Set(None),
            status: Set(TokenStatus::Pending.as_str().to_string()),
            expires_at: Set(deadline(now, self.validity)),
            signed_at: Set(None),
            completed_at: Set(None),
            external_submission_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(self.db.as_ref()).await?;

        Ok(token)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<SignatureToken>> {
        signature_token::Entity::find()
            .filter(signature_token::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await?
            .map(SignatureToken::try_from)
            .transpose()
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<SignatureToken>> {
        signature_token::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(SignatureToken::try_from)
            .transpose()
    }

    async fn get_all_for_case(&self, case_id: &str) -> Result<Vec<SignatureToken>> {
        signature_token::Entity::find()
            .filter(signature_token::Column::CaseId.eq(case_id))
            .order_by_desc(signature_token::Column::CreatedAt)
            .order_by_desc(signature_token::Column::Id)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(SignatureToken::try_from)
            .collect()
    }

    async fn update(&self, id: i32, update: TokenUpdate, now: i64) -> Result<SignatureToken> {
        let model = signature_token::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServerError::TokenNotFound(format!("id {}", id)))?;

        let mut active: signature_token::ActiveModel = model.into();
        if let Some(status) = update.status {
            active.status = Set(status.as_str().to_string());
        }
        if let Some(link) = update.form_link {
            active.form_link = Set(Some(link));
        }
        if let Some(ts) = update.signed_at {
            active.signed_at = Set(Some(ts));
        }
        if let Some(ts) = update.completed_at {
            active.completed_at = Set(Some(ts));
        }
        if let Some(submission_id) = update.external_submission_id {
            active.external_submission_id = Set(Some(submission_id));
        }
        active.updated_at = Set(now);

        SignatureToken::try_from(active.update(self.db.as_ref()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::signing::{DocumentType, TOKEN_LEN};
    use serde_json::json;
    use tempfile::TempDir;

    fn new_token(case_id: &str) -> NewSignatureToken {
        NewSignatureToken {
            case_id: case_id.to_string(),
            client_email: "a@b.com".to_string(),
            document_type: DocumentType::Claims,
            form_data: json!({ "clientName": "John Smith", "clientEmail": "a@b.com" })
                .as_object()
                .unwrap()
                .clone(),
        }
    }

    async fn exercise_store(store: &dyn TokenStore) {
        let now = 1_700_000_000;

        // Create and look up
        let token = store.create(new_token("C1"), now).await.unwrap();
        assert_eq!(token.len(), TOKEN_LEN);

        let record = store.get_by_token(&token).await.unwrap().unwrap();
        assert_eq!(record.status, TokenStatus::Pending);
        assert_eq!(record.case_id, "C1");
        assert_eq!(record.document_type, DocumentType::Claims);
        assert_eq!(record.expires_at, now + 72 * 3600);
        assert_eq!(record.form_data.get("clientName"), Some(&json!("John Smith")));
        assert_eq!(record.form_link, None);

        assert_eq!(store.get_by_id(record.id).await.unwrap().unwrap().token, token);
        assert!(store.get_by_token("nope").await.unwrap().is_none());
        assert!(store.get_by_id(9999).await.unwrap().is_none());

        // Partial update keeps untouched fields
        let updated = store
            .update(record.id, TokenUpdate::form_link("https://example.com/f"), now + 10)
            .await
            .unwrap();
        assert_eq!(updated.form_link.as_deref(), Some("https://example.com/f"));
        assert_eq!(updated.status, TokenStatus::Pending);
        assert_eq!(updated.updated_at, now + 10);
        assert_eq!(updated.created_at, now);
        assert_eq!(updated.expires_at, record.expires_at);

        let err = store
            .update(9999, TokenUpdate::status(TokenStatus::Expired), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::TokenNotFound(_)));

        // Case history, newest first
        let second = store.create(new_token("C1"), now + 100).await.unwrap();
        store.create(new_token("C2"), now + 200).await.unwrap();

        let history = store.get_all_for_case("C1").await.unwrap();
        let tokens: Vec<&str> = history.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(tokens, vec![second.as_str(), token.as_str()]);
        assert!(store.get_all_for_case("C3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTokenStore::new();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_db_store() {
        let temp_dir = TempDir::new().unwrap();
        let db = init_database(&temp_dir.path().join("tokens.db")).await.unwrap();
        let store = DbTokenStore::new(Arc::new(db));
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_configured_validity() {
        let store = MemoryTokenStore::with_validity(Duration::from_secs(3600));
        let token = store.create(new_token("C1"), 1000).await.unwrap();
        let record = store.get_by_token(&token).await.unwrap().unwrap();
        assert_eq!(record.expires_at, 1000 + 3600);
    }

    #[tokio::test]
    async fn test_huge_validity_saturates() {
        assert_eq!(deadline(1000, Duration::from_secs(u64::MAX)), i64::MAX);

        let store = MemoryTokenStore::with_validity(Duration::from_secs(i64::MAX as u64));
        let token = store.create(new_token("C1"), 1000).await.unwrap();
        let record = store.get_by_token(&token).await.unwrap().unwrap();
        assert_eq!(record.expires_at, i64::MAX);
        assert!(record.is_valid_at(1000));
    }

    #[tokio::test]
    async fn test_tokens_are_unique_across_creates() {
        let store = MemoryTokenStore::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            let token = store.create(new_token("C1"), i).await.unwrap();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(seen.insert(token));
        }
    }
}
