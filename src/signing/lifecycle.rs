//! Token lifecycle.
//!
//! ```text
//! pending ──access──▶ accessed ──sign──▶ signed ──complete──▶ completed
//!    │                   │                 │
//!    └───────────────────┴──── deadline ───┴──────────────▶ expired
//! ```
//!
//! Validity is always recomputed from `(status, expires_at, now)`. When an
//! operation sees a token past its deadline that is not yet marked, it writes
//! `expired` back, but nothing depends on that write having happened.

use std::sync::Arc;

use super::store::TokenStore;
use super::token::{unix_now, NewSignatureToken, SignatureToken, TokenStatus, TokenUpdate};
use crate::error::{Result, ServerError};

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Shortened token for log lines
fn short(token: &str) -> String {
    token.chars().take(8).collect()
}

/// State machine over a [`TokenStore`]
#[derive(Clone)]
pub struct TokenLifecycle {
    store: Arc<dyn TokenStore>,
    clock: Clock,
}

impl TokenLifecycle {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            clock: Arc::new(unix_now),
        }
    }

    /// Replace the wall clock (unix seconds)
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Issue a new `pending` token
    pub async fn issue(&self, data: NewSignatureToken) -> Result<String> {
        let case_id = data.case_id.clone();
        let document_type = data.document_type;
        let token = self.store.create(data, self.now()).await?;
        tracing::info!(
            "Issued {} token {}… for case {}",
            document_type,
            short(&token),
            case_id
        );
        Ok(token)
    }

    /// Record the built provider URL on a token
    pub async fn set_form_link(&self, token: &str, link: String) -> Result<SignatureToken> {
        let record = self.find(token).await?;
        if record.status == TokenStatus::Completed {
            return Err(ServerError::TokenAlreadyFinalized(token.to_string()));
        }
        self.store
            .update(record.id, TokenUpdate::form_link(link), self.now())
            .await
    }

    /// Fetch a token for display, marking it expired if its deadline passed
    pub async fn lookup(&self, token: &str) -> Result<SignatureToken> {
        let record = self.find(token).await?;
        Ok(self.expire_if_due(record, self.now()).await)
    }

    /// Whether a token may still be used, evaluated now
    pub async fn is_token_valid(&self, token: &str) -> Result<bool> {
        let record = self.find(token).await?;
        Ok(record.is_valid_at(self.now()))
    }

    /// Signer opened the form: `pending → accessed`.
    ///
    /// Already accessed or signed tokens are returned unchanged. Expired tokens
    /// are reported as not found.
    pub async fn access(&self, token: &str) -> Result<SignatureToken> {
        let now = self.now();
        let record = self.usable(token, now).await?;

        if record.status != TokenStatus::Pending {
            return Ok(record);
        }

        let updated = self
            .store
            .update(record.id, TokenUpdate::status(TokenStatus::Accessed), now)
            .await?;
        tracing::info!("Token {}… accessed", short(token));
        Ok(updated)
    }

    /// Signature captured: `pending|accessed → signed`
    pub async fn mark_signed(&self, token: &str) -> Result<SignatureToken> {
        let now = self.now();
        let record = self.usable(token, now).await?;

        if record.status == TokenStatus::Signed {
            return Ok(record);
        }

        let update = TokenUpdate {
            status: Some(TokenStatus::Signed),
            signed_at: Some(now),
            ..Default::default()
        };
        let updated = self.store.update(record.id, update, now).await?;
        tracing::info!("Token {}… signed", short(token));
        Ok(updated)
    }

    /// Provider reported a submission: `* → completed`.
    ///
    /// A repeated callback with the same submission id is accepted and leaves
    /// the record unchanged; a different submission for a completed token is
    /// rejected with `TokenAlreadyFinalized`. Completion without a recorded
    /// access is allowed.
    pub async fn complete(&self, token: &str, submission_id: &str) -> Result<SignatureToken> {
        let now = self.now();
        let record = self.find(token).await?;

        if record.status == TokenStatus::Completed {
            if record.external_submission_id.as_deref() != Some(submission_id) {
                tracing::warn!(
                    "Token {}… already completed by submission {:?}, rejecting {}",
                    short(token),
                    record.external_submission_id,
                    submission_id
                );
                return Err(ServerError::TokenAlreadyFinalized(token.to_string()));
            }
            tracing::debug!("Duplicate completion for token {}…", short(token));
            return Ok(record);
        }

        let record = self.expire_if_due(record, now).await;
        if !record.is_valid_at(now) {
            return Err(ServerError::TokenNotFound(token.to_string()));
        }

        let update = TokenUpdate {
            status: Some(TokenStatus::Completed),
            completed_at: Some(now),
            external_submission_id: Some(submission_id.to_string()),
            signed_at: record.signed_at.is_none().then_some(now),
            ..Default::default()
        };
        let updated = self.store.update(record.id, update, now).await?;
        tracing::info!(
            "Token {}… completed with submission {}",
            short(token),
            submission_id
        );
        Ok(updated)
    }

    async fn find(&self, token: &str) -> Result<SignatureToken> {
        self.store
            .get_by_token(token)
            .await?
            .ok_or_else(|| ServerError::TokenNotFound(token.to_string()))
    }

    /// Load a token that may still change state: completed tokens are
    /// rejected, expired ones look like missing ones.
    async fn usable(&self, token: &str, now: i64) -> Result<SignatureToken> {
        let record = self.find(token).await?;
        if record.status == TokenStatus::Completed {
            return Err(ServerError::TokenAlreadyFinalized(token.to_string()));
        }

        let record = self.expire_if_due(record, now).await;
        if !record.is_valid_at(now) {
            return Err(ServerError::TokenNotFound(token.to_string()));
        }
        Ok(record)
    }

    /// Lazy expiry. A failed write is logged and the in-memory copy is
    /// marked anyway.
    async fn expire_if_due(&self, mut record: SignatureToken, now: i64) -> SignatureToken {
        if !record.is_past_deadline(now) || !record.status.can_transition_to(TokenStatus::Expired) {
            return record;
        }

        tracing::warn!(
            "Token {}… for case {} passed its deadline, marking expired",
            short(&record.token),
            record.case_id
        );

        match self
            .store
            .update(record.id, TokenUpdate::status(TokenStatus::Expired), now)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!("Failed to persist expiry for token {}: {}", record.id, e);
                record.status = TokenStatus::Expired;
                record
            }
        }
    }
}
