//! Signature tokens and their status lattice.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{CaseData, DocumentType};
use crate::error::ServerError;

/// Random bytes per token; hex encoding doubles this
pub const TOKEN_BYTES: usize = 32;
/// Length of a token string
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Generate a new token: 32 bytes from the OS CSPRNG, hex-encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Stored token status.
///
/// `pending → accessed → signed → completed`, with `expired` reachable from any
/// state except `completed`. `completed` and `expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Pending,
    Accessed,
    Signed,
    Completed,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Pending => "pending",
            TokenStatus::Accessed => "accessed",
            TokenStatus::Signed => "signed",
            TokenStatus::Completed => "completed",
            TokenStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Expired)
    }

    /// Position in the forward order, used to reject regressions
    fn rank(&self) -> u8 {
        match self {
            TokenStatus::Pending => 0,
            TokenStatus::Accessed => 1,
            TokenStatus::Signed => 2,
            TokenStatus::Completed | TokenStatus::Expired => 3,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: TokenStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TokenStatus::Pending => false,
            TokenStatus::Expired => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TokenStatus::Pending),
            "accessed" => Ok(TokenStatus::Accessed),
            "signed" => Ok(TokenStatus::Signed),
            "completed" => Ok(TokenStatus::Completed),
            "expired" => Ok(TokenStatus::Expired),
            other => Err(ServerError::Internal(format!("unknown token status: {}", other))),
        }
    }
}

/// Data supplied by the issuing workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignatureToken {
    pub case_id: String,
    pub client_email: String,
    pub document_type: DocumentType,
    /// Snapshot of the case fields at issuance
    #[serde(default)]
    pub form_data: CaseData,
}

/// A persisted signature token
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureToken {
    pub id: i32,
    pub token: String,
    pub case_id: String,
    pub client_email: String,
    pub document_type: DocumentType,
    pub form_data: CaseData,
    pub form_link: Option<String>,
    pub status: TokenStatus,
    pub expires_at: i64,
    pub signed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub external_submission_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SignatureToken {
    /// Whether the token may still be used to accept a signature at `now`.
    ///
    /// Computed from status and deadline every time; the stored status alone
    /// is only a record of history.
    pub fn is_valid_at(&self, now: i64) -> bool {
        is_token_valid(self.status, self.expires_at, now)
    }

    /// Past the deadline at `now`
    pub fn is_past_deadline(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// `status ∉ {expired, completed} && now < expires_at`
pub fn is_token_valid(status: TokenStatus, expires_at: i64, now: i64) -> bool {
    !status.is_terminal() && now < expires_at
}

/// Partial update merged into a stored token; `None` leaves a field untouched
#[derive(Clone, Debug, Default)]
pub struct TokenUpdate {
    pub status: Option<TokenStatus>,
    pub form_link: Option<String>,
    pub signed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub external_submission_id: Option<String>,
}

impl TokenUpdate {
    pub fn status(status: TokenStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn form_link(link: impl Into<String>) -> Self {
        Self {
            form_link: Some(link.into()),
            ..Default::default()
        }
    }

    /// Apply onto an in-memory record
    pub fn apply(self, token: &mut SignatureToken, now: i64) {
        if let Some(status) = self.status {
            token.status = status;
        }
        if let Some(link) = self.form_link {
            token.form_link = Some(link);
        }
        if let Some(ts) = self.signed_at {
            token.signed_at = Some(ts);
        }
        if let Some(ts) = self.completed_at {
            token.completed_at = Some(ts);
        }
        if let Some(id) = self.external_submission_id {
            token.external_submission_id = Some(id);
        }
        token.updated_at = now;
    }
}
