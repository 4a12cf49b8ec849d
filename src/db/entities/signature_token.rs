//! Signature token entity
//!
//! One row per issued token. Status and document type are stored as their
//! string forms; `form_data` holds the JSON snapshot of the case at issuance.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "signature_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 64 hex chars, handed out in links
    #[sea_orm(unique)]
    pub token: String,
    pub case_id: String,
    pub client_email: String,
    pub document_type: String,
    /// JSON object
    pub form_data: String,
    pub form_link: Option<String>,
    pub status: String, // "pending", "accessed", "signed", "completed", "expired"
    pub expires_at: i64,
    pub signed_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Provider submission id, set on completion
    pub external_submission_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
