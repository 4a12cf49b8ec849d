//! Signature tokens for externally signed claim documents.
//!
//! A case worker issues a token for one document; the token is embedded in a
//! prefilled provider form URL, the signer opens it through this service, and
//! the provider's webhook completes it.

#![allow(dead_code)] // Public API methods, not all used by the server yet

mod document;
mod lifecycle;
mod mapping;
mod provider;
mod store;
mod token;
mod url;
mod webhook;

pub use document::{document_type_from_form_id, DocumentType};
pub use lifecycle::TokenLifecycle;
pub use mapping::{map_fields, mapping_table, CaseData, FormQuestion, FormSchema, MappedFields};
pub use provider::{FormProvider, JotformClient};
pub use store::{DbTokenStore, MemoryTokenStore, TokenStore};
pub use token::{NewSignatureToken, SignatureToken, TokenStatus, TokenUpdate};
pub use url::{build_form_url, case_number};
pub use webhook::parse_webhook;

#[cfg(test)]
pub use token::TOKEN_LEN;
