//! Document types and the provider form-id table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// External form templates a signature can be requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Claims,
    NotAtFaultRental,
    CertisRental,
    AuthorityToAct,
    DirectionToPay,
}

/// Built-in form ids on the provider, one per document type.
const FORM_IDS: &[(DocumentType, &str)] = &[
    (DocumentType::Claims, "232543267390861"),
    (DocumentType::NotAtFaultRental, "233241680987464"),
    (DocumentType::CertisRental, "233238940095055"),
    (DocumentType::AuthorityToAct, "233183619631457"),
    (DocumentType::DirectionToPay, "233061493503047"),
];

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Claims,
        DocumentType::NotAtFaultRental,
        DocumentType::CertisRental,
        DocumentType::AuthorityToAct,
        DocumentType::DirectionToPay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Claims => "claims",
            DocumentType::NotAtFaultRental => "not-at-fault-rental",
            DocumentType::CertisRental => "certis-rental",
            DocumentType::AuthorityToAct => "authority-to-act",
            DocumentType::DirectionToPay => "direction-to-pay",
        }
    }

    /// Suffix used for the `FORM_ID_<SUFFIX>` override variable.
    pub fn env_suffix(&self) -> String {
        self.as_str().replace('-', "_").to_uppercase()
    }

    /// The built-in provider form id for this document type.
    pub fn default_form_id(&self) -> Option<&'static str> {
        FORM_IDS
            .iter()
            .find(|(doc, _)| doc == self)
            .map(|(_, id)| *id)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|doc| doc.as_str() == s)
            .ok_or_else(|| ServerError::UnsupportedDocumentType(s.to_string()))
    }
}

/// Resolve a provider form id back to its document type.
///
/// Unknown ids yield `None` so callers can decide what to do with forms
/// this service did not issue.
pub fn document_type_from_form_id(form_id: &str) -> Option<DocumentType> {
    let form_id = form_id.trim();
    FORM_IDS
        .iter()
        .find(|(_, id)| *id == form_id)
        .map(|(doc, _)| *doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_id_lookup() {
        assert_eq!(
            document_type_from_form_id("233241680987464"),
            Some(DocumentType::NotAtFaultRental)
        );
        assert_eq!(document_type_from_form_id("000000000000000"), None);
        assert_eq!(document_type_from_form_id(""), None);
    }

    #[test]
    fn test_every_type_has_a_form() {
        for doc in DocumentType::ALL {
            let form_id = doc.default_form_id().unwrap();
            assert_eq!(document_type_from_form_id(form_id), Some(doc));
        }
    }

    #[test]
    fn test_parse_document_type() {
        assert_eq!("claims".parse::<DocumentType>().unwrap(), DocumentType::Claims);
        assert_eq!(
            "not-at-fault-rental".parse::<DocumentType>().unwrap(),
            DocumentType::NotAtFaultRental
        );

        let err = "hire-purchase".parse::<DocumentType>().unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedDocumentType(ref s) if s == "hire-purchase"));
    }

    #[test]
    fn test_serde_uses_slugs() {
        let json = serde_json::to_string(&DocumentType::AuthorityToAct).unwrap();
        assert_eq!(json, "\"authority-to-act\"");
        assert_eq!(DocumentType::NotAtFaultRental.env_suffix(), "NOT_AT_FAULT_RENTAL");
    }
}
