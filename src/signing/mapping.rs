//! Field mapping from case data onto provider form fields.
//!
//! Every document type has a static table of [`FieldSpec`]s. Each row ties a
//! semantic case key to a provider field and lists the historical aliases the
//! value may be stored under. When a live form schema is available the
//! configured provider key is checked against it and, if the form no longer
//! has that field, a textual match against question names and labels picks a
//! replacement.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use super::DocumentType;
use crate::error::{Result, ServerError};

/// Flat case record: string keys to scalar values
pub type CaseData = Map<String, Value>;

/// How a value is written into the provider form
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Single text input
    Text,
    /// Split into `key[first]` / `key[last]` sub-fields
    FullName,
}

/// One row of a mapping table
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub semantic: &'static str,
    pub provider_key: &'static str,
    pub kind: FieldKind,
    pub aliases: &'static [&'static str],
}

const fn text(
    semantic: &'static str,
    provider_key: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec { semantic, provider_key, kind: FieldKind::Text, aliases }
}

const fn full_name(
    semantic: &'static str,
    provider_key: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec { semantic, provider_key, kind: FieldKind::FullName, aliases }
}

/// A question on the live provider form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormQuestion {
    /// Numeric question id as reported by the provider
    pub qid: String,
    /// Field name used for prefill parameters
    pub name: String,
    /// Human-readable label
    pub text: String,
    /// Provider control type, e.g. `control_textbox`
    pub control: String,
}

/// Control type of the provider's split first/last name widget
pub const FULL_NAME_CONTROL: &str = "control_fullname";

impl FormQuestion {
    pub fn is_full_name(&self) -> bool {
        self.control == FULL_NAME_CONTROL
    }
}

/// Question definitions of a provider form
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormSchema {
    pub questions: Vec<FormQuestion>,
}

impl FormSchema {
    pub fn has_field(&self, name: &str) -> bool {
        self.question(name).is_some()
    }

    pub fn question(&self, name: &str) -> Option<&FormQuestion> {
        self.questions.iter().find(|q| q.name == name)
    }

    /// Find a question whose name or label matches one of the candidates.
    ///
    /// Exact (normalized) matches on any candidate win over label containment.
    fn find_by_text(&self, candidates: &[&str]) -> Option<&FormQuestion> {
        let wanted: Vec<String> = candidates
            .iter()
            .map(|c| normalize(c))
            .filter(|c| !c.is_empty())
            .collect();

        for candidate in &wanted {
            if let Some(q) = self
                .questions
                .iter()
                .find(|q| normalize(&q.name) == *candidate || normalize(&q.text) == *candidate)
            {
                return Some(q);
            }
        }

        for candidate in wanted.iter().filter(|c| c.len() >= 4) {
            if let Some(q) = self
                .questions
                .iter()
                .find(|q| normalize(&q.text).contains(candidate.as_str()))
            {
                return Some(q);
            }
        }

        None
    }
}

/// Lowercase alphanumerics only, so `clientEmail`, `client_email` and
/// "Client E-mail" compare equal.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Ordered provider-key → value pairs ready for URL encoding
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappedFields(Vec<(String, String)>);

impl MappedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair; the first value written for a key is kept
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.get(&key).is_none() {
            self.0.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mapping table for one document type
#[derive(Debug)]
pub struct MappingTable {
    pub document_type: DocumentType,
    pub fields: &'static [FieldSpec],
}

const CLIENT_FIELDS: &[FieldSpec] = &[
    full_name("clientName", "nafName", &["naf_name", "clientFullName", "fullName"]),
    text("clientEmail", "nafEmail", &["naf_email", "email"]),
    text("clientPhone", "nafPhone", &["naf_phone", "clientMobile", "phone"]),
    text("clientAddress", "nafAddress", &["naf_address", "address"]),
    text("clientDob", "nafDob", &["naf_dob", "dateOfBirth"]),
    text("clientLicenseNumber", "nafLicence", &["naf_licence_no", "licenseNumber"]),
];

const ACCIDENT_FIELDS: &[FieldSpec] = &[
    text("accidentDate", "accidentDate", &["accident_date", "dateOfAccident"]),
    text("accidentTime", "accidentTime", &["accident_time"]),
    text("accidentLocation", "accidentLocation", &["accident_location", "location"]),
    text("accidentDescription", "accidentDetails", &["accident_description", "description"]),
];

const AT_FAULT_FIELDS: &[FieldSpec] = &[
    full_name("atFaultName", "afName", &["af_name", "afFullName"]),
    text("atFaultPhone", "afPhone", &["af_phone"]),
    text("atFaultRego", "afRego", &["af_rego", "atFaultVehicleRego"]),
    text("atFaultInsurer", "afInsurer", &["af_insurance_company", "afInsurer"]),
    text("atFaultClaimNumber", "afClaimNumber", &["af_claim_number", "insurerClaimNumber"]),
];

const RENTAL_FIELDS: &[FieldSpec] = &[
    text("bikeRego", "hireBikeRego", &["bike_rego", "rentalRego"]),
    text("bikeMake", "hireBikeMake", &["bike_make"]),
    text("bikeModel", "hireBikeModel", &["bike_model"]),
    text("hireStartDate", "hireStart", &["hire_start_date", "rentalStartDate"]),
    text("hireEndDate", "hireEnd", &["hire_end_date", "rentalEndDate"]),
    text("dailyRate", "dailyRate", &["daily_rate", "rate"]),
];

const CLAIMS_FIELDS: &[FieldSpec] = &[
    full_name("clientName", "nafName", &["naf_name", "clientFullName", "fullName"]),
    text("clientEmail", "nafEmail", &["naf_email", "email"]),
    text("clientPhone", "nafPhone", &["naf_phone", "clientMobile", "phone"]),
    text("clientAddress", "nafAddress", &["naf_address", "address"]),
    text("clientRego", "nafRego", &["naf_rego", "clientVehicleRego"]),
    text("clientInsurer", "nafInsurer", &["naf_insurance_company"]),
    text("accidentDate", "accidentDate", &["accident_date", "dateOfAccident"]),
    text("accidentTime", "accidentTime", &["accident_time"]),
    text("accidentLocation", "accidentLocation", &["accident_location", "location"]),
    text("accidentDescription", "accidentDetails", &["accident_description", "description"]),
    full_name("atFaultName", "afName", &["af_name", "afFullName"]),
    text("atFaultPhone", "afPhone", &["af_phone"]),
    text("atFaultRego", "afRego", &["af_rego", "atFaultVehicleRego"]),
    text("atFaultInsurer", "afInsurer", &["af_insurance_company"]),
    text("atFaultClaimNumber", "afClaimNumber", &["af_claim_number", "insurerClaimNumber"]),
];

const AUTHORITY_FIELDS: &[FieldSpec] = &[
    full_name("clientName", "nafName", &["naf_name", "clientFullName", "fullName"]),
    text("clientEmail", "nafEmail", &["naf_email", "email"]),
    text("clientAddress", "nafAddress", &["naf_address", "address"]),
    text("accidentDate", "accidentDate", &["accident_date", "dateOfAccident"]),
    text("atFaultRego", "afRego", &["af_rego", "atFaultVehicleRego"]),
    text("atFaultInsurer", "afInsurer", &["af_insurance_company"]),
];

const DIRECTION_TO_PAY_FIELDS: &[FieldSpec] = &[
    full_name("clientName", "nafName", &["naf_name", "clientFullName", "fullName"]),
    text("clientEmail", "nafEmail", &["naf_email", "email"]),
    text("atFaultInsurer", "afInsurer", &["af_insurance_company"]),
    text("atFaultClaimNumber", "afClaimNumber", &["af_claim_number", "insurerClaimNumber"]),
    text("totalAmount", "invoiceTotal", &["total_amount", "invoiceAmount"]),
];

static NOT_AT_FAULT_RENTAL_FIELDS: Lazy<Vec<FieldSpec>> = Lazy::new(|| {
    CLIENT_FIELDS
        .iter()
        .chain(ACCIDENT_FIELDS)
        .chain(AT_FAULT_FIELDS)
        .chain(RENTAL_FIELDS)
        .cloned()
        .collect()
});

static CERTIS_RENTAL_FIELDS: Lazy<Vec<FieldSpec>> = Lazy::new(|| {
    CLIENT_FIELDS
        .iter()
        .chain(RENTAL_FIELDS)
        .cloned()
        .collect()
});

static TABLES: Lazy<HashMap<DocumentType, MappingTable>> = Lazy::new(|| {
    let tables = [
        (DocumentType::Claims, CLAIMS_FIELDS),
        (DocumentType::NotAtFaultRental, NOT_AT_FAULT_RENTAL_FIELDS.as_slice()),
        (DocumentType::CertisRental, CERTIS_RENTAL_FIELDS.as_slice()),
        (DocumentType::AuthorityToAct, AUTHORITY_FIELDS),
        (DocumentType::DirectionToPay, DIRECTION_TO_PAY_FIELDS),
    ];

    tables
        .into_iter()
        .map(|(document_type, fields)| (document_type, MappingTable { document_type, fields }))
        .collect()
});

/// Look up the mapping table for a document type
pub fn mapping_table(document_type: DocumentType) -> Result<&'static MappingTable> {
    TABLES
        .get(&document_type)
        .ok_or_else(|| ServerError::UnsupportedDocumentType(document_type.to_string()))
}

/// Map a case record onto provider fields for a document type
pub fn map_fields(
    document_type: DocumentType,
    case_data: &CaseData,
    schema: Option<&FormSchema>,
) -> Result<MappedFields> {
    Ok(mapping_table(document_type)?.map(case_data, schema))
}

impl MappingTable {
    pub fn map(&self, case_data: &CaseData, schema: Option<&FormSchema>) -> MappedFields {
        let mut out = MappedFields::new();

        for spec in self.fields {
            let Some(value) = resolve_value(case_data, spec) else {
                continue;
            };

            let Some(target) = resolve_target(spec, schema) else {
                tracing::debug!(
                    "No field on {} form for {}, skipping",
                    self.document_type,
                    spec.semantic
                );
                continue;
            };

            match target.kind {
                FieldKind::Text => out.insert(target.key, value),
                FieldKind::FullName => {
                    let (first, last) = split_name(&value);
                    out.insert(format!("{}[first]", target.key), first);
                    if !last.is_empty() {
                        out.insert(format!("{}[last]", target.key), last);
                    }
                }
            }
        }

        out
    }
}

/// First non-empty value among the semantic key and its aliases
fn resolve_value(case_data: &CaseData, spec: &FieldSpec) -> Option<String> {
    std::iter::once(spec.semantic)
        .chain(spec.aliases.iter().copied())
        .find_map(|key| case_data.get(key).and_then(scalar_to_string))
}

/// Provider field a value is written to, and how
struct Target {
    key: String,
    kind: FieldKind,
}

/// Pick the provider field for a row.
///
/// Without a schema the table is trusted. With one, a name is only split when
/// the resolved question is the provider's full-name control; any other
/// control takes the whole value under its bare key.
fn resolve_target(spec: &FieldSpec, schema: Option<&FormSchema>) -> Option<Target> {
    let Some(schema) = schema else {
        return Some(Target { key: spec.provider_key.to_string(), kind: spec.kind });
    };

    let question = resolve_question(spec, schema)?;
    let kind = match spec.kind {
        FieldKind::FullName if !question.is_full_name() => FieldKind::Text,
        kind => kind,
    };

    Some(Target { key: question.name.clone(), kind })
}

fn resolve_question<'a>(spec: &FieldSpec, schema: &'a FormSchema) -> Option<&'a FormQuestion> {
    if let Some(question) = schema.question(spec.provider_key) {
        return Some(question);
    }

    let candidates: Vec<&str> = [spec.provider_key, spec.semantic]
        .into_iter()
        .chain(spec.aliases.iter().copied())
        .collect();

    let question = schema.find_by_text(&candidates)?;
    tracing::debug!(
        "Field {} not on form, using question {} ({})",
        spec.provider_key,
        question.qid,
        question.name
    );
    Some(question)
}

/// Stringify a scalar; blanks, nulls and non-scalars yield `None`
fn scalar_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };

    // Browser-side drafts serialise missing values as text
    if s.is_empty() || s == "undefined" || s == "null" {
        None
    } else {
        Some(s)
    }
}

/// Split a full name at the first whitespace: first token is the first name,
/// the remainder (possibly empty) is the last name.
pub fn split_name(full: &str) -> (String, String) {
    let full = full.trim();
    match full.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full.to_string(), String::new()),
    }
}
