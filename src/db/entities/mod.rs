//! Database entities

pub mod signature_token;
