//! Shared domain types for docbridge: citations and their extraction, the
//! persisted store handle, validated search requests, the API error body and
//! bearer-token helpers.

pub mod auth;
pub mod citations;
pub mod error;
pub mod search;
pub mod store;
