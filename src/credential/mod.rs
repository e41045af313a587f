//! Reusable connection credentials.

mod store;

pub use store::{Credential, CredentialStore, CredentialSummary};
