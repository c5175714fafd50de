//! Authentication: the credential file and the Digest gate in front of
//! every mutating or edit request.

pub mod credentials;
pub mod digest;

pub use credentials::{CredentialError, CredentialStore, hash_secret};
pub use digest::{Authorization, Challenge, DigestAuthenticator};
