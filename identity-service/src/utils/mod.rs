pub mod keys;
pub mod password;

pub use keys::{generate_api_key, generate_signing_secret};
pub use password::{hash_secret, verify_secret, Plaintext};
