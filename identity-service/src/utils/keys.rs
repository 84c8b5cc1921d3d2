use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

const API_KEY_BYTES: usize = 32;
const SIGNING_SECRET_BYTES: usize = 48;

/// Generate an opaque API key for an application.
pub fn generate_api_key() -> String {
    random_encoded_bytes(API_KEY_BYTES)
}

/// Generate a signing secret for an organization.
pub fn generate_signing_secret() -> String {
    random_encoded_bytes(SIGNING_SECRET_BYTES)
}

fn random_encoded_bytes(size: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; size];
    rng.fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}
