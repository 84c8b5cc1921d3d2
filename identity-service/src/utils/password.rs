use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Plaintext secret wrapper. Redacts itself from `Debug` output so
/// request logging cannot leak passwords.
#[derive(Clone)]
pub struct Plaintext(String);

impl Plaintext {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Plaintext(****)")
    }
}

/// Hash a secret with Argon2id and a freshly generated salt.
///
/// The returned PHC string embeds algorithm, parameters and salt; it is
/// the only form this repository ever persists.
pub fn hash_secret(secret: &Plaintext) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(secret.expose().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();

    Ok(hash)
}

/// Verify a secret against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; `Err` only when the stored hash is
/// malformed.
pub fn verify_secret(secret: &Plaintext, stored_hash: &str) -> Result<bool, anyhow::Error> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Invalid secret hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(secret.expose().as_bytes(), &parsed)
        .is_ok())
}
