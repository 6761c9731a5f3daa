use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};

const ARGON2ID: &str = "argon2id";

/// A validated argon2id PHC string for the admin bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminTokenHash(String);

impl AdminTokenHash {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !raw.starts_with("$argon2id$") {
            return None;
        }
        let parsed = PasswordHash::new(raw).ok()?;
        if parsed.algorithm.as_str() != ARGON2ID || parsed.hash.is_none() {
            return None;
        }
        Params::try_from(&parsed).ok()?;
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn verify(&self, token_plaintext: &str) -> bool {
        if token_plaintext.is_empty() {
            return false;
        }
        let Ok(parsed) = PasswordHash::new(self.as_str()) else {
            return false;
        };
        Argon2::default()
            .verify_password(token_plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

pub fn hash_admin_token(token_plaintext: &str) -> Result<AdminTokenHash, String> {
    if token_plaintext.trim().is_empty() {
        return Err("token is empty".to_string());
    }

    // m=64 MiB, t=3, p=1
    let params = Params::new(65_536, 3, 1, None).map_err(|e| format!("argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(token_plaintext.as_bytes(), &salt)
        .map_err(|e| format!("argon2 hash: {e}"))?
        .to_string();

    Ok(AdminTokenHash(hash))
}

/// Decides whether a request may mutate server config. Token issuance lives
/// outside this service; only the configured hash is checked here.
#[derive(Debug, Clone, Default)]
pub struct AdminGate {
    hash: Option<AdminTokenHash>,
}

impl AdminGate {
    pub fn new(hash: Option<AdminTokenHash>) -> Self {
        Self { hash }
    }

    pub fn is_enabled(&self) -> bool {
        self.hash.is_some()
    }

    pub fn is_admin(&self, bearer_token: Option<&str>) -> bool {
        match (&self.hash, bearer_token) {
            (Some(hash), Some(token)) => hash.verify(token),
            _ => false,
        }
    }
}
