use rand::RngCore;

/// Bytes of randomness behind a password-reset token.
const RESET_TOKEN_BYTES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// bcrypt hashing, run on the blocking pool since each call is deliberately slow.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(hashed)
    }

    pub async fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, HashError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.to_owned();
        let valid =
            tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hashed)).await??;
        Ok(valid)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

/// 20 random bytes, hex-encoded (40 characters).
pub fn get_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
