use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha512};

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password);
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    hash_password(password) == hash
}

/// Random session token handed out at registration and login.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
