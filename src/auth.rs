use sha2::{Digest, Sha256};

/// Hash token for DB storage (SHA-256 hex).
/// Sessions are issued by the clinic login service; only hashes are looked up here.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
