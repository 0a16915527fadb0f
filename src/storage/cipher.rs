use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use super::{StorageError, StorageResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM over the whole stream: `nonce || ciphertext || tag`.
pub fn encrypt(key: &[u8], plain: &[u8]) -> StorageResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|err| StorageError::Crypto(format!("invalid key: {err}")))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|err| StorageError::Crypto(err.to_string()))?;

    let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
    framed.extend_from_slice(&nonce);
    framed.extend_from_slice(&sealed);
    Ok(framed)
}

pub fn decrypt(key: &[u8], framed: &[u8]) -> StorageResult<Vec<u8>> {
    if framed.len() < NONCE_LEN + TAG_LEN {
        return Err(StorageError::Crypto("ciphertext is truncated".to_string()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|err| StorageError::Crypto(format!("invalid key: {err}")))?;
    let (nonce, sealed) = framed.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| StorageError::Crypto("wrong key or corrupted file".to_string()))
}
