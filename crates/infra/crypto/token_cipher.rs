use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine, engine::general_purpose::STANDARD};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// AES-256-GCM cipher for OAuth tokens at rest.
///
/// Stored form is `base64(nonce || ciphertext)`, with a fresh random nonce per call.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(..)")
    }
}

impl TokenCipher {
    /// Accepts the key as 64 hex characters or as base64 of 32 bytes.
    pub fn from_encoded_key(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = if encoded.len() == KEY_LEN * 2 && encoded.chars().all(|c| c.is_ascii_hexdigit())
        {
            hex::decode(encoded).context("token encryption key is not valid hex")?
        } else {
            STANDARD
                .decode(encoded)
                .context("token encryption key is neither hex nor base64")?
        };

        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            bail!(
                "token encryption key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            );
        }

        let key = Key::<Aes256Gcm>::from_slice(bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| anyhow!("failed to encrypt token"))?;

        let mut stored = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(stored))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let raw = STANDARD
            .decode(stored)
            .context("encrypted token is not valid base64")?;
        if raw.len() <= NONCE_LEN {
            bail!("encrypted token is too short");
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("failed to decrypt token"))?;

        String::from_utf8(plaintext).context("decrypted token is not valid UTF-8")
    }

    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|value| self.encrypt(value)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn decrypts_what_it_encrypts() {
        let cipher = TokenCipher::from_encoded_key(HEX_KEY).unwrap();

        let stored = cipher.encrypt("ya29.access-token").unwrap();

        assert_ne!(stored, "ya29.access-token");
        assert_eq!(cipher.decrypt(&stored).unwrap(), "ya29.access-token");
    }

    #[test]
    fn uses_a_fresh_nonce_each_time() {
        let cipher = TokenCipher::from_encoded_key(HEX_KEY).unwrap();

        let first = cipher.encrypt("same").unwrap();
        let second = cipher.encrypt("same").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = TokenCipher::from_encoded_key(HEX_KEY).unwrap();
        let stored = cipher.encrypt("secret").unwrap();

        let mut raw = STANDARD.decode(&stored).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        assert!(cipher.decrypt(&STANDARD.encode(raw)).is_err());
    }

    #[test]
    fn rejects_a_different_key() {
        let cipher = TokenCipher::from_encoded_key(HEX_KEY).unwrap();
        let other = TokenCipher::from_bytes(&[7u8; 32]).unwrap();

        let stored = cipher.encrypt("secret").unwrap();

        assert!(other.decrypt(&stored).is_err());
    }

    #[test]
    fn accepts_base64_keys_and_rejects_wrong_lengths() {
        let encoded = STANDARD.encode([9u8; 32]);
        assert!(TokenCipher::from_encoded_key(&encoded).is_ok());
        assert!(TokenCipher::from_bytes(&[1u8; 16]).is_err());
        assert!(TokenCipher::from_encoded_key("not a key").is_err());
    }
}
