//! Sealed Envelopes
//!
//! Seals a serializable payload for one recipient using ECDH + ChaCha20-Poly1305.
//! The relay carrying an envelope learns only the recipient's messaging key.
//!
//! ```text
//! Flow:
//! 1. Sender generates ephemeral keypair (epk, esk)
//! 2. Shared secret = ECDH(esk, recipient_pk)
//! 3. Key = blake3::derive_key("umbra-envelope-v1", shared || epk || recipient_pk)
//! 4. Ciphertext = ChaCha20-Poly1305(key, nonce, json(payload))
//! 5. Output = (epk, nonce, ciphertext || tag)
//! ```

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

const KDF_CONTEXT: &str = "umbra-envelope-v1";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("encryption failed")]
    Encrypt,

    #[error("envelope could not be opened with this key")]
    Open,
}

/// A payload sealed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    #[serde(with = "hex")]
    pub ephemeral_pk: [u8; 32],
    #[serde(with = "hex")]
    pub nonce: [u8; 12],
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// epk + nonce + tag
    pub const OVERHEAD: usize = 32 + 12 + 16;
}

/// X25519 keypair for receiving envelopes.
#[derive(Clone)]
pub struct MessagingKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl MessagingKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

impl std::fmt::Debug for MessagingKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingKeypair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Seal `payload` so only the holder of `recipient_pk`'s secret can read it.
pub fn seal<T: Serialize>(payload: &T, recipient_pk: &[u8; 32]) -> Result<SealedEnvelope, EnvelopeError> {
    let plaintext = serde_json::to_vec(payload).map_err(EnvelopeError::Encode)?;

    let mut rng = rand::thread_rng();
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    let recipient = PublicKey::from(*recipient_pk);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient);
    let key = derive_key(shared_secret.as_bytes(), ephemeral_pk.as_bytes(), recipient_pk);

    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| EnvelopeError::Encrypt)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|_| EnvelopeError::Encrypt)?;

    Ok(SealedEnvelope {
        ephemeral_pk: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open an envelope with the recipient's keypair and decode its payload.
pub fn open<T: DeserializeOwned>(
    envelope: &SealedEnvelope,
    recipient: &MessagingKeypair,
) -> Result<T, EnvelopeError> {
    let ephemeral_pk = PublicKey::from(envelope.ephemeral_pk);
    let shared_secret = recipient.secret.diffie_hellman(&ephemeral_pk);
    let key = derive_key(
        shared_secret.as_bytes(),
        &envelope.ephemeral_pk,
        recipient.public.as_bytes(),
    );

    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| EnvelopeError::Open)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| EnvelopeError::Open)?;

    serde_json::from_slice(&plaintext).map_err(EnvelopeError::Decode)
}

fn derive_key(shared_secret: &[u8], ephemeral_pk: &[u8], recipient_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    hasher.update(recipient_pk);
    *hasher.finalize().as_bytes()
}
