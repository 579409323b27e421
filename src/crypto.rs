//! Wrapper module for the cryptography every participant shares: keypairs,
//! ECDSA signatures and the hash primitives used by consensus.

use crate::error::{ChainError, Result};
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

/// SHA-256 of a byte string
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, the hash used for transaction ids and header hashes
pub fn dsha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD160(SHA256(key bytes)) of a hex-serialized public key
pub fn keyhash(pub_key: &str) -> Result<String> {
    let key_bytes =
        hex::decode(pub_key).map_err(|e| ChainError::Crypto(format!("bad public key: {e}")))?;
    let hash160 = Ripemd160::digest(sha256(&key_bytes));
    Ok(hex::encode(hash160))
}

/// Verify a hex signature over `data` against a hex-serialized public key.
/// Any decoding failure counts as a failed verification.
pub fn verify(pub_key: &str, data: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = hex::decode(pub_key) else {
        return false;
    };
    let Ok(pubkey) = PublicKey::from_slice(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(sig) = Signature::from_compact(&sig_bytes) else {
        return false;
    };
    let message = Message::from_digest(sha256(data));
    Secp256k1::verification_only()
        .verify_ecdsa(&message, &sig, &pubkey)
        .is_ok()
}

/// A miner's wallet. The public key serializes as hex of the 33-byte
/// compressed SEC1 encoding, so every process derives the same keyhash
/// from the same key.
#[derive(Debug, Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Create a fresh random keypair
    pub fn generate() -> Keypair {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Keypair { secret, public }
    }

    /// Rebuild a keypair from a hex-serialized secret key
    pub fn from_secret_hex(secret_hex: &str) -> Result<Keypair> {
        let bytes = hex::decode(secret_hex)
            .map_err(|e| ChainError::Crypto(format!("bad secret key: {e}")))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| ChainError::Crypto(format!("bad secret key: {e}")))?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Ok(Keypair { secret, public })
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Keyhash of this wallet's public key, the owner field on outputs
    pub fn keyhash(&self) -> String {
        let hash160 = Ripemd160::digest(sha256(&self.public.serialize()));
        hex::encode(hash160)
    }

    /// Sign `data`; the signature is ECDSA over the SHA-256 digest,
    /// serialized as hex of the 64-byte compact form
    pub fn sign(&self, data: &[u8]) -> String {
        let message = Message::from_digest(sha256(data));
        let sig = Secp256k1::signing_only().sign_ecdsa(&message, &self.secret);
        hex::encode(sig.serialize_compact())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsha256_is_sha256_of_sha256() {
        let data = b"powchain";
        assert_eq!(dsha256(data), sha256(&sha256(data)));
    }

    #[test]
    fn sign_verify_round_trip() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"outputs");
        assert!(verify(&kp.public_hex(), b"outputs", &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = Keypair::generate();
        let other = Keypair::generate();
        let sig = kp.sign(b"outputs");
        assert!(!verify(&other.public_hex(), b"outputs", &sig));
    }

    #[test]
    fn verify_rejects_wrong_data() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"outputs");
        assert!(!verify(&kp.public_hex(), b"tampered", &sig));
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(!verify("zz", b"data", "00"));
        let kp = Keypair::generate();
        assert!(!verify(&kp.public_hex(), b"data", "not-hex"));
    }

    #[test]
    fn keyhash_is_deterministic_across_reloads() {
        let kp = Keypair::generate();
        let reloaded = Keypair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(kp.public_hex(), reloaded.public_hex());
        assert_eq!(kp.keyhash(), reloaded.keyhash());
        assert_eq!(kp.keyhash().len(), 40);
    }

    #[test]
    fn keyhash_matches_free_function() {
        let kp = Keypair::generate();
        assert_eq!(keyhash(&kp.public_hex()).unwrap(), kp.keyhash());
    }

    #[test]
    fn keyhash_rejects_bad_hex() {
        assert!(keyhash("not hex at all").is_err());
    }
}
