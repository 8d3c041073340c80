//! SHA-256 digesting and secp256k1 signature verification for DNS-tree
//! roots (§4.4).

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::ports::Verifier;

/// Production verifier: SHA-256 over `sha2`, recoverable-ECDSA verify over
/// `k256`. A root signature is `r(32) || s(32) || recovery_id(1)`; we
/// recover the signer's public key and compare it against the tree's
/// configured key rather than trusting a bare verify, matching how the
/// upstream ENR record recovers and checks identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Verifier;

impl Verifier for Secp256k1Verifier {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn verify(&self, digest: &[u8; 32], signature: &[u8; 65], public_key: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(&signature[..64]) else {
            return false;
        };
        let Ok(recovery_id) = RecoveryId::from_byte(signature[64]) else {
            return false;
        };
        let Ok(recovered) = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id) else {
            return false;
        };
        recovered.to_encoded_point(true).as_bytes() == public_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn sha256_is_deterministic() {
        let v = Secp256k1Verifier;
        assert_eq!(v.sha256(b"hello"), v.sha256(b"hello"));
        assert_ne!(v.sha256(b"hello"), v.sha256(b"world"));
    }

    #[test]
    fn verify_accepts_matching_signature_and_key() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let verifying_key = VerifyingKey::from(&signing_key);
        let v = Secp256k1Verifier;
        let digest = v.sha256(b"tree-root-v1:e=x l=y seq=1");
        let (sig, recovery_id) = signing_key.sign_prehash_recoverable(&digest).unwrap();
        let mut sig_bytes = [0u8; 65];
        sig_bytes[..64].copy_from_slice(&sig.to_bytes());
        sig_bytes[64] = recovery_id.to_byte();
        let pubkey_bytes = verifying_key.to_encoded_point(true);
        assert!(v.verify(&digest, &sig_bytes, pubkey_bytes.as_bytes()));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let other_key = SigningKey::random(&mut rand::thread_rng());
        let v = Secp256k1Verifier;
        let digest = v.sha256(b"payload");
        let (sig, recovery_id) = signing_key.sign_prehash_recoverable(&digest).unwrap();
        let mut sig_bytes = [0u8; 65];
        sig_bytes[..64].copy_from_slice(&sig.to_bytes());
        sig_bytes[64] = recovery_id.to_byte();
        let wrong_pubkey = VerifyingKey::from(&other_key).to_encoded_point(true);
        assert!(!v.verify(&digest, &sig_bytes, wrong_pubkey.as_bytes()));
    }
}
