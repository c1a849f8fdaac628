use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
};
use pkcs8::LineEnding;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde_json::Value;
use zeroize::Zeroizing;

use irrl_core::IrrlError;

use crate::canonical::canonical_bytes;
use crate::hash::sha256_hex;

/// The process-wide Ed25519 signing identity.
///
/// Constructed once at boot (loaded from a PEM keyfile or freshly generated)
/// and threaded through the components that issue signatures: attestations,
/// evaluations, and reputation proofs.
pub struct InstanceKey {
    signing: SigningKey,
    public_pem: String,
}

impl InstanceKey {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let public_pem = encode_public_pem(&signing.verifying_key());
        Self { signing, public_pem }
    }

    /// Restore from a PKCS#8 PEM secret key.
    pub fn from_secret_pem(pem: &str) -> Result<Self, IrrlError> {
        let signing = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| IrrlError::KeyDecode(e.to_string()))?;
        let public_pem = encode_public_pem(&signing.verifying_key());
        Ok(Self { signing, public_pem })
    }

    /// SPKI PEM of the public key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// PKCS#8 PEM of the secret key. Wrapped in `Zeroizing` so callers that
    /// write it to disk don't leave copies in memory.
    pub fn secret_key_pem(&self) -> Result<Zeroizing<String>, IrrlError> {
        self.signing
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| IrrlError::Signing(e.to_string()))
    }

    /// Issuer identity derived from the public key PEM.
    pub fn issuer_id(&self) -> String {
        issuer_id_of(&self.public_pem)
    }

    /// Sign raw bytes; returns the detached signature as base64.
    pub fn sign(&self, message: &[u8]) -> String {
        BASE64.encode(self.signing.sign(message).to_bytes())
    }

    /// Sign the canonical form of a record.
    pub fn sign_object(&self, record: &Value) -> String {
        self.sign(&canonical_bytes(record))
    }
}

impl std::fmt::Debug for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstanceKey({})", self.issuer_id())
    }
}

/// Derive the issuer identity of any SPKI public key PEM.
pub fn issuer_id_of(public_pem: &str) -> String {
    format!("iss_{}", &sha256_hex(public_pem.as_bytes())[..16])
}

/// Generate a standalone keypair, PEM-encoded (public SPKI, secret PKCS#8).
/// Used for realm keys.
pub fn generate_key_pair_pem() -> Result<(String, Zeroizing<String>), IrrlError> {
    let signing = SigningKey::generate(&mut OsRng);
    let secret = signing
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| IrrlError::Signing(e.to_string()))?;
    Ok((encode_public_pem(&signing.verifying_key()), secret))
}

/// Verify a base64 signature over raw bytes against an SPKI PEM public key.
/// Any decode or length mismatch yields `false`, never an error.
pub fn verify(public_pem: &str, message: &[u8], signature_b64: &str) -> bool {
    let Ok(key) = VerifyingKey::from_public_key_pem(public_pem) else {
        return false;
    };
    let Ok(sig_bytes) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Verify a signature over the canonical form of a record.
pub fn verify_object(public_pem: &str, record: &Value, signature_b64: &str) -> bool {
    verify(public_pem, &canonical_bytes(record), signature_b64)
}

fn encode_public_pem(key: &VerifyingKey) -> String {
    key.to_public_key_pem(LineEnding::LF)
        .expect("SPKI encoding of a valid Ed25519 key is infallible")
}
