pub mod canonical;
pub mod hash;
pub mod keypair;
pub mod merkle;

pub use canonical::{canonical_bytes, canonical_json};
pub use hash::{content_id, sha256_hex};
pub use keypair::{generate_key_pair_pem, issuer_id_of, verify, verify_object, InstanceKey};
pub use merkle::{generate_proof, merkle_root, verify_proof, MerkleProof, Position, ProofSibling};
