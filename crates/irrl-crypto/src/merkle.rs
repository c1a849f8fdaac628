//! Binary Merkle tree over an ordered leaf list.
//!
//! Node hashes are lowercase hex strings. Leaves are hashed individually;
//! an internal node is `sha256(left_hex ++ right_hex)`; a level with an odd
//! count duplicates its last node as its own sibling. The empty tree commits
//! to `sha256("empty")`.

use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;

/// Which side a sibling hash sits on when folding toward the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSibling {
    pub hash: String,
    pub position: Position,
}

/// Inclusion proof for one leaf. Self-contained: `verify_proof` needs no
/// access to the original leaf list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub root: String,
    /// `sha256(leaves[leaf_index])`.
    pub leaf: String,
    pub leaf_index: usize,
    pub siblings: Vec<ProofSibling>,
}

/// Merkle root of an ordered leaf list.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return sha256_hex(b"empty");
    }
    let mut level: Vec<String> = leaves.iter().map(|l| sha256_hex(l.as_bytes())).collect();
    while level.len() > 1 {
        level = parent_level(&level);
    }
    level.remove(0)
}

/// Inclusion proof for `leaves[index]`. `None` when the index is out of range.
pub fn generate_proof(leaves: &[String], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }
    let mut level: Vec<String> = leaves.iter().map(|l| sha256_hex(l.as_bytes())).collect();
    let leaf = level[index].clone();
    let mut siblings = Vec::new();
    let mut pos = index;

    while level.len() > 1 {
        let (sibling, side) = if pos % 2 == 0 {
            // Odd levels duplicate the last node as its own right sibling.
            let sib = level.get(pos + 1).unwrap_or(&level[pos]).clone();
            (sib, Position::Right)
        } else {
            (level[pos - 1].clone(), Position::Left)
        };
        siblings.push(ProofSibling { hash: sibling, position: side });
        level = parent_level(&level);
        pos /= 2;
    }

    Some(MerkleProof {
        root: level.remove(0),
        leaf,
        leaf_index: index,
        siblings,
    })
}

/// Recompute the root by folding siblings and compare against the committed
/// root.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    let mut acc = proof.leaf.clone();
    for sibling in &proof.siblings {
        acc = match sibling.position {
            Position::Right => combine(&acc, &sibling.hash),
            Position::Left => combine(&sibling.hash, &acc),
        };
    }
    acc == proof.root
}

fn parent_level(level: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        next.push(combine(left, right));
    }
    next
}

fn combine(left: &str, right: &str) -> String {
    let mut joined = String::with_capacity(left.len() + right.len());
    joined.push_str(left);
    joined.push_str(right);
    sha256_hex(joined.as_bytes())
}
