//! Hashing primitives for BLAST
//!
//! Double SHA-256 and the merkle constructions built on it. All digests are
//! 32-byte arrays in little-endian (wire) order.

use sha2::{Digest, Sha256};

/// Hashes a message using SHA256
pub fn sha256(msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(msg);
    hasher.finalize().into()
}

/// Hashes a message using double SHA256
pub fn sha256d(msg: &[u8]) -> [u8; 32] {
    sha256(&sha256(msg))
}

/// Double SHA256 of two concatenated digests (one merkle tree step)
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let first: [u8; 32] = hasher.finalize().into();
    sha256(&first)
}

/// Walks a merkle branch from `leaf` up to the root.
///
/// Bit `i` of `side_mask` tells on which side the `i`-th sibling sits: set
/// means the sibling is the left operand.
pub fn walk_merkle_branch(leaf: &[u8; 32], siblings: &[[u8; 32]], side_mask: u32) -> [u8; 32] {
    let mut hash = *leaf;
    let mut mask = side_mask;
    
    for sibling in siblings {
        hash = if mask & 1 == 1 {
            hash_pair(sibling, &hash)
        } else {
            hash_pair(&hash, sibling)
        };
        mask >>= 1;
    }
    
    hash
}

/// Computes the merkle root of a list of leaves.
///
/// Odd levels duplicate their last element. The returned flag reports whether
/// two identical siblings were hashed together anywhere in the tree, which
/// makes the root ambiguous (CVE-2012-2459). An empty list yields the null hash.
pub fn merkle_root(leaves: &[[u8; 32]]) -> ([u8; 32], bool) {
    if leaves.is_empty() {
        return ([0u8; 32], false);
    }
    
    let mut level = leaves.to_vec();
    let mut mutated = false;
    
    while level.len() > 1 {
        for pair in level.chunks_exact(2) {
            if pair[0] == pair[1] {
                mutated = true;
            }
        }
        
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    
    (level[0], mutated)
}

/// Builds the branch (siblings, side mask) proving the leaf at `index`.
///
/// Returns `None` when `index` is out of range.
pub fn merkle_branch(leaves: &[[u8; 32]], index: usize) -> Option<(Vec<[u8; 32]>, u32)> {
    if index >= leaves.len() {
        return None;
    }
    
    let mut level = leaves.to_vec();
    let mut position = index;
    let mut siblings = Vec::new();
    let mut side_mask = 0u32;
    let mut depth = 0;
    
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        
        let sibling = position ^ 1;
        siblings.push(level[sibling]);
        if position & 1 == 1 {
            side_mask |= 1 << depth;
        }
        
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        position >>= 1;
        depth += 1;
    }
    
    Some((siblings, side_mask))
}
