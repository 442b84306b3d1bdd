//! Tamper-evident append-only audit ledger.
//!
//! Blocks form a hash chain: each stores the hash of its predecessor and a
//! digest of its own fields. The digest is FNV-1a, so the chain detects
//! accidental or in-process tampering; it is not a cryptographic commitment.

use crate::error::{IntegrityError, IntegrityFault};
use crate::invariant_ppt::{assert_invariant, LEDGER_APPEND_ORDER, LEDGER_CHAIN_LINK};
use crate::state::unix_now;
use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Transaction text of block 0.
pub const GENESIS_TRANSACTION: &str = "Genesis Block";
/// Predecessor hash recorded by block 0.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// One chained audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain; 0 is genesis.
    pub index: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Free-text description of the committed event.
    pub transaction: String,
    /// Hash of the previous block.
    pub previous_hash: String,
    /// Digest of this block's other fields.
    pub hash: String,
}

impl Block {
    fn sealed(index: u64, timestamp: u64, transaction: String, previous_hash: String) -> Self {
        let hash = digest(index, timestamp, &transaction, &previous_hash);
        Self {
            index,
            timestamp,
            transaction,
            previous_hash,
            hash,
        }
    }

    /// Recompute the digest from the stored fields.
    pub fn compute_hash(&self) -> String {
        digest(self.index, self.timestamp, &self.transaction, &self.previous_hash)
    }
}

/// FNV-1a over `index‖timestamp‖transaction‖previous_hash`, as 16 hex digits.
pub fn digest(index: u64, timestamp: u64, transaction: &str, previous_hash: &str) -> String {
    let input = format!("{index}{timestamp}{transaction}{previous_hash}");

    let mut hash = FNV_OFFSET;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// The append-only chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        Self::with_genesis_at(unix_now())
    }

    /// A ledger whose genesis block carries the given timestamp.
    pub fn with_genesis_at(timestamp: u64) -> Self {
        Self {
            blocks: vec![Block::sealed(
                0,
                timestamp,
                GENESIS_TRANSACTION.to_string(),
                GENESIS_PREVIOUS_HASH.to_string(),
            )],
        }
    }

    /// Wrap existing blocks without checking them; call
    /// [`Ledger::verify_integrity`] before trusting the result.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Append a block for `transaction`, stamped now. Returns its index.
    pub fn append(&mut self, transaction: impl Into<String>) -> u64 {
        self.append_at(transaction, unix_now())
    }

    /// Append a block with an explicit timestamp. Returns its index.
    pub fn append_at(&mut self, transaction: impl Into<String>, timestamp: u64) -> u64 {
        let index = self.blocks.len() as u64;
        let previous_hash = self
            .blocks
            .last()
            .map_or_else(|| GENESIS_PREVIOUS_HASH.to_string(), |b| b.hash.clone());
        let block = Block::sealed(index, timestamp, transaction.into(), previous_hash);
        tracing::debug!(
            index,
            hash = %block.hash,
            transaction = %block.transaction,
            "ledger append"
        );

        assert_invariant(
            LEDGER_APPEND_ORDER,
            block.index as usize == self.blocks.len(),
            "Ledger block index follows the tail",
            Some("append"),
        );
        assert_invariant(
            LEDGER_CHAIN_LINK,
            self.blocks
                .last()
                .is_none_or(|prev| prev.hash == block.previous_hash),
            "New block links to the previous tail",
            Some("append"),
        );
        self.blocks.push(block);
        index
    }

    /// Walk the chain from genesis; report the first block that fails.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        for (i, block) in self.blocks.iter().enumerate() {
            let fail = |fault| Err(IntegrityError { index: i, fault });
            if block.index != i as u64 {
                return fail(IntegrityFault::IndexGap);
            }
            let expected_prev = match i {
                0 => GENESIS_PREVIOUS_HASH,
                _ => self.blocks[i - 1].hash.as_str(),
            };
            if block.previous_hash != expected_prev {
                return fail(IntegrityFault::BrokenLink);
            }
            if block.hash != block.compute_hash() {
                return fail(IntegrityFault::DigestMismatch);
            }
        }
        Ok(())
    }

    /// All blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True only for a ledger built from an empty block list.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_starts_with_genesis() {
        let ledger = Ledger::with_genesis_at(100);
        assert_eq!(ledger.len(), 1);
        let genesis = &ledger.blocks()[0];
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.transaction, GENESIS_TRANSACTION);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.hash.len(), 16);
        assert!(ledger.verify_integrity().is_ok());
    }

    #[test]
    fn ledger_links_blocks() {
        let mut ledger = Ledger::with_genesis_at(1);
        ledger.append_at("P0 allocated resources", 2);
        ledger.append_at("P0 released resources", 3);
        let blocks = ledger.blocks();
        for i in 1..blocks.len() {
            assert_eq!(blocks[i].previous_hash, blocks[i - 1].hash);
            assert_eq!(blocks[i].hash, blocks[i].compute_hash());
        }
        assert!(ledger.verify_integrity().is_ok());
    }

    #[test]
    fn digest_is_deterministic_and_order_sensitive() {
        assert_eq!(digest(1, 2, "x", "y"), digest(1, 2, "x", "y"));
        assert_ne!(digest(1, 2, "x", "y"), digest(1, 2, "y", "x"));
        assert_ne!(digest(1, 2, "x", "y"), digest(2, 2, "x", "y"));
    }

    #[test]
    fn ledger_detects_tampered_transaction() {
        let mut ledger = Ledger::with_genesis_at(1);
        for t in 0..4 {
            ledger.append_at(format!("event {t}"), 10 + t);
        }
        let mut blocks = ledger.blocks().to_vec();
        blocks[2].transaction = "P9 allocated everything".into();
        let tampered = Ledger::from_blocks(blocks);
        assert_eq!(
            tampered.verify_integrity(),
            Err(IntegrityError {
                index: 2,
                fault: IntegrityFault::DigestMismatch
            })
        );
    }

    #[test]
    fn ledger_detects_rehashed_block_by_link() {
        let mut ledger = Ledger::with_genesis_at(1);
        ledger.append_at("a", 2);
        ledger.append_at("b", 3);
        let mut blocks = ledger.blocks().to_vec();
        blocks[1].transaction = "forged".into();
        blocks[1].hash = blocks[1].compute_hash();
        let tampered = Ledger::from_blocks(blocks);
        assert_eq!(
            tampered.verify_integrity(),
            Err(IntegrityError {
                index: 2,
                fault: IntegrityFault::BrokenLink
            })
        );
    }
}
