//! Settlement receipts for the OpenEscrow audit trail.
//!
//! Every fund-moving settlement (verification payout, conflict resolution,
//! refund of a deleted milestone) produces a [`SettlementReceipt`]. Receipts
//! are hash-chained: each one commits to the previous receipt's hash, so the
//! trail can be checked end to end with [`verify_chain`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AccountId, MilestoneKey, constants};

/// How funds moved in a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// available → frozen on the same account.
    Freeze,
    /// frozen on `from` → available on `to`.
    Release,
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Freeze => write!(f, "FREEZE"),
            Self::Release => write!(f, "RELEASE"),
        }
    }
}

/// One leg of fund movement performed by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub kind: TransferKind,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
}

impl Transfer {
    #[must_use]
    pub fn freeze(account: AccountId, amount: Decimal) -> Self {
        Self {
            kind: TransferKind::Freeze,
            from: account,
            to: account,
            amount,
        }
    }

    #[must_use]
    pub fn release(from: AccountId, to: AccountId, amount: Decimal) -> Self {
        Self {
            kind: TransferKind::Release,
            from,
            to,
            amount,
        }
    }
}

/// What kind of settlement this receipt proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptType {
    /// Owner verified the milestone; price paid to the provider.
    MilestoneVerified,
    /// A conflict vote settled the milestone.
    ConflictSettled,
    /// A deleted milestone's price returned to the owner.
    MilestoneRefunded,
}

impl std::fmt::Display for ReceiptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MilestoneVerified => write!(f, "MILESTONE_VERIFIED"),
            Self::ConflictSettled => write!(f, "CONFLICT_SETTLED"),
            Self::MilestoneRefunded => write!(f, "MILESTONE_REFUNDED"),
        }
    }
}

/// Append-only, hash-chained proof of a settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Position in the trail, starting at 0.
    pub sequence: u64,
    pub receipt_type: ReceiptType,
    pub key: MilestoneKey,
    pub transfers: Vec<Transfer>,
    /// `payload_hash` of the previous receipt (zeros for the first).
    pub prev_hash: [u8; 32],
    /// SHA-256 over the canonical fields, including `prev_hash`.
    pub payload_hash: [u8; 32],
    pub issued_at: DateTime<Utc>,
}

impl SettlementReceipt {
    /// Build a receipt and compute its hash.
    #[must_use]
    pub fn new(
        sequence: u64,
        receipt_type: ReceiptType,
        key: MilestoneKey,
        transfers: Vec<Transfer>,
        prev_hash: [u8; 32],
    ) -> Self {
        let payload_hash = compute_hash(sequence, receipt_type, key, &transfers, &prev_hash);
        Self {
            sequence,
            receipt_type,
            key,
            transfers,
            prev_hash,
            payload_hash,
            issued_at: Utc::now(),
        }
    }

    /// Recompute the hash and compare.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        compute_hash(
            self.sequence,
            self.receipt_type,
            self.key,
            &self.transfers,
            &self.prev_hash,
        ) == self.payload_hash
    }

    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.payload_hash)
    }

    /// Sum of released amounts (freezes excluded).
    #[must_use]
    pub fn released_total(&self) -> Decimal {
        self.transfers
            .iter()
            .filter(|t| t.kind == TransferKind::Release)
            .map(|t| t.amount)
            .sum()
    }
}

/// Canonical hash of a receipt.
///
/// Format: `domain || sequence(8) || type(utf8) || project(8) || service(8) ||
/// index(4) || count(8) || [kind || from(16) || to(16) || amount(str)]* || prev_hash(32)`
fn compute_hash(
    sequence: u64,
    receipt_type: ReceiptType,
    key: MilestoneKey,
    transfers: &[Transfer],
    prev_hash: &[u8; 32],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(constants::RECEIPT_DOMAIN);
    hasher.update(sequence.to_le_bytes());
    hasher.update(receipt_type.to_string().as_bytes());
    hasher.update(key.project.0.to_le_bytes());
    hasher.update(key.service.0.to_le_bytes());
    hasher.update(key.index.to_le_bytes());
    hasher.update((transfers.len() as u64).to_le_bytes());
    for t in transfers {
        hasher.update(t.kind.to_string().as_bytes());
        hasher.update(t.from.0.as_bytes());
        hasher.update(t.to.0.as_bytes());
        hasher.update(t.amount.normalize().to_string().as_bytes());
    }
    hasher.update(prev_hash);

    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Check sequence numbers, per-receipt hashes, and the prev-hash links.
#[must_use]
pub fn verify_chain(receipts: &[SettlementReceipt]) -> bool {
    let mut prev = [0u8; 32];
    for (i, r) in receipts.iter().enumerate() {
        if r.sequence != i as u64 || r.prev_hash != prev || !r.verify_hash() {
            return false;
        }
        prev = r.payload_hash;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sequence: u64, prev: [u8; 32]) -> SettlementReceipt {
        let owner = AccountId::from_bytes([1; 16]);
        let provider = AccountId::from_bytes([2; 16]);
        SettlementReceipt::new(
            sequence,
            ReceiptType::ConflictSettled,
            MilestoneKey::new(0, 1, 1),
            vec![
                Transfer::release(owner, provider, Decimal::new(10, 0)),
                Transfer::release(owner, owner, Decimal::new(10, 0)),
            ],
            prev,
        )
    }

    #[test]
    fn receipt_type_display() {
        assert_eq!(ReceiptType::MilestoneVerified.to_string(), "MILESTONE_VERIFIED");
        assert_eq!(ReceiptType::ConflictSettled.to_string(), "CONFLICT_SETTLED");
    }

    #[test]
    fn hash_is_deterministic_and_verifies() {
        let a = sample(0, [0; 32]);
        let b = sample(0, [0; 32]);
        assert_eq!(a.payload_hash, b.payload_hash);
        assert!(a.verify_hash());
        assert_eq!(a.hash_hex().len(), 64);
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let mut r = sample(0, [0; 32]);
        r.transfers[0].amount = Decimal::new(20, 0);
        assert!(!r.verify_hash());
    }

    #[test]
    fn chain_links_verify() {
        let first = sample(0, [0; 32]);
        let second = sample(1, first.payload_hash);
        assert!(verify_chain(&[first.clone(), second.clone()]));

        let broken = sample(1, [9; 32]);
        assert!(!verify_chain(&[first, broken]));
        assert!(!verify_chain(&[second]));
    }

    #[test]
    fn released_total_sums_release_legs() {
        let r = sample(0, [0; 32]);
        assert_eq!(r.released_total(), Decimal::new(20, 0));
    }

    #[test]
    fn equal_amounts_with_different_scale_hash_equal() {
        let owner = AccountId::from_bytes([1; 16]);
        let make = |amount| {
            SettlementReceipt::new(
                0,
                ReceiptType::MilestoneVerified,
                MilestoneKey::new(0, 0, 0),
                vec![Transfer::release(owner, owner, amount)],
                [0; 32],
            )
        };
        assert_eq!(
            make(Decimal::new(25, 0)).payload_hash,
            make(Decimal::new(250, 1)).payload_hash
        );
    }
}
