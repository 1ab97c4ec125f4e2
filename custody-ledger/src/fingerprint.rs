//! Instruction fingerprints
//!
//! Deterministic hash of the economic content of an instruction. Token
//! addresses and metadata are ignored; only what moves balances counts.

use sha2::{Digest, Sha256};

use custody_domain::Instruction;

/// Compute the fingerprint of `instruction` executed for `user_id`.
///
/// Formula: SHA256(user + kind + from symbol + to symbol + from amount + credit amount)
///
/// # Returns
/// Hex string prefixed with "fp_"
pub fn instruction_fingerprint(user_id: &str, instruction: &Instruction) -> String {
    let debit = instruction.from_amount.to_string();
    let credit = instruction
        .credit_amount()
        .map(|a| a.to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    for part in [
        user_id,
        instruction.kind.as_str(),
        instruction.from_token.symbol.as_str(),
        instruction.to_token.symbol.as_str(),
        debit.as_str(),
        credit.as_str(),
    ] {
        hasher.update(part.as_bytes());
        // Separator keeps ("ab","c") distinct from ("a","bc")
        hasher.update([0u8]);
    }

    format!("fp_{}", hex::encode(hasher.finalize()))
}
