//! Binding decision for one login attempt
//!
//! Pure check of (address, candidate account) against the record store and
//! the bypass set. The gate performs the follow-up `put` on an allowed
//! login; the only mutation here is the lazy erase of an expired record,
//! so a diagnostic dry-run never creates state.

use std::collections::HashSet;

use crate::store::{BindingStore, StoreError};

/// Outcome of evaluating one (address, account) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Address is live-bound to a different account.
    Denied {
        owner_id: String,
        owner_name: String,
        /// 0 = permanent binding.
        expires_at: i64,
    },
}

/// Evaluate a login attempt.
///
/// `now_ms` is read exactly once by the caller; passing it in keeps a
/// record from flipping between expired and live mid-evaluation.
pub async fn evaluate<S: BindingStore>(
    store: &S,
    bypass: &HashSet<String>,
    address: &str,
    candidate_id: &str,
    now_ms: i64,
) -> Result<Decision, StoreError> {
    if bypass.contains(address) {
        return Ok(Decision::Allowed);
    }

    let record = match store.get(address).await? {
        Some(r) => r,
        None => return Ok(Decision::Allowed),
    };

    if record.is_live(now_ms) {
        if record.owner_id == candidate_id {
            // same owner; the gate refreshes the expiry
            return Ok(Decision::Allowed);
        }
        return Ok(Decision::Denied {
            owner_id: record.owner_id,
            owner_name: record.owner_name,
            expires_at: record.expires_at,
        });
    }

    // cooldown over: drop the stale record before allowing
    store.erase(address).await?;
    Ok(Decision::Allowed)
}
